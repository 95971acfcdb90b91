//! Legacy plaintext detection and decrypt fallback.
//!
//! Records written before field encryption existed hold plaintext, and they
//! stay readable without a migration. Every stored value takes exactly one
//! step through this machine:
//!
//! ```text
//! Unknown ──► LooksLegacyPlaintext ──► PassThroughUnchanged
//!    │
//!    └──────► LooksEncrypted ──► DecryptedOK ──► ParsedValue
//!                    │
//!                    └────────► DecryptFailed ──► FallbackValue
//! ```
//!
//! A value that merely has the right alphabet but turns out not to be an
//! envelope (bad frame, bad hex, wrong lengths) is reclassified as legacy
//! plaintext. Only a well-formed envelope that does not decrypt reaches
//! `DecryptFailed`.
//!
//! Content sniffing is ambiguous: a user-typed string made only of base64
//! characters that also happens to decode to a valid frame is read as
//! ciphertext. An explicit per-record flag would remove the ambiguity.

use serde_json::Value;
use tracing::{debug, warn};

use crate::cipher::FieldCipher;
use crate::config::DecryptPolicy;
use crate::envelope;
use crate::error::{DecryptFailure, FieldVaultError, Result};

/// First-step classification of a stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Non-string, empty, JSON-shaped or outside the base64 alphabet.
    LooksLegacyPlaintext,
    /// A non-empty string in the base64 alphabet.
    LooksEncrypted,
}

/// Terminal state reached by one stored value.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The value was not ciphertext and is returned as stored.
    PassThroughUnchanged(Value),
    /// The envelope decrypted and its plaintext was parsed.
    ParsedValue(Value),
    /// The envelope did not decrypt; the caller's fallback was substituted.
    FallbackValue(Value, DecryptFailure),
}

impl Outcome {
    /// Unwrap the value carried by any outcome.
    pub fn into_value(self) -> Value {
        match self {
            Self::PassThroughUnchanged(v) | Self::ParsedValue(v) | Self::FallbackValue(v, _) => v,
        }
    }
}

/// Classify a stored value without attempting decryption.
pub fn classify(value: &Value) -> Classification {
    match value {
        Value::String(s) if envelope::looks_like_envelope(s) => Classification::LooksEncrypted,
        _ => Classification::LooksLegacyPlaintext,
    }
}

/// Drive one value through the state machine.
///
/// This never fails; the policy decision is left to [`resolve`].
pub fn evaluate(cipher: &FieldCipher, value: &Value, principal: &str, fallback: Value) -> Outcome {
    let stored = match (classify(value), value) {
        (Classification::LooksEncrypted, Value::String(s)) => s,
        _ => return Outcome::PassThroughUnchanged(value.clone()),
    };

    match cipher.open(stored, principal) {
        Ok(parsed) => Outcome::ParsedValue(parsed),
        Err(kind) if kind.is_structural() => Outcome::PassThroughUnchanged(value.clone()),
        Err(kind) => Outcome::FallbackValue(fallback, kind),
    }
}

/// Decrypt one field value, applying the cipher's decrypt policy.
///
/// Under [`DecryptPolicy::Fallback`] this never fails. Under
/// [`DecryptPolicy::FailClosed`] a well-formed envelope that does not decrypt
/// becomes [`FieldVaultError::DecryptionFailed`].
pub fn resolve(
    cipher: &FieldCipher,
    field: &str,
    value: &Value,
    principal: &str,
    fallback: Value,
) -> Result<Value> {
    match evaluate(cipher, value, principal, fallback) {
        Outcome::PassThroughUnchanged(v) => {
            if value.is_string() {
                debug!(field, "passing through legacy plaintext");
            }
            Ok(v)
        }
        Outcome::ParsedValue(v) => Ok(v),
        Outcome::FallbackValue(v, kind) => match cipher.policy() {
            DecryptPolicy::Fallback => {
                warn!(field, failure = %kind, "decryption failed, substituting fallback");
                Ok(v)
            }
            DecryptPolicy::FailClosed => {
                warn!(field, failure = %kind, "decryption failed");
                Err(FieldVaultError::DecryptionFailed {
                    field: field.to_string(),
                    kind,
                })
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroU32;

    use serde_json::json;

    use super::*;
    use crate::config::{Secret, VaultConfig};

    fn cipher(policy: DecryptPolicy) -> FieldCipher {
        let config = VaultConfig::new(Secret::new("S1").unwrap())
            .with_kdf_iterations(NonZeroU32::new(100).unwrap())
            .with_policy(policy);
        FieldCipher::new(&config)
    }

    #[test]
    fn classification() {
        assert_eq!(classify(&json!("Buy milk")), Classification::LooksLegacyPlaintext);
        assert_eq!(classify(&json!("")), Classification::LooksLegacyPlaintext);
        assert_eq!(classify(&json!("{\"a\":1}")), Classification::LooksLegacyPlaintext);
        assert_eq!(classify(&json!(42)), Classification::LooksLegacyPlaintext);
        assert_eq!(classify(&json!({"a": 1})), Classification::LooksLegacyPlaintext);
        assert_eq!(classify(&json!("SGVsbG8=")), Classification::LooksEncrypted);
    }

    #[test]
    fn plaintext_passes_through() {
        let c = cipher(DecryptPolicy::Fallback);
        for value in [json!("Buy milk"), json!("hello"), json!("abcd"), json!(7)] {
            assert_eq!(
                evaluate(&c, &value, "p", json!("")),
                Outcome::PassThroughUnchanged(value.clone())
            );
        }
    }

    #[test]
    fn envelope_decrypts_to_parsed_value() {
        let c = cipher(DecryptPolicy::Fallback);
        let stored = json!(c.encrypt(&json!({"x": 1}), "p").unwrap());
        assert_eq!(
            evaluate(&c, &stored, "p", json!("")),
            Outcome::ParsedValue(json!({"x": 1}))
        );
    }

    #[test]
    fn wrong_principal_usually_falls_back() {
        let c = cipher(DecryptPolicy::Fallback);
        let mut fell_back = 0;
        for _ in 0..8 {
            let stored = json!(c.encrypt_str("Buy milk", "user-42").unwrap());
            let outcome = evaluate(&c, &stored, "user-43", json!("fallback"));
            assert_ne!(outcome.clone().into_value(), json!("Buy milk"));
            if matches!(outcome, Outcome::FallbackValue(..)) {
                fell_back += 1;
            }
        }
        // CBC without a MAC lets a wrong key pass padding about 1 in 256 times.
        assert!(fell_back >= 6);
    }

    #[test]
    fn fail_closed_surfaces_the_failure() {
        let c = cipher(DecryptPolicy::FailClosed);
        let stored = json!(c.encrypt_str("Buy milk", "user-42").unwrap());

        // Retry a few fresh envelopes so a lucky valid padding cannot flake.
        let failed = (0..4).any(|_| {
            let stored = json!(c.encrypt_str("Buy milk", "user-42").unwrap());
            matches!(
                resolve(&c, "title", &stored, "user-43", json!("")),
                Err(FieldVaultError::DecryptionFailed { .. })
            )
        });
        assert!(failed);

        // Legacy plaintext is still fine under fail-closed.
        assert_eq!(
            resolve(&c, "title", &json!("Buy milk"), "user-43", json!("")).unwrap(),
            json!("Buy milk")
        );
        assert_eq!(
            resolve(&c, "title", &stored, "user-42", json!("")).unwrap(),
            json!("Buy milk")
        );
    }
}
