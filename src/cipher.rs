//! Field cipher: one scalar value in, one envelope string out.
//!
//! Each call draws a fresh salt and IV and derives its own key, so two
//! encryptions of the same value under the same principal never produce the
//! same envelope. The cipher holds no mutable state and is safe to share
//! across threads.

use std::num::NonZeroU32;

use serde_json::Value;

use crate::config::{DecryptPolicy, Secret, VaultConfig};
use crate::crypto;
use crate::envelope::Envelope;
use crate::error::{DecryptFailure, FieldVaultError, Result};
use crate::keys;
use crate::legacy;

/// Field name used in logs and errors when a bare value is decrypted.
pub(crate) const BARE_VALUE: &str = "<value>";

/// Encrypts and decrypts individual field values.
#[derive(Debug, Clone)]
pub struct FieldCipher {
    secret: Secret,
    iterations: NonZeroU32,
    policy: DecryptPolicy,
}

impl FieldCipher {
    /// Build a cipher from a loaded configuration.
    pub fn new(config: &VaultConfig) -> Self {
        Self {
            secret: config.secret.clone(),
            iterations: config.kdf_iterations,
            policy: config.policy,
        }
    }

    /// Build a cipher straight from the process environment.
    pub fn from_env() -> Result<Self> {
        VaultConfig::from_env().map(|config| Self::new(&config))
    }

    /// The decrypt failure policy in force.
    pub fn policy(&self) -> DecryptPolicy {
        self.policy
    }

    /// Encrypt a string or JSON value for `principal`.
    ///
    /// Any failure is fatal and returned; a value is never passed through
    /// unencrypted.
    pub fn encrypt(&self, value: &Value, principal: &str) -> Result<String> {
        let plaintext = canonical_plaintext(value)?;
        self.seal(plaintext.as_bytes(), principal)
    }

    /// Encrypt a plain string for `principal`.
    pub fn encrypt_str(&self, value: &str, principal: &str) -> Result<String> {
        self.encrypt(&Value::String(value.to_string()), principal)
    }

    /// Decrypt a stored value for `principal`.
    ///
    /// Legacy plaintext comes back unchanged. An envelope that cannot be
    /// decrypted comes back as `""` under [`DecryptPolicy::Fallback`] and as
    /// an error under [`DecryptPolicy::FailClosed`].
    pub fn decrypt(&self, stored: &str, principal: &str) -> Result<Value> {
        legacy::resolve(
            self,
            BARE_VALUE,
            &Value::String(stored.to_string()),
            principal,
            Value::String(String::new()),
        )
    }

    fn seal(&self, plaintext: &[u8], principal: &str) -> Result<String> {
        let salt = crypto::generate_salt()?;
        let iv = crypto::generate_iv()?;
        let salt_hex = hex::encode(salt);

        let key = keys::derive_from_secret(&self.secret, &salt_hex, principal, self.iterations);
        let ciphertext = crypto::encrypt(key.as_bytes(), &iv, plaintext)?;

        Ok(Envelope::new(&salt, iv, ciphertext).encode())
    }

    /// Run the raw decode, derive and decrypt pipeline with no policy.
    pub(crate) fn open(
        &self,
        stored: &str,
        principal: &str,
    ) -> std::result::Result<Value, DecryptFailure> {
        let envelope = Envelope::decode(stored)?;

        let key =
            keys::derive_from_secret(&self.secret, &envelope.salt_hex, principal, self.iterations);
        let plaintext = crypto::decrypt(key.as_bytes(), &envelope.iv, &envelope.ciphertext)?;
        let text = String::from_utf8(plaintext).map_err(|_| DecryptFailure::Utf8)?;

        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }
}

/// The text that actually gets encrypted for `value`.
///
/// Strings are framed raw, matching envelopes already in storage, unless the
/// raw text would itself parse as JSON. Those strings, and all non-string
/// values, are encrypted as JSON so decryption restores the original value.
fn canonical_plaintext(value: &Value) -> Result<String> {
    match value {
        Value::String(s) if serde_json::from_str::<Value>(s).is_err() => Ok(s.clone()),
        other => serde_json::to_string(other)
            .map_err(|e| FieldVaultError::Serialization(e.to_string())),
    }
}
