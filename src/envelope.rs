//! Envelope wire format.
//!
//! ```text
//! base64( hex(salt, 32 B) ":" hex(iv, 16 B) ":" hex(ciphertext) )
//! ```
//!
//! This framing is part of the storage contract. Envelopes already persisted
//! must keep parsing, so the layout here never changes.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::crypto::{IV_LEN, SALT_LEN};
use crate::error::DecryptFailure;

const SEPARATOR: char = ':';

/// A parsed envelope.
///
/// `salt_hex` keeps the salt exactly as framed because the key derivation
/// consumes the hex text, not the raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub salt_hex: String,
    pub iv: [u8; IV_LEN],
    pub ciphertext: Vec<u8>,
}

impl Envelope {
    /// Build an envelope from freshly generated parts.
    pub fn new(salt: &[u8; SALT_LEN], iv: [u8; IV_LEN], ciphertext: Vec<u8>) -> Self {
        Self {
            salt_hex: hex::encode(salt),
            iv,
            ciphertext,
        }
    }

    /// Serialize to the stored string form.
    pub fn encode(&self) -> String {
        let frame = format!(
            "{}{SEPARATOR}{}{SEPARATOR}{}",
            self.salt_hex,
            hex::encode(self.iv),
            hex::encode(&self.ciphertext)
        );
        STANDARD.encode(frame)
    }

    /// Parse the stored string form.
    ///
    /// Every failure here is structural: the input is not an envelope.
    pub fn decode(stored: &str) -> Result<Self, DecryptFailure> {
        let frame = STANDARD
            .decode(stored.trim())
            .map_err(|_| DecryptFailure::Base64)?;
        let frame = String::from_utf8(frame).map_err(|_| DecryptFailure::Framing)?;

        let mut parts = frame.split(SEPARATOR);
        let (Some(salt_hex), Some(iv_hex), Some(ct_hex), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(DecryptFailure::Framing);
        };

        let salt = hex::decode(salt_hex).map_err(|_| DecryptFailure::Hex)?;
        let iv = hex::decode(iv_hex).map_err(|_| DecryptFailure::Hex)?;
        let ciphertext = hex::decode(ct_hex).map_err(|_| DecryptFailure::Hex)?;

        if salt.len() != SALT_LEN {
            return Err(DecryptFailure::ComponentLength);
        }
        let iv: [u8; IV_LEN] = iv
            .try_into()
            .map_err(|_| DecryptFailure::ComponentLength)?;

        Ok(Self {
            salt_hex: salt_hex.to_string(),
            iv,
            ciphertext,
        })
    }
}

/// Cheap shape test: could `value` be a stored envelope?
///
/// Returns false for the empty string, for anything starting with `{`, and
/// for anything outside the standard base64 alphabet.
pub fn looks_like_envelope(value: &str) -> bool {
    !value.is_empty()
        && !value.starts_with('{')
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/' | b'='))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Envelope {
        Envelope::new(&[0xab; SALT_LEN], [0x01; IV_LEN], vec![0xcd; 16])
    }

    #[test]
    fn encode_produces_three_hex_groups_under_base64() {
        let stored = sample().encode();
        let frame = String::from_utf8(STANDARD.decode(&stored).unwrap()).unwrap();
        let parts: Vec<&str> = frame.split(':').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "ab".repeat(SALT_LEN));
        assert_eq!(parts[1], "01".repeat(IV_LEN));
        assert_eq!(parts[2], "cd".repeat(16));
    }

    #[test]
    fn decode_reverses_encode() {
        let envelope = sample();
        assert_eq!(Envelope::decode(&envelope.encode()).unwrap(), envelope);
    }

    #[test]
    fn decode_classifies_structural_failures() {
        let frame = |s: &str| STANDARD.encode(s);
        let salt = "ab".repeat(SALT_LEN);
        let iv = "01".repeat(IV_LEN);

        assert_eq!(Envelope::decode("not base64!"), Err(DecryptFailure::Base64));
        assert_eq!(Envelope::decode(&frame("a:b")), Err(DecryptFailure::Framing));
        assert_eq!(
            Envelope::decode(&frame("a:b:c:d")),
            Err(DecryptFailure::Framing)
        );
        assert_eq!(
            Envelope::decode(&frame(&format!("{salt}:{iv}:zz"))),
            Err(DecryptFailure::Hex)
        );
        assert_eq!(
            Envelope::decode(&frame(&format!("abab:{iv}:00"))),
            Err(DecryptFailure::ComponentLength)
        );
        assert_eq!(
            Envelope::decode(&frame(&format!("{salt}:0101:00"))),
            Err(DecryptFailure::ComponentLength)
        );
    }

    #[test]
    fn shape_test() {
        assert!(looks_like_envelope(&sample().encode()));
        assert!(looks_like_envelope("abcd"));
        assert!(!looks_like_envelope(""));
        assert!(!looks_like_envelope("Buy milk"));
        assert!(!looks_like_envelope("{\"a\":1}"));
        assert!(!looks_like_envelope("hello, world"));
    }
}
