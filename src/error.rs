//! Error types for fieldvault.
//!
//! Every error variant is a distinct failure mode of the field encryption
//! pipeline. Messages name *what* failed and, for decryption, *which field*
//! and *which class* of failure. They never carry plaintext, key material
//! or ciphertext.

use std::fmt;

use thiserror::Error;

/// The single error type for all fieldvault operations.
#[derive(Debug, Error)]
pub enum FieldVaultError {
    /// The process secret (or another required setting) is missing or
    /// malformed. Fatal: the calling operation must not continue.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Producing ciphertext failed. Never recovered locally, so a write is
    /// not silently stored as plaintext.
    #[error("encryption failed")]
    EncryptionFailure,

    /// The system's random number generator failed to produce bytes.
    #[error("randomness source failed")]
    RandomnessFailure,

    /// PBKDF2 rejected its parameters.
    #[error("key derivation failed")]
    KeyDerivationFailure,

    /// A value or typed record could not be converted to or from JSON.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// A field could not be decrypted. Only surfaced under
    /// [`DecryptPolicy::FailClosed`](crate::config::DecryptPolicy::FailClosed);
    /// the default policy substitutes a fallback value instead.
    #[error("decryption failed for field `{field}`: {kind}")]
    DecryptionFailed {
        /// Name of the field, or `<value>` for a bare value.
        field: String,
        /// What went wrong.
        kind: DecryptFailure,
    },
}

/// Why a single envelope failed to decrypt.
///
/// The first four classes are *structural*: the input does not have the
/// shape of an envelope at all, so the legacy detector treats it as
/// plaintext. The remaining classes are *cryptographic*: the envelope is
/// well formed but unusable under the derived key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecryptFailure {
    /// Outer frame is not valid base64.
    Base64,
    /// Decoded frame is not UTF-8 or does not split into three `:` parts.
    Framing,
    /// One of the three parts is not valid hex.
    Hex,
    /// Salt or IV has the wrong number of bytes.
    ComponentLength,
    /// Ciphertext is empty or not a whole number of cipher blocks.
    Ciphertext,
    /// PKCS#7 padding did not verify (wrong key or corrupted data).
    Padding,
    /// Recovered plaintext is not UTF-8 (wrong key or corrupted data).
    Utf8,
}

impl DecryptFailure {
    /// True if the input never looked like an envelope.
    pub fn is_structural(self) -> bool {
        matches!(
            self,
            Self::Base64 | Self::Framing | Self::Hex | Self::ComponentLength
        )
    }
}

impl fmt::Display for DecryptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Base64 => "invalid base64 frame",
            Self::Framing => "malformed envelope frame",
            Self::Hex => "invalid hex component",
            Self::ComponentLength => "invalid salt or iv length",
            Self::Ciphertext => "invalid ciphertext length",
            Self::Padding => "padding check failed",
            Self::Utf8 => "plaintext is not utf-8",
        };
        f.write_str(label)
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, FieldVaultError>;
