//! Key derivation and ownership.
//!
//! This module owns two responsibilities:
//! 1. Deriving per-call field keys from the process secret using
//!    PBKDF2-HMAC-SHA512.
//! 2. Holding derived key material in a type that is opaque, non-cloneable,
//!    and zeroised on drop.
//!
//! ## Derivation structure
//!
//! ```text
//! PBKDF2-HMAC-SHA512(
//!     password   = secret,
//!     salt       = hex(call_salt) ++ principal,
//!     iterations = 100_000,
//!     length     = 32
//! )
//! ```
//!
//! Appending the principal to the salt is what binds an envelope to its
//! owner: the same envelope re-derived under another principal yields an
//! unrelated key.

use std::num::NonZeroU32;

use ring::pbkdf2;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::config::Secret;
use crate::crypto::KEY_LEN;
use crate::error::{FieldVaultError, Result};

/// A key derived for a single encrypt or decrypt call.
///
/// - Not `Clone`. Each derived key lives for one call.
/// - Zeroised on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey {
    bytes: [u8; KEY_LEN],
}

impl DerivedKey {
    /// Borrow the raw key bytes for use in encrypt/decrypt operations.
    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

/// Derive the field key for one envelope.
///
/// `salt` is the hex text of the envelope salt, exactly as framed. Empty
/// `salt` and `principal` are legal. An empty `secret` is a configuration
/// error. The function is pure: no I/O and no shared state.
pub fn derive_key(
    secret: &[u8],
    salt: &str,
    principal: &str,
    iterations: NonZeroU32,
) -> Result<DerivedKey> {
    if secret.is_empty() {
        return Err(FieldVaultError::Configuration(
            "encryption secret is missing".into(),
        ));
    }

    Ok(derive(secret, salt, principal, iterations))
}

/// Derive from a [`Secret`], which is non-empty by construction.
pub(crate) fn derive_from_secret(
    secret: &Secret,
    salt: &str,
    principal: &str,
    iterations: NonZeroU32,
) -> DerivedKey {
    derive(secret.as_bytes(), salt, principal, iterations)
}

fn derive(secret: &[u8], salt: &str, principal: &str, iterations: NonZeroU32) -> DerivedKey {
    let mut kdf_salt = Vec::with_capacity(salt.len() + principal.len());
    kdf_salt.extend_from_slice(salt.as_bytes());
    kdf_salt.extend_from_slice(principal.as_bytes());

    let mut key = DerivedKey {
        bytes: [0u8; KEY_LEN],
    };
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA512,
        iterations,
        &kdf_salt,
        secret,
        &mut key.bytes,
    );
    key
}
