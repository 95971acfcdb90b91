//! Process configuration.
//!
//! All settings are read once at startup. The only required value is the
//! process secret; everything else has a default that matches the storage
//! format already in use.

use std::fmt;
use std::num::NonZeroU32;

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{FieldVaultError, Result};

/// Environment variable holding the process secret.
pub const ENV_SECRET: &str = "ENCRYPTION_KEY";

/// Environment variable selecting the decrypt failure policy.
pub const ENV_DECRYPT_POLICY: &str = "ENCRYPTION_DECRYPT_POLICY";

/// Environment variable overriding the PBKDF2 iteration count.
pub const ENV_KDF_ITERATIONS: &str = "ENCRYPTION_KDF_ITERATIONS";

/// Environment variable holding the bearer-token signing secret.
pub const ENV_TOKEN_SECRET: &str = "AUTH_TOKEN_SECRET";

/// PBKDF2 iteration count used by all persisted data.
pub const DEFAULT_KDF_ITERATIONS: u32 = 100_000;

// ---------------------------------------------------------------------------
// Secret
// ---------------------------------------------------------------------------

/// A long-lived secret byte string.
///
/// - Never empty. Construction fails with a configuration error instead.
/// - Not printable. `Debug` is redacted.
/// - Zeroised on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Secret {
    bytes: Vec<u8>,
}

impl Secret {
    /// Wrap raw secret bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(FieldVaultError::Configuration(
                "secret must not be empty".into(),
            ));
        }
        Ok(Self { bytes })
    }

    /// Borrow the raw bytes. Raw bytes never leave the crate.
    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

// ---------------------------------------------------------------------------
// Decrypt policy
// ---------------------------------------------------------------------------

/// What to do when a value has the shape of an envelope but cannot be
/// decrypted under the caller's key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecryptPolicy {
    /// Substitute a field-specific default and keep serving the read.
    #[default]
    Fallback,
    /// Return [`FieldVaultError::DecryptionFailed`] to the caller.
    FailClosed,
}

impl DecryptPolicy {
    fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "fallback" => Ok(Self::Fallback),
            "fail-closed" | "fail_closed" | "strict" => Ok(Self::FailClosed),
            other => Err(FieldVaultError::Configuration(format!(
                "unknown decrypt policy `{other}`"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Vault configuration
// ---------------------------------------------------------------------------

/// Everything the field cipher and principal resolver need from the process
/// environment.
#[derive(Debug, Clone)]
pub struct VaultConfig {
    /// Secret mixed into every key derivation.
    pub secret: Secret,
    /// Behavior on unrecoverable decryption.
    pub policy: DecryptPolicy,
    /// PBKDF2 rounds. Changing this makes existing envelopes unreadable.
    pub kdf_iterations: NonZeroU32,
    /// Secret used to verify bearer tokens, if token auth is enabled.
    pub token_secret: Option<Secret>,
}

impl VaultConfig {
    /// Build a configuration around `secret` with all defaults.
    pub fn new(secret: Secret) -> Self {
        Self {
            secret,
            policy: DecryptPolicy::default(),
            kdf_iterations: default_iterations(),
            token_secret: None,
        }
    }

    /// Replace the decrypt policy.
    pub fn with_policy(mut self, policy: DecryptPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replace the PBKDF2 iteration count.
    pub fn with_kdf_iterations(mut self, iterations: NonZeroU32) -> Self {
        self.kdf_iterations = iterations;
        self
    }

    /// Enable bearer-token verification with `secret`.
    pub fn with_token_secret(mut self, secret: Secret) -> Self {
        self.token_secret = Some(secret);
        self
    }

    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through an arbitrary key lookup.
    ///
    /// A missing or empty [`ENV_SECRET`] is a configuration error. An empty
    /// [`ENV_TOKEN_SECRET`] is treated as absent.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let secret = lookup(ENV_SECRET).ok_or_else(|| {
            FieldVaultError::Configuration(format!("{ENV_SECRET} is not set"))
        })?;
        let secret = Secret::new(secret)
            .map_err(|_| FieldVaultError::Configuration(format!("{ENV_SECRET} is empty")))?;

        let policy = match lookup(ENV_DECRYPT_POLICY) {
            Some(raw) => DecryptPolicy::parse(&raw)?,
            None => DecryptPolicy::default(),
        };

        let kdf_iterations = match lookup(ENV_KDF_ITERATIONS) {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .ok()
                .and_then(NonZeroU32::new)
                .ok_or_else(|| {
                    FieldVaultError::Configuration(format!(
                        "{ENV_KDF_ITERATIONS} must be a positive integer"
                    ))
                })?,
            None => default_iterations(),
        };

        let token_secret = lookup(ENV_TOKEN_SECRET).and_then(|raw| Secret::new(raw).ok());

        Ok(Self {
            secret,
            policy,
            kdf_iterations,
            token_secret,
        })
    }
}

fn default_iterations() -> NonZeroU32 {
    NonZeroU32::MIN.saturating_add(DEFAULT_KDF_ITERATIONS - 1)
}
