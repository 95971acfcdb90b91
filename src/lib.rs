//! # fieldvault
//!
//! Field-level envelope encryption for document records.
//!
//! Sensitive fields of a record (titles, free text, preference blobs) are
//! encrypted individually before they reach storage and decrypted after they
//! leave it. Every value gets its own salt, IV and PBKDF2-derived key, bound
//! to the principal that owns the data. Reads tolerate plaintext written
//! before encryption existed and, by default, substitute safe placeholders
//! for values that cannot be decrypted.
//!
//! ## Public API
//!
//! - [`FieldCipher`] encrypts and decrypts single values.
//! - [`record`] applies the cipher to named fields of JSON records.
//! - [`PrincipalResolver`] turns request context into the principal string.
//! - [`VaultConfig`] loads the process secret and policy from the environment.
//!
//! ```no_run
//! use fieldvault::{record, FieldCipher, RecordKind};
//! use serde_json::json;
//!
//! # fn main() -> Result<(), fieldvault::error::FieldVaultError> {
//! let cipher = FieldCipher::from_env()?;
//! let fields = RecordKind::Todo.sensitive_fields();
//!
//! let todo = json!({"id": 1, "title": "Buy milk", "done": false});
//! let stored = record::encrypt_fields(&cipher, &todo, fields, "user-42")?;
//! let shown = record::decrypt_fields(&cipher, &stored, fields, "user-42")?;
//! assert_eq!(shown, todo);
//! # Ok(())
//! # }
//! ```

pub mod cipher;
pub mod config;
pub(crate) mod crypto;
pub mod envelope;
pub mod error;
pub mod fields;
pub mod keys;
pub mod legacy;
pub mod principal;
pub mod record;

pub use cipher::FieldCipher;
pub use config::{DecryptPolicy, Secret, VaultConfig};
pub use error::{DecryptFailure, FieldVaultError};
pub use fields::RecordKind;
pub use principal::{Principal, PrincipalResolver, RequestContext};
