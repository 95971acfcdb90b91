//! Structured record transforms.
//!
//! Applies the field cipher to a named subset of a record's fields. Records
//! are JSON objects; every transform returns a new value and leaves the
//! caller's record untouched. Key order is preserved.
//!
//! Only fields that are present and non-null are touched. Nothing in this
//! module logs field values, only field names.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::cipher::FieldCipher;
use crate::error::{FieldVaultError, Result};
use crate::fields::fallback_for;
use crate::legacy;

/// Encrypt `fields` of `record` for `principal`.
///
/// A non-object record has no fields and is returned as is. Any encryption
/// failure aborts the whole record.
pub fn encrypt_fields(
    cipher: &FieldCipher,
    record: &Value,
    fields: &[&str],
    principal: &str,
) -> Result<Value> {
    let mut out = record.clone();
    let Some(map) = out.as_object_mut() else {
        return Ok(out);
    };

    for &field in fields {
        if let Some(slot) = map.get_mut(field).filter(|v| !v.is_null()) {
            *slot = Value::String(cipher.encrypt(slot, principal)?);
        }
    }

    Ok(out)
}

/// Decrypt `fields` of `record` for `principal`.
///
/// Each field takes its own path through the legacy/fallback machine, so a
/// corrupt title does not affect the description next to it.
pub fn decrypt_fields(
    cipher: &FieldCipher,
    record: &Value,
    fields: &[&str],
    principal: &str,
) -> Result<Value> {
    let mut out = record.clone();
    let Some(map) = out.as_object_mut() else {
        return Ok(out);
    };

    for &field in fields {
        if let Some(slot) = map.get_mut(field).filter(|v| !v.is_null()) {
            *slot = legacy::resolve(cipher, field, slot, principal, fallback_for(field))?;
        }
    }

    Ok(out)
}

/// Encrypt every record in `records`. Non-object entries are copied through.
pub fn encrypt_many(
    cipher: &FieldCipher,
    records: &[Value],
    fields: &[&str],
    principal: &str,
) -> Result<Vec<Value>> {
    records
        .iter()
        .map(|record| encrypt_fields(cipher, record, fields, principal))
        .collect()
}

/// Decrypt every record in `records`.
///
/// The batch never aborts. Null and non-object entries are copied through,
/// and under fail-closed a record that fails is returned exactly as stored
/// while the rest of the batch is still decrypted.
pub fn decrypt_many(
    cipher: &FieldCipher,
    records: &[Value],
    fields: &[&str],
    principal: &str,
) -> Vec<Value> {
    records
        .iter()
        .enumerate()
        .map(|(index, record)| {
            if !record.is_object() {
                return record.clone();
            }
            decrypt_fields(cipher, record, fields, principal).unwrap_or_else(|err| {
                warn!(index, error = %err, "leaving record encrypted");
                record.clone()
            })
        })
        .collect()
}

/// Serialize a typed record and encrypt its `fields`.
pub fn encrypt_record<T: Serialize>(
    cipher: &FieldCipher,
    record: &T,
    fields: &[&str],
    principal: &str,
) -> Result<Value> {
    let value =
        serde_json::to_value(record).map_err(|e| FieldVaultError::Serialization(e.to_string()))?;
    encrypt_fields(cipher, &value, fields, principal)
}

/// Decrypt `fields` of a stored record and deserialize it into `T`.
pub fn decrypt_record<T: DeserializeOwned>(
    cipher: &FieldCipher,
    record: &Value,
    fields: &[&str],
    principal: &str,
) -> Result<T> {
    let value = decrypt_fields(cipher, record, fields, principal)?;
    serde_json::from_value(value).map_err(|e| FieldVaultError::Serialization(e.to_string()))
}
