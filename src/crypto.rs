//! Low-level cryptographic operations.
//!
//! All other modules encrypt and decrypt exclusively through the functions
//! exposed here.
//!
//! Primitive choices:
//! - **Cipher**: AES-256-CBC with PKCS#7 padding (unauthenticated; kept for
//!   compatibility with stored envelopes)
//! - **IV**: 128-bit, generated fresh per operation via `SystemRandom`
//! - **Salt**: 256-bit, generated fresh per operation via `SystemRandom`
//! - **Key size**: 256 bits (32 bytes)

use aes::Aes256;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use ring::rand::{SecureRandom, SystemRandom};

use crate::error::{DecryptFailure, FieldVaultError, Result};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Size of a derived key in bytes (256 bits).
pub const KEY_LEN: usize = 32;

/// Size of the per-call salt in bytes.
pub const SALT_LEN: usize = 32;

/// Size of the CBC initialization vector in bytes.
pub const IV_LEN: usize = 16;

/// AES block size in bytes.
pub const BLOCK_LEN: usize = 16;

/// Fill a fresh array from the system RNG.
///
/// `SystemRandom` is the only source of randomness in the crate. There is no
/// caching and no counter-based generation.
fn random_bytes<const N: usize>() -> Result<[u8; N]> {
    let rng = SystemRandom::new();
    let mut buf = [0u8; N];
    rng.fill(&mut buf).map_err(|_| FieldVaultError::RandomnessFailure)?;
    Ok(buf)
}

/// Generate a fresh envelope salt.
pub fn generate_salt() -> Result<[u8; SALT_LEN]> {
    random_bytes()
}

/// Generate a fresh CBC initialization vector.
pub fn generate_iv() -> Result<[u8; IV_LEN]> {
    random_bytes()
}

/// Encrypt `plaintext` under AES-256-CBC with PKCS#7 padding.
///
/// The output is always a non-empty multiple of [`BLOCK_LEN`].
pub fn encrypt(key: &[u8; KEY_LEN], iv: &[u8; IV_LEN], plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256CbcEnc::new_from_slices(key, iv)
        .map_err(|_| FieldVaultError::EncryptionFailure)?;
    Ok(cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
}

/// Decrypt AES-256-CBC `ciphertext` and strip its PKCS#7 padding.
///
/// CBC carries no authentication tag. A wrong key usually surfaces as a
/// padding failure, but roughly one time in 256 it yields garbage with valid
/// padding instead. Callers must not treat success as proof of integrity.
pub fn decrypt(
    key: &[u8; KEY_LEN],
    iv: &[u8; IV_LEN],
    ciphertext: &[u8],
) -> std::result::Result<Vec<u8>, DecryptFailure> {
    if ciphertext.is_empty() || ciphertext.len() % BLOCK_LEN != 0 {
        return Err(DecryptFailure::Ciphertext);
    }

    let cipher =
        Aes256CbcDec::new_from_slices(key, iv).map_err(|_| DecryptFailure::ComponentLength)?;
    cipher
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| DecryptFailure::Padding)
}
