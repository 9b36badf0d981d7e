//! Symmetric cipher context: AES-256-CBC with PKCS#7 padding.
//!
//! The 32-byte key is the first 32 characters of the lowercase hex SHA-256
//! digest of the configured cipher key. The IV is fixed, so encryption is
//! deterministic for a given key and plaintext. Ciphertext travels as
//! standard base64.

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use sha2::{Digest, Sha256};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

const IV: &[u8; 16] = b"0123456789012345";

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("ciphertext is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("decryption failed: bad padding or wrong cipher key")]
    Padding,

    #[error("decrypted text is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("invalid key or IV length")]
    InvalidLength,
}

/// Cipher derived from a cipher key. Stateless between calls and safe to
/// share across tasks.
#[derive(Clone)]
pub struct Cipher {
    key: [u8; 32],
}

impl std::fmt::Debug for Cipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cipher").finish_non_exhaustive()
    }
}

impl Cipher {
    pub fn new(cipher_key: &str) -> Self {
        let digest = Sha256::digest(cipher_key.as_bytes());
        let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        let mut key = [0u8; 32];
        for (dst, src) in key.iter_mut().zip(hex.bytes()) {
            *dst = src;
        }
        Self { key }
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let enc = Aes256CbcEnc::new_from_slices(&self.key, IV)
            .map_err(|_| CryptoError::InvalidLength)?;
        Ok(enc.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
    }

    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let dec = Aes256CbcDec::new_from_slices(&self.key, IV)
            .map_err(|_| CryptoError::InvalidLength)?;
        dec.decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| CryptoError::Padding)
    }

    /// Encrypt UTF-8 text and return the ciphertext as base64.
    pub fn encrypt_string(&self, plaintext: &str) -> Result<String, CryptoError> {
        Ok(BASE64.encode(self.encrypt(plaintext.as_bytes())?))
    }

    /// Decode base64 ciphertext and decrypt it back to UTF-8 text.
    pub fn decrypt_string(&self, encoded: &str) -> Result<String, CryptoError> {
        let ciphertext = BASE64.decode(encoded)?;
        Ok(String::from_utf8(self.decrypt(&ciphertext)?)?)
    }
}
