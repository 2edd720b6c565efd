/// Tenant push credential cipher
///
/// Push-gateway server keys are stored encrypted on the tenant's app record
/// as base64 of `[nonce (12 bytes)][ciphertext][tag (16 bytes)]` under
/// AES-256-GCM. The nonce is random per encryption.
use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use base64::engine::{general_purpose::STANDARD, Engine};
use rand::Rng;
use thiserror::Error;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CipherError {
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("credential is not valid base64: {0}")]
    Encoding(String),
}

#[derive(Clone)]
pub struct CredentialCipher {
    cipher: Aes256Gcm,
}

impl CredentialCipher {
    pub fn new(key: &[u8; 32]) -> Self {
        let key = aes_gcm::Key::<Aes256Gcm>::from_slice(key);
        Self {
            cipher: Aes256Gcm::new(key),
        }
    }

    /// Encrypt a credential into its stored base64 form
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        let nonce_bytes: [u8; NONCE_LEN] = rand::thread_rng().gen();
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, Payload::from(plaintext.as_bytes()))
            .map_err(|e| CipherError::EncryptionFailed(format!("AES-GCM failed: {e}")))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);

        Ok(STANDARD.encode(sealed))
    }

    /// Decrypt a stored base64 credential
    pub fn decrypt(&self, encoded: &str) -> Result<String, CipherError> {
        let sealed = STANDARD
            .decode(encoded.trim())
            .map_err(|e| CipherError::Encoding(e.to_string()))?;

        if sealed.len() < NONCE_LEN + TAG_LEN {
            return Err(CipherError::DecryptionFailed(
                "encrypted data too short".to_string(),
            ));
        }

        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), Payload::from(ciphertext))
            .map_err(|e| CipherError::DecryptionFailed(format!("AES-GCM failed: {e}")))?;

        String::from_utf8(plaintext)
            .map_err(|e| CipherError::DecryptionFailed(format!("invalid UTF-8: {e}")))
    }
}
