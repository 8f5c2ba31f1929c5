use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use argon2::password_hash::rand_core::RngCore;
use argon2::{Algorithm, Argon2, Params, Version};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

use super::error::ApiError;
use crate::db::{meta, Database};

const SALT_META_KEY: &str = "credential_salt";
const NONCE_LEN: usize = 12;

/// Encrypts exchange secrets at rest with AES-256-GCM.
///
/// The key is derived from the operator's master passphrase with Argon2id.
/// The salt is generated once per database and kept in `app_meta`, so the
/// same passphrase keeps decrypting rows written by earlier runs.
pub struct CredentialCipher {
    cipher: Aes256Gcm,
}

impl CredentialCipher {
    pub fn new(passphrase: &str, salt: &[u8]) -> Result<Self, ApiError> {
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, Params::default());

        let mut key = [0u8; 32];
        argon2
            .hash_password_into(passphrase.as_bytes(), salt, &mut key)
            .map_err(|e| ApiError::Crypto(format!("Key derivation failed: {}", e)))?;

        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| ApiError::Crypto(format!("Failed to create cipher: {}", e)))?;
        Ok(Self { cipher })
    }

    /// Loads the database's salt, creating it on first use.
    pub fn from_database(db: &Database, passphrase: &str) -> Result<Self, ApiError> {
        let salt = {
            let conn = db
                .conn
                .lock()
                .map_err(|e| ApiError::Storage(e.to_string()))?;
            match meta::get_value(&conn, SALT_META_KEY)? {
                Some(encoded) => BASE64
                    .decode(encoded)
                    .map_err(|e| ApiError::Crypto(format!("Invalid salt: {}", e)))?,
                None => {
                    let mut salt = vec![0u8; 16];
                    OsRng.fill_bytes(&mut salt);
                    meta::set_value(&conn, SALT_META_KEY, &BASE64.encode(&salt))?;
                    log::info!("Generated new credential encryption salt");
                    salt
                }
            }
        };

        Self::new(passphrase, &salt)
    }

    /// Returns base64 of `nonce || ciphertext`.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, ApiError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self.cipher.encrypt(&nonce, plaintext.as_bytes())?;

        let mut blob = nonce.to_vec();
        blob.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(blob))
    }

    pub fn decrypt(&self, encoded: &str) -> Result<String, ApiError> {
        let blob = BASE64
            .decode(encoded)
            .map_err(|e| ApiError::Crypto(format!("Invalid ciphertext: {}", e)))?;
        if blob.len() <= NONCE_LEN {
            return Err(ApiError::Crypto("Ciphertext too short".to_string()));
        }

        let (nonce, ciphertext) = blob.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| ApiError::Crypto("Decryption failed; wrong master key?".to_string()))?;

        String::from_utf8(plaintext).map_err(|e| ApiError::Crypto(format!("Invalid UTF-8: {}", e)))
    }
}
