use crate::error::{Error, Result};
use aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::Rng;
use std::fmt;
use std::fs;
use std::path::Path;
use zeroize::{Zeroize, ZeroizeOnDrop};

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// Symmetric key protecting stored passwords with AES-256-GCM.
///
/// Ciphertexts are `base64(nonce || ciphertext)`, and an empty plaintext is
/// stored as an empty string so blank passwords stay blank on disk.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey([u8; KEY_LEN]);

impl EncryptionKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        EncryptionKey(bytes)
    }

    pub fn generate() -> Self {
        let mut key = [0u8; KEY_LEN];
        rand::rng().fill(&mut key);
        EncryptionKey(key)
    }

    /// Reads the key file, creating it with a fresh random key on first use.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if !path.exists() {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(|e| Error::from_io(parent, e))?;
            }
            let key = Self::generate();
            fs::write(path, key.0).map_err(|e| Error::from_io(path, e))?;
            tracing::info!(path = %path.display(), "generated new encryption key");
            return Ok(key);
        }

        let mut data = fs::read(path).map_err(|e| Error::from_io(path, e))?;
        if data.len() < KEY_LEN {
            data.zeroize();
            return Err(Error::CorruptData(format!(
                "key file {} is shorter than {} bytes",
                path.display(),
                KEY_LEN
            )));
        }
        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(&data[..KEY_LEN]);
        data.zeroize();
        Ok(EncryptionKey(key))
    }

    pub fn encrypt(&self, plain: &str) -> Result<String> {
        if plain.is_empty() {
            return Ok(String::new());
        }
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.0));
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rng().fill(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ct = cipher
            .encrypt(nonce, plain.as_bytes())
            .map_err(|_| Error::Validation("password encryption failed".to_string()))?;

        let mut blob = nonce_bytes.to_vec();
        blob.extend(ct);
        Ok(STANDARD.encode(blob))
    }

    pub fn decrypt(&self, blob: &str) -> Result<String> {
        if blob.is_empty() {
            return Ok(String::new());
        }
        let bytes = STANDARD
            .decode(blob)
            .map_err(|e| Error::CorruptData(format!("password is not valid base64: {}", e)))?;
        if bytes.len() <= NONCE_LEN {
            return Err(Error::CorruptData("password ciphertext is truncated".to_string()));
        }

        let (nonce_bytes, ct) = bytes.split_at(NONCE_LEN);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.0));
        let pt = cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ct)
            .map_err(|_| {
                Error::CorruptData("password decryption failed (key mismatch?)".to_string())
            })?;
        String::from_utf8(pt)
            .map_err(|_| Error::CorruptData("decrypted password is not UTF-8".to_string()))
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tempfile::TempDir;

    #[test]
    fn test_password_encryption_decryption() {
        let key = EncryptionKey::from_bytes([7u8; 32]);
        let plaintext = "my_secret_password";
        let blob = key.encrypt(plaintext).unwrap();

        assert_ne!(blob, plaintext);
        assert_eq!(key.decrypt(&blob).unwrap(), plaintext);
    }

    #[test]
    fn test_nonce_differs_between_encryptions() {
        let key = EncryptionKey::generate();
        assert_ne!(key.encrypt("same").unwrap(), key.encrypt("same").unwrap());
    }

    #[test]
    fn test_empty_password_stays_empty() {
        let key = EncryptionKey::generate();
        assert_eq!(key.encrypt("").unwrap(), "");
        assert_eq!(key.decrypt("").unwrap(), "");
    }

    #[test]
    fn test_key_mismatch_is_corrupt_data() {
        let blob = EncryptionKey::from_bytes([1u8; 32]).encrypt("secret").unwrap();
        let err = EncryptionKey::from_bytes([2u8; 32]).decrypt(&blob).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CorruptData);
    }

    #[test]
    fn test_garbage_ciphertext_is_corrupt_data() {
        let key = EncryptionKey::generate();
        assert_eq!(key.decrypt("not base64!").unwrap_err().kind(), ErrorKind::CorruptData);
        assert_eq!(key.decrypt("AAAA").unwrap_err().kind(), ErrorKind::CorruptData);
    }

    #[test]
    fn test_load_or_create_is_stable() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("key.bin");

        let first = EncryptionKey::load_or_create(&path).unwrap();
        assert!(path.exists());
        let second = EncryptionKey::load_or_create(&path).unwrap();

        let blob = first.encrypt("pw").unwrap();
        assert_eq!(second.decrypt(&blob).unwrap(), "pw");
    }

    #[test]
    fn test_short_key_file_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("key.bin");
        std::fs::write(&path, [0u8; 5]).unwrap();

        let err = EncryptionKey::load_or_create(&path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CorruptData);
    }

    #[test]
    fn test_debug_does_not_leak_key() {
        let key = EncryptionKey::from_bytes([42u8; 32]);
        assert_eq!(format!("{:?}", key), "EncryptionKey(..)");
    }
}
