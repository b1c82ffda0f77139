//! Row sealing and keyed URL digests.
//!
//! Key material arrives from the outside as opaque byte strings; derivation
//! and provisioning are not this crate's concern. The encryption key is
//! folded through SHA-256 into the fixed-size AES-256-GCM key, and the
//! authentication key is mixed into every URL digest so digests from
//! different profiles are not linkable.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::RngCore;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};

use crate::Error;

/// AES-GCM nonce width in bytes.
const NONCE_LEN: usize = 12;

/// Opaque key material supplied by the key provider.
#[derive(Clone)]
pub struct KeyMaterial {
    pub authentication: Vec<u8>,
    pub encryption: Vec<u8>,
}

impl KeyMaterial {
    pub fn new(authentication: Vec<u8>, encryption: Vec<u8>) -> Self {
        Self { authentication, encryption }
    }
}

/// Seals and opens row payloads and computes storage lookup digests.
///
/// Cheap to clone; background tasks carry their own copy so no lock is
/// ever held across a decrypt.
#[derive(Clone)]
pub struct Cipher {
    aead: Aes256Gcm,
    auth_key: Vec<u8>,
}

impl Cipher {
    pub fn new(keys: &KeyMaterial) -> Self {
        let key: [u8; 32] = Sha256::digest(&keys.encryption).into();
        Self {
            aead: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key)),
            auth_key: keys.authentication.clone(),
        }
    }

    /// Compute the keyed digest used as the storage lookup key for a URL.
    pub fn url_digest(&self, url: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.auth_key);
        hasher.update(b"\n");
        hasher.update(url.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Serialize `value` as JSON and seal it with a fresh random nonce.
    ///
    /// Returns `(nonce, ciphertext)` ready for row storage.
    pub fn seal_json<T: Serialize>(&self, value: &T) -> Result<(Vec<u8>, Vec<u8>), Error> {
        let plaintext = serde_json::to_vec(value)?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .aead
            .encrypt(nonce, plaintext.as_slice())
            .map_err(|e| Error::Crypto(format!("seal failed: {e}")))?;

        Ok((nonce_bytes.to_vec(), ciphertext))
    }

    /// Open a sealed row payload and deserialize it.
    ///
    /// Fails on truncated nonces, tampered ciphertext, or a key mismatch;
    /// callers loading rows in bulk skip such rows instead of aborting.
    pub fn open_json<T: DeserializeOwned>(&self, nonce: &[u8], ciphertext: &[u8]) -> Result<T, Error> {
        if nonce.len() != NONCE_LEN {
            return Err(Error::Crypto(format!("invalid nonce length {}", nonce.len())));
        }

        let plaintext = self
            .aead
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| Error::Crypto("open failed: wrong key or tampered row".to_string()))?;

        Ok(serde_json::from_slice(&plaintext)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cipher() -> Cipher {
        Cipher::new(&KeyMaterial::new(b"auth-key".to_vec(), b"encryption-key".to_vec()))
    }

    #[test]
    fn test_digest_stability() {
        let cipher = test_cipher();
        assert_eq!(cipher.url_digest("https://example.com"), cipher.url_digest("https://example.com"));
    }

    #[test]
    fn test_digest_format() {
        let digest = test_cipher().url_digest("https://example.com");
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_digest_depends_on_auth_key() {
        let a = Cipher::new(&KeyMaterial::new(b"one".to_vec(), b"enc".to_vec()));
        let b = Cipher::new(&KeyMaterial::new(b"two".to_vec(), b"enc".to_vec()));
        assert_ne!(a.url_digest("https://example.com"), b.url_digest("https://example.com"));
    }

    #[test]
    fn test_seal_open_round_trip() {
        let cipher = test_cipher();
        let (nonce, sealed) = cipher.seal_json(&"hello".to_string()).unwrap();
        let opened: String = cipher.open_json(&nonce, &sealed).unwrap();
        assert_eq!(opened, "hello");
    }

    #[test]
    fn test_open_with_wrong_key_fails() {
        let cipher = test_cipher();
        let other = Cipher::new(&KeyMaterial::new(b"auth-key".to_vec(), b"different".to_vec()));
        let (nonce, sealed) = cipher.seal_json(&42u64).unwrap();
        assert!(other.open_json::<u64>(&nonce, &sealed).is_err());
    }

    #[test]
    fn test_open_tampered_row_fails() {
        let cipher = test_cipher();
        let (nonce, mut sealed) = cipher.seal_json(&42u64).unwrap();
        sealed[0] ^= 0xff;
        assert!(cipher.open_json::<u64>(&nonce, &sealed).is_err());
    }

    #[test]
    fn test_open_bad_nonce_length_fails() {
        let cipher = test_cipher();
        let (_, sealed) = cipher.seal_json(&42u64).unwrap();
        assert!(cipher.open_json::<u64>(&[0u8; 4], &sealed).is_err());
    }

    #[test]
    fn test_nonces_are_unique_per_seal() {
        let cipher = test_cipher();
        let (n1, _) = cipher.seal_json(&1u8).unwrap();
        let (n2, _) = cipher.seal_json(&1u8).unwrap();
        assert_ne!(n1, n2);
    }
}
