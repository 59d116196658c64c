//! Client-side key custody: AES-256-GCM with a fresh 12-byte IV per
//! encryption, and URL-fragment transport of the key.
//!
//! Nothing under `handlers`, `services` or `storage` imports this module.
//! The server only ever sees ciphertext and the IV.

mod encoding;
mod link;

pub use encoding::{decode_from_url, encode_for_url};
pub use link::{parse_share_link, share_link, ShareLink, DOWNLOAD_ROUTE};

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt;

pub const KEY_LEN: usize = 32;
pub const IV_LEN: usize = 12;
/// GCM tag appended to every ciphertext
pub const TAG_LEN: usize = 16;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CustodyError {
    /// Tag verification failed. A wrong key, a wrong IV and tampered
    /// ciphertext are deliberately indistinguishable.
    #[error("link invalid or corrupted")]
    AuthenticationFailure,

    #[error("key must be {KEY_LEN} bytes, got {0}")]
    InvalidKeyLength(usize),

    #[error("invalid URL-safe encoding: {0}")]
    InvalidEncoding(String),

    #[error("invalid share link: {0}")]
    InvalidLink(String),

    #[error("encryption failed")]
    Encryption,
}

pub type Result<T> = std::result::Result<T, CustodyError>;

/// A 256-bit symmetric key. Exportable by construction.
#[derive(Clone, PartialEq, Eq)]
pub struct CustodyKey([u8; KEY_LEN]);

impl fmt::Debug for CustodyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CustodyKey(..)")
    }
}

pub fn generate_key() -> CustodyKey {
    let mut bytes = [0u8; KEY_LEN];
    OsRng.fill_bytes(&mut bytes);
    CustodyKey(bytes)
}

/// Fresh random IV. Must be drawn for every encryption, never derived from the key.
pub fn generate_iv() -> [u8; IV_LEN] {
    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);
    iv
}

pub fn export_key(key: &CustodyKey) -> [u8; KEY_LEN] {
    key.0
}

pub fn import_key(bytes: &[u8]) -> Result<CustodyKey> {
    let raw: [u8; KEY_LEN] = bytes
        .try_into()
        .map_err(|_| CustodyError::InvalidKeyLength(bytes.len()))?;
    Ok(CustodyKey(raw))
}

/// Returns `ciphertext || tag`
pub fn encrypt(plaintext: &[u8], key: &CustodyKey, iv: &[u8; IV_LEN]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key.0));
    cipher
        .encrypt(Nonce::from_slice(iv), plaintext)
        .map_err(|_| CustodyError::Encryption)
}

pub fn decrypt(ciphertext: &[u8], key: &CustodyKey, iv: &[u8; IV_LEN]) -> Result<Vec<u8>> {
    if ciphertext.len() < TAG_LEN {
        return Err(CustodyError::AuthenticationFailure);
    }
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key.0));
    cipher
        .decrypt(Nonce::from_slice(iv), ciphertext)
        .map_err(|_| CustodyError::AuthenticationFailure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_roundtrip_various_lengths() {
        let key = generate_key();
        for len in [0usize, 1, 15, 16, 17, 1024, 65_537] {
            let plaintext: Vec<u8> = (0..len).map(|i| (i * 31 % 251) as u8).collect();
            let iv = generate_iv();
            let ciphertext = encrypt(&plaintext, &key, &iv).unwrap();
            assert_eq!(ciphertext.len(), len + TAG_LEN);
            assert_eq!(decrypt(&ciphertext, &key, &iv).unwrap(), plaintext);
        }
    }

    #[test]
    fn test_every_bit_flip_is_rejected() {
        let key = generate_key();
        let iv = generate_iv();
        let ciphertext = encrypt(b"attack at dawn", &key, &iv).unwrap();

        for byte in 0..ciphertext.len() {
            for bit in 0..8 {
                let mut tampered = ciphertext.clone();
                tampered[byte] ^= 1 << bit;
                assert_eq!(
                    decrypt(&tampered, &key, &iv),
                    Err(CustodyError::AuthenticationFailure),
                    "flip at byte {} bit {} was accepted",
                    byte,
                    bit
                );
            }
        }
    }

    #[test]
    fn test_wrong_key_and_wrong_iv_look_identical() {
        let key = generate_key();
        let iv = generate_iv();
        let ciphertext = encrypt(b"payload", &key, &iv).unwrap();

        let wrong_key = decrypt(&ciphertext, &generate_key(), &iv).unwrap_err();
        let wrong_iv = decrypt(&ciphertext, &key, &generate_iv()).unwrap_err();
        assert_eq!(wrong_key, wrong_iv);
        assert_eq!(wrong_key.to_string(), "link invalid or corrupted");
    }

    #[test]
    fn test_truncated_ciphertext_fails_authentication() {
        let key = generate_key();
        let iv = generate_iv();
        assert_eq!(
            decrypt(&[0u8; 5], &key, &iv),
            Err(CustodyError::AuthenticationFailure)
        );
    }

    #[test]
    fn test_key_export_import_exact() {
        let key = generate_key();
        let raw = export_key(&key);
        assert_eq!(import_key(&raw).unwrap(), key);
        assert_eq!(import_key(&raw[..31]), Err(CustodyError::InvalidKeyLength(31)));
    }

    #[test]
    fn test_generated_ivs_do_not_repeat() {
        let ivs: HashSet<[u8; IV_LEN]> = (0..1000).map(|_| generate_iv()).collect();
        assert_eq!(ivs.len(), 1000);
        assert_ne!(generate_iv(), generate_iv());
    }

    #[test]
    fn test_key_debug_does_not_leak_bytes() {
        let key = import_key(&[0xAB; KEY_LEN]).unwrap();
        let rendered = format!("{:?}", key);
        assert!(!rendered.contains("171"));
        assert!(!rendered.to_lowercase().contains("ab"));
    }
}
