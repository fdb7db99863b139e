//! Authenticated encryption for archive payloads
//!
//! Scheme 2 is AES-256-GCM with a 96-bit random nonce and no associated data;
//! the 16-byte tag is appended to the ciphertext. Scheme 1 is AES-256-CBC
//! with PKCS#7 padding followed by HMAC-SHA256 over IV‖ciphertext
//! (encrypt-then-MAC). The MAC is always checked before any decryption.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::key_derivation::{
    derive_key_v2, derive_keys_v1, random_bytes, Argon2Params, SALT_LEN,
};
use crate::error::{BackupError, BackupResult};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type HmacSha256 = Hmac<Sha256>;

/// Size of the AES-GCM nonce in bytes (96 bits)
pub const NONCE_LEN: usize = 12;

/// Size of the AES-CBC IV in bytes
pub const IV_LEN: usize = 16;

/// Size of the scheme 1 HMAC trailer
pub const MAC_LEN: usize = 32;

/// The key-derivation and cipher parameters of one archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CryptoSuite {
    /// PBKDF2-SHA256 + AES-256-CBC + HMAC-SHA256
    V1 {
        iterations: u32,
        salt: Vec<u8>,
        iv: Vec<u8>,
    },
    /// Argon2id + AES-256-GCM
    V2 {
        params: Argon2Params,
        salt: Vec<u8>,
        nonce: Vec<u8>,
    },
}

impl CryptoSuite {
    /// Archive format version that carries this suite
    pub fn format_version(&self) -> u8 {
        match self {
            Self::V1 { .. } => 1,
            Self::V2 { .. } => 2,
        }
    }
}

/// Encrypted bytes plus the detached MAC scheme 1 needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ciphertext {
    /// Ciphertext (scheme 2: including the trailing GCM tag)
    pub body: Vec<u8>,
    /// HMAC-SHA256 over IV‖body, scheme 1 only
    pub mac: Option<[u8; MAC_LEN]>,
}

/// Result of one encryption: the suite to record plus the ciphertext
#[derive(Debug, Clone)]
pub struct Sealed {
    pub suite: CryptoSuite,
    pub ciphertext: Ciphertext,
}

/// Encrypt with scheme 2 under a fresh salt and nonce
pub fn encrypt_v2(password: &[u8], plaintext: &[u8], params: &Argon2Params) -> BackupResult<Sealed> {
    let salt = random_bytes(SALT_LEN);
    let nonce_bytes = random_bytes(NONCE_LEN);
    let key = derive_key_v2(password, &salt, params)?;

    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| BackupError::Crypto(format!("Failed to create cipher: {}", e)))?;

    let body = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|e| BackupError::Crypto(format!("Encryption failed: {}", e)))?;

    Ok(Sealed {
        suite: CryptoSuite::V2 {
            params: *params,
            salt,
            nonce: nonce_bytes,
        },
        ciphertext: Ciphertext { body, mac: None },
    })
}

/// Encrypt with the legacy scheme 1
///
/// Only used to produce legacy archives (compatibility tests, fixtures);
/// new backups always go through [`encrypt_v2`].
pub fn encrypt_v1(password: &[u8], plaintext: &[u8], iterations: u32) -> BackupResult<Sealed> {
    let salt = random_bytes(SALT_LEN);
    let iv = random_bytes(IV_LEN);
    let keys = derive_keys_v1(password, &salt, iterations)?;

    let body = Aes256CbcEnc::new_from_slices(keys.cipher_key(), &iv)
        .map_err(|e| BackupError::Crypto(format!("Failed to create cipher: {}", e)))?
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let mut mac = <HmacSha256 as Mac>::new_from_slice(keys.mac_key())
        .map_err(|e| BackupError::Crypto(format!("Failed to create MAC: {}", e)))?;
    mac.update(&iv);
    mac.update(&body);
    let mut tag = [0u8; MAC_LEN];
    tag.copy_from_slice(&mac.finalize().into_bytes());

    Ok(Sealed {
        suite: CryptoSuite::V1 {
            iterations,
            salt,
            iv,
        },
        ciphertext: Ciphertext {
            body,
            mac: Some(tag),
        },
    })
}

/// Decrypt a payload under whichever suite its header declared
///
/// Tag or MAC mismatch yields [`BackupError::Authentication`]; a wrong
/// password cannot be told apart from tampered data.
pub fn decrypt(
    suite: &CryptoSuite,
    password: &[u8],
    ciphertext: &Ciphertext,
) -> BackupResult<Vec<u8>> {
    match suite {
        CryptoSuite::V2 {
            params,
            salt,
            nonce,
        } => {
            if nonce.len() != NONCE_LEN {
                return Err(BackupError::Format(format!(
                    "Invalid nonce size: expected {}, got {}",
                    NONCE_LEN,
                    nonce.len()
                )));
            }

            let key = derive_key_v2(password, salt, params)?;
            let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
                .map_err(|e| BackupError::Crypto(format!("Failed to create cipher: {}", e)))?;

            cipher
                .decrypt(Nonce::from_slice(nonce), ciphertext.body.as_ref())
                .map_err(|_| BackupError::Authentication("AEAD tag mismatch".into()))
        }
        CryptoSuite::V1 {
            iterations,
            salt,
            iv,
        } => {
            let tag = ciphertext
                .mac
                .ok_or_else(|| BackupError::Format("Missing HMAC trailer".into()))?;

            let keys = derive_keys_v1(password, salt, *iterations)?;

            let mut mac = <HmacSha256 as Mac>::new_from_slice(keys.mac_key())
                .map_err(|e| BackupError::Crypto(format!("Failed to create MAC: {}", e)))?;
            mac.update(iv);
            mac.update(&ciphertext.body);
            mac.verify_slice(&tag)
                .map_err(|_| BackupError::Authentication("HMAC mismatch".into()))?;

            Aes256CbcDec::new_from_slices(keys.cipher_key(), iv)
                .map_err(|e| BackupError::Format(format!("Invalid IV: {}", e)))?
                .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext.body)
                .map_err(|_| BackupError::Authentication("Invalid padding".into()))
        }
    }
}
