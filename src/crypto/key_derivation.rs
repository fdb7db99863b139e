//! Key derivation for both archive schemes
//!
//! Scheme 2 derives a single AES-256 key with Argon2id, a memory-hard
//! key derivation function resistant to GPU/ASIC attacks. Scheme 1 derives
//! 64 bytes with PBKDF2-SHA256 and splits them into a cipher key and a MAC key.

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::OsRng;
use argon2::{Algorithm, Argon2, Params, Version};
use pbkdf2::pbkdf2_hmac;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{BackupError, BackupResult};

/// Salt length used for both schemes
pub const SALT_LEN: usize = 32;

/// PBKDF2 iteration count written by scheme 1
pub const PBKDF2_ITERATIONS: u32 = 600_000;

/// Largest PBKDF2 iteration count accepted from an archive header
pub const MAX_PBKDF2_ITERATIONS: u32 = 10_000_000;

/// Largest Argon2 memory cost accepted from an archive header (4 GiB)
pub const MAX_ARGON2_MEMORY_KIB: u32 = 4 * 1024 * 1024;

/// Largest Argon2 time cost accepted from an archive header
pub const MAX_ARGON2_TIME_COST: u16 = 64;

/// Argon2id cost parameters, recorded in every format-2 header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Argon2Params {
    /// Memory cost in KiB (default: 65536 = 64 MiB)
    pub memory_kib: u32,
    /// Time cost (iterations, default: 3)
    pub time_cost: u16,
    /// Parallelism degree (default: 4)
    pub parallelism: u8,
}

impl Default for Argon2Params {
    fn default() -> Self {
        Self {
            memory_kib: 65536, // 64 MiB
            time_cost: 3,
            parallelism: 4,
        }
    }
}

impl Argon2Params {
    /// Create params with specific values
    pub fn new(memory_kib: u32, time_cost: u16, parallelism: u8) -> Self {
        Self {
            memory_kib,
            time_cost,
            parallelism,
        }
    }
}

/// A derived 32-byte AES-256 key, zeroed on drop
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey {
    key: [u8; 32],
}

impl DerivedKey {
    /// Get the key bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.key
    }
}

/// Scheme 1 key material: cipher key and HMAC key
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct LegacyKeys {
    cipher_key: [u8; 32],
    mac_key: [u8; 32],
}

impl LegacyKeys {
    pub fn cipher_key(&self) -> &[u8; 32] {
        &self.cipher_key
    }

    pub fn mac_key(&self) -> &[u8; 32] {
        &self.mac_key
    }
}

/// Derive the scheme 2 key with Argon2id
pub fn derive_key_v2(
    password: &[u8],
    salt: &[u8],
    params: &Argon2Params,
) -> BackupResult<DerivedKey> {
    let argon2_params = Params::new(
        params.memory_kib,
        u32::from(params.time_cost),
        u32::from(params.parallelism),
        Some(32), // Output length for AES-256
    )
    .map_err(|e| BackupError::Crypto(format!("Invalid Argon2 parameters: {}", e)))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params);

    let mut key = [0u8; 32];
    argon2
        .hash_password_into(password, salt, &mut key)
        .map_err(|e| BackupError::Crypto(format!("Key derivation failed: {}", e)))?;

    Ok(DerivedKey { key })
}

/// Derive the scheme 1 keys with PBKDF2-HMAC-SHA256
pub fn derive_keys_v1(password: &[u8], salt: &[u8], iterations: u32) -> BackupResult<LegacyKeys> {
    if iterations == 0 {
        return Err(BackupError::Crypto(
            "PBKDF2 iteration count must be positive".into(),
        ));
    }

    let mut material = [0u8; 64];
    pbkdf2_hmac::<Sha256>(password, salt, iterations, &mut material);

    let mut keys = LegacyKeys {
        cipher_key: [0u8; 32],
        mac_key: [0u8; 32],
    };
    keys.cipher_key.copy_from_slice(&material[..32]);
    keys.mac_key.copy_from_slice(&material[32..]);
    material.zeroize();

    Ok(keys)
}

/// Fill a fresh buffer from the OS CSPRNG
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap() -> Argon2Params {
        Argon2Params::new(256, 1, 1)
    }

    #[test]
    fn test_default_params() {
        let params = Argon2Params::default();
        assert_eq!(params.memory_kib, 65536);
        assert_eq!(params.time_cost, 3);
        assert_eq!(params.parallelism, 4);
    }

    #[test]
    fn test_same_password_same_key() {
        let salt = random_bytes(SALT_LEN);
        let key1 = derive_key_v2(b"test_passphrase", &salt, &cheap()).unwrap();
        let key2 = derive_key_v2(b"test_passphrase", &salt, &cheap()).unwrap();
        assert_eq!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_different_salt_different_key() {
        let key1 = derive_key_v2(b"same", &random_bytes(SALT_LEN), &cheap()).unwrap();
        let key2 = derive_key_v2(b"same", &random_bytes(SALT_LEN), &cheap()).unwrap();
        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_invalid_argon2_params_rejected() {
        let result = derive_key_v2(b"pw", &random_bytes(SALT_LEN), &Argon2Params::new(1, 1, 4));
        assert!(matches!(result, Err(BackupError::Crypto(_))));
    }

    #[test]
    fn test_legacy_keys_are_split() {
        let salt = random_bytes(SALT_LEN);
        let keys = derive_keys_v1(b"pw", &salt, 1000).unwrap();
        assert_ne!(keys.cipher_key(), keys.mac_key());

        let again = derive_keys_v1(b"pw", &salt, 1000).unwrap();
        assert_eq!(keys.cipher_key(), again.cipher_key());
    }

    #[test]
    fn test_zero_iterations_rejected() {
        assert!(derive_keys_v1(b"pw", b"salt", 0).is_err());
    }

    #[test]
    fn test_random_bytes_are_fresh() {
        assert_eq!(random_bytes(12).len(), 12);
        assert_ne!(random_bytes(32), random_bytes(32));
    }
}
