//! Cryptographic functions for TermBackup
//!
//! Two schemes coexist. Scheme 1 (PBKDF2-SHA256 + AES-256-CBC + HMAC-SHA256)
//! is kept for decrypting legacy archives; scheme 2 (Argon2id + AES-256-GCM) is
//! used for everything new. Callers pick the scheme by decoding an archive
//! header into a [`CryptoSuite`] and hand it to [`decrypt`].

pub mod encryption;
pub mod key_derivation;
pub mod secure_memory;

pub use encryption::{decrypt, encrypt_v1, encrypt_v2, Ciphertext, CryptoSuite, Sealed};
pub use key_derivation::{
    derive_key_v2, derive_keys_v1, random_bytes, Argon2Params, DerivedKey, LegacyKeys,
    MAX_ARGON2_MEMORY_KIB, MAX_ARGON2_TIME_COST, MAX_PBKDF2_ITERATIONS, PBKDF2_ITERATIONS,
    SALT_LEN,
};
pub use secure_memory::Password;
