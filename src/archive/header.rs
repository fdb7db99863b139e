//! Bit-exact `.tbk` header framing
//!
//! Format 1: `TBK1` | version=1 | iterations u32 BE | salt_len u8 | salt |
//! iv_len u8 | iv | payload_len u64 BE. The ciphertext and a 32-byte HMAC follow.
//!
//! Format 2: `TBK2` | version=2 | kdf=0x02 | memory u32 BE | time u16 BE |
//! parallelism u8 | salt_len u8 | salt | nonce_len u8 | nonce | cipher=0x02 |
//! payload_len u64 BE. The ciphertext (tag included in `payload_len`) follows.

use std::io::{ErrorKind, Read};

use crate::crypto::{
    Argon2Params, CryptoSuite, MAX_ARGON2_MEMORY_KIB, MAX_ARGON2_TIME_COST, MAX_PBKDF2_ITERATIONS,
};
use crate::error::{BackupError, BackupResult};

pub const MAGIC_V1: &[u8; 4] = b"TBK1";
pub const MAGIC_V2: &[u8; 4] = b"TBK2";

/// KDF identifier for Argon2id
pub const KDF_ARGON2ID: u8 = 0x02;

/// Cipher suite identifier for AES-256-GCM
pub const CIPHER_AES256_GCM: u8 = 0x02;

/// Decoded archive header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveHeader {
    pub suite: CryptoSuite,
    /// Ciphertext length (format 2: including the tag; format 1: excluding the MAC)
    pub payload_len: u64,
}

impl ArchiveHeader {
    pub fn new(suite: CryptoSuite, payload_len: u64) -> Self {
        Self { suite, payload_len }
    }

    /// Format version byte
    pub fn version(&self) -> u8 {
        self.suite.format_version()
    }

    /// Exact header size in bytes, i.e. the offset of the ciphertext
    pub fn header_len(&self) -> usize {
        match &self.suite {
            CryptoSuite::V1 { salt, iv, .. } => 4 + 1 + 4 + 1 + salt.len() + 1 + iv.len() + 8,
            CryptoSuite::V2 { salt, nonce, .. } => {
                4 + 1 + 1 + 4 + 2 + 1 + 1 + salt.len() + 1 + nonce.len() + 1 + 8
            }
        }
    }

    /// Serialize the header
    pub fn encode(&self) -> BackupResult<Vec<u8>> {
        let mut out = Vec::with_capacity(self.header_len());
        match &self.suite {
            CryptoSuite::V1 {
                iterations,
                salt,
                iv,
            } => {
                out.extend_from_slice(MAGIC_V1);
                out.push(1);
                out.extend_from_slice(&iterations.to_be_bytes());
                push_prefixed(&mut out, salt, "salt")?;
                push_prefixed(&mut out, iv, "IV")?;
            }
            CryptoSuite::V2 {
                params,
                salt,
                nonce,
            } => {
                out.extend_from_slice(MAGIC_V2);
                out.push(2);
                out.push(KDF_ARGON2ID);
                out.extend_from_slice(&params.memory_kib.to_be_bytes());
                out.extend_from_slice(&params.time_cost.to_be_bytes());
                out.push(params.parallelism);
                push_prefixed(&mut out, salt, "salt")?;
                push_prefixed(&mut out, nonce, "nonce")?;
                out.push(CIPHER_AES256_GCM);
            }
        }
        out.extend_from_slice(&self.payload_len.to_be_bytes());
        Ok(out)
    }

    /// Parse a header from the start of `reader`, consuming exactly
    /// [`header_len`](Self::header_len) bytes
    pub fn decode<R: Read>(reader: &mut R) -> BackupResult<Self> {
        let magic: [u8; 4] = read_array(reader)?;
        let [version] = read_array::<_, 1>(reader)?;

        let suite = match &magic {
            m if m == MAGIC_V1 => {
                if version != 1 {
                    return Err(unsupported(&magic, version));
                }
                let iterations = u32::from_be_bytes(read_array(reader)?);
                if iterations > MAX_PBKDF2_ITERATIONS {
                    return Err(BackupError::Format(format!(
                        "PBKDF2 iteration count {} exceeds the limit of {}",
                        iterations, MAX_PBKDF2_ITERATIONS
                    )));
                }
                let salt = read_prefixed(reader)?;
                let iv = read_prefixed(reader)?;
                CryptoSuite::V1 {
                    iterations,
                    salt,
                    iv,
                }
            }
            m if m == MAGIC_V2 => {
                if version != 2 {
                    return Err(unsupported(&magic, version));
                }
                let [kdf] = read_array::<_, 1>(reader)?;
                if kdf != KDF_ARGON2ID {
                    return Err(BackupError::Format(format!(
                        "Unknown KDF identifier 0x{:02x}",
                        kdf
                    )));
                }
                let memory_kib = u32::from_be_bytes(read_array(reader)?);
                let time_cost = u16::from_be_bytes(read_array(reader)?);
                let [parallelism] = read_array::<_, 1>(reader)?;
                if memory_kib > MAX_ARGON2_MEMORY_KIB {
                    return Err(BackupError::Format(format!(
                        "Argon2 memory cost {} KiB exceeds the limit of {} KiB",
                        memory_kib, MAX_ARGON2_MEMORY_KIB
                    )));
                }
                if time_cost > MAX_ARGON2_TIME_COST {
                    return Err(BackupError::Format(format!(
                        "Argon2 time cost {} exceeds the limit of {}",
                        time_cost, MAX_ARGON2_TIME_COST
                    )));
                }
                let salt = read_prefixed(reader)?;
                let nonce = read_prefixed(reader)?;
                let [cipher] = read_array::<_, 1>(reader)?;
                if cipher != CIPHER_AES256_GCM {
                    return Err(BackupError::Format(format!(
                        "Unknown cipher suite identifier 0x{:02x}",
                        cipher
                    )));
                }
                CryptoSuite::V2 {
                    params: Argon2Params::new(memory_kib, time_cost, parallelism),
                    salt,
                    nonce,
                }
            }
            _ => {
                return Err(BackupError::Format(format!(
                    "Unrecognized magic {:02x?}",
                    magic
                )))
            }
        };

        let payload_len = u64::from_be_bytes(read_array(reader)?);
        Ok(Self { suite, payload_len })
    }
}

fn unsupported(magic: &[u8; 4], version: u8) -> BackupError {
    BackupError::UnsupportedVersion {
        magic: String::from_utf8_lossy(magic).into_owned(),
        version,
    }
}

fn push_prefixed(out: &mut Vec<u8>, field: &[u8], name: &str) -> BackupResult<()> {
    let len = u8::try_from(field.len())
        .map_err(|_| BackupError::Format(format!("{} longer than 255 bytes", name)))?;
    out.push(len);
    out.extend_from_slice(field);
    Ok(())
}

fn read_array<R: Read, const N: usize>(reader: &mut R) -> BackupResult<[u8; N]> {
    let mut buf = [0u8; N];
    reader.read_exact(&mut buf).map_err(truncated)?;
    Ok(buf)
}

fn read_prefixed<R: Read>(reader: &mut R) -> BackupResult<Vec<u8>> {
    let [len] = read_array::<_, 1>(reader)?;
    let mut buf = vec![0u8; usize::from(len)];
    reader.read_exact(&mut buf).map_err(truncated)?;
    Ok(buf)
}

fn truncated(err: std::io::Error) -> BackupError {
    if err.kind() == ErrorKind::UnexpectedEof {
        BackupError::Format("Truncated archive header".into())
    } else {
        BackupError::Io(format!("Failed to read archive header: {}", err))
    }
}
