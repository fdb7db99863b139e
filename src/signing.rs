//! Detached archive signatures
//!
//! The private key is kept as a TBK2 archive whose payload is the 32-byte
//! Ed25519 seed, so it is protected by the same password-based encryption as
//! the backups. The public key is stored hex-encoded next to it.

use std::path::{Path, PathBuf};

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use tracing::info;
use zeroize::Zeroizing;

use crate::archive::codec::{open_archive, write_archive};
use crate::config::TermBackupPaths;
use crate::crypto::{Argon2Params, Password};
use crate::error::{BackupError, BackupResult};

/// Produces and checks signatures over archive bytes
pub trait ArchiveSigner: Send + Sync {
    fn sign(&self, data: &[u8], password: &Password) -> BackupResult<Vec<u8>>;

    /// `Ok(false)` for a well-formed but wrong signature
    fn verify(&self, data: &[u8], signature: &[u8]) -> BackupResult<bool>;
}

/// Ed25519 keypair stored on disk
#[derive(Debug, Clone)]
pub struct Ed25519Signer {
    key_path: PathBuf,
    pub_path: PathBuf,
}

impl Ed25519Signer {
    pub fn new(key_path: impl Into<PathBuf>, pub_path: impl Into<PathBuf>) -> Self {
        Self {
            key_path: key_path.into(),
            pub_path: pub_path.into(),
        }
    }

    pub fn at(paths: &TermBackupPaths) -> Self {
        Self::new(paths.signing_key(), paths.signing_pub())
    }

    /// The signer at the default location, if a keypair exists there
    pub fn load(paths: &TermBackupPaths) -> Option<Self> {
        let signer = Self::at(paths);
        signer.exists().then_some(signer)
    }

    pub fn exists(&self) -> bool {
        self.key_path.exists() && self.pub_path.exists()
    }

    /// Generate a keypair and write it, encrypting the seed with `password`
    pub fn generate(&self, password: &Password, params: &Argon2Params) -> BackupResult<VerifyingKey> {
        let signing_key = SigningKey::generate(&mut aes_gcm::aead::OsRng);
        let seed = Zeroizing::new(signing_key.to_bytes());

        let dir = match self.key_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;

        // The seed only reaches its final name once the file is owner-only
        let temp = tempfile::Builder::new()
            .prefix(".signing")
            .suffix(".tmp")
            .tempfile_in(dir)?;
        restrict_permissions(temp.path())?;
        write_archive(temp.path(), seed.as_slice(), password, params)?;
        temp.as_file().sync_all()?;
        temp.persist(&self.key_path).map_err(|e| e.error)?;

        let public = signing_key.verifying_key();
        std::fs::write(&self.pub_path, hex::encode(public.to_bytes()))?;

        info!(path = %self.pub_path.display(), "Signing keypair generated");
        Ok(public)
    }

    fn signing_key(&self, password: &Password) -> BackupResult<SigningKey> {
        let seed = Zeroizing::new(open_archive(&self.key_path, password)?);
        let bytes: [u8; 32] = seed
            .as_slice()
            .try_into()
            .map_err(|_| BackupError::Crypto("Signing key has the wrong length".into()))?;
        Ok(SigningKey::from_bytes(&bytes))
    }

    pub fn verifying_key(&self) -> BackupResult<VerifyingKey> {
        let raw = std::fs::read_to_string(&self.pub_path)?;
        let bytes = hex::decode(raw.trim())
            .map_err(|e| BackupError::Crypto(format!("Invalid public key encoding: {}", e)))?;
        let bytes: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| BackupError::Crypto("Public key has the wrong length".into()))?;
        VerifyingKey::from_bytes(&bytes)
            .map_err(|e| BackupError::Crypto(format!("Invalid public key: {}", e)))
    }
}

impl ArchiveSigner for Ed25519Signer {
    fn sign(&self, data: &[u8], password: &Password) -> BackupResult<Vec<u8>> {
        let key = self.signing_key(password)?;
        Ok(key.sign(data).to_bytes().to_vec())
    }

    fn verify(&self, data: &[u8], signature: &[u8]) -> BackupResult<bool> {
        let public = self.verifying_key()?;
        let Ok(signature) = Signature::from_slice(signature) else {
            return Ok(false);
        };
        Ok(public.verify(data, &signature).is_ok())
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> BackupResult<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> BackupResult<()> {
    Ok(())
}
