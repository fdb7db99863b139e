//! Reading and writing `.tbk` archive files

use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::Path;

use tracing::debug;

use super::header::ArchiveHeader;
use crate::crypto::{self, Argon2Params, Ciphertext, Password, Sealed};
use crate::crypto::encryption::MAC_LEN;
use crate::error::{BackupError, BackupResult};

/// Write an already-encrypted payload with its header; returns bytes written
pub fn write_sealed(path: &Path, sealed: &Sealed) -> BackupResult<u64> {
    let header = ArchiveHeader::new(sealed.suite.clone(), sealed.ciphertext.body.len() as u64);
    let header_bytes = header.encode()?;

    let file = File::create(path).map_err(|e| {
        BackupError::Io(format!("Failed to create archive {}: {}", path.display(), e))
    })?;
    let mut writer = BufWriter::new(file);

    let write = |w: &mut BufWriter<File>| -> std::io::Result<()> {
        w.write_all(&header_bytes)?;
        w.write_all(&sealed.ciphertext.body)?;
        if let Some(mac) = &sealed.ciphertext.mac {
            w.write_all(mac)?;
        }
        w.flush()?;
        w.get_ref().sync_all()
    };
    write(&mut writer)
        .map_err(|e| BackupError::Io(format!("Failed to write archive {}: {}", path.display(), e)))?;

    let total = header_bytes.len() as u64
        + sealed.ciphertext.body.len() as u64
        + sealed.ciphertext.mac.map_or(0, |m| m.len() as u64);
    debug!(path = %path.display(), version = header.version(), bytes = total, "Archive written");
    Ok(total)
}

/// Encrypt a compressed payload under the current format and write it
pub fn write_archive(
    path: &Path,
    compressed_payload: &[u8],
    password: &Password,
    params: &Argon2Params,
) -> BackupResult<u64> {
    let sealed = crypto::encrypt_v2(password.as_bytes(), compressed_payload, params)?;
    write_sealed(path, &sealed)
}

/// Decode only the header of an archive file
pub fn read_header(path: &Path) -> BackupResult<ArchiveHeader> {
    let file = open(path)?;
    ArchiveHeader::decode(&mut BufReader::new(file))
}

/// Read the ciphertext that follows `header` and decrypt it
///
/// Returns the compressed payload bytes.
pub fn read_and_decrypt(
    path: &Path,
    password: &Password,
    header: &ArchiveHeader,
) -> BackupResult<Vec<u8>> {
    let ciphertext = read_ciphertext(path, header)?;
    crypto::decrypt(&header.suite, password.as_bytes(), &ciphertext)
}

/// Convenience: read the header, then decrypt
pub fn open_archive(path: &Path, password: &Password) -> BackupResult<Vec<u8>> {
    let header = read_header(path)?;
    read_and_decrypt(path, password, &header)
}

fn read_ciphertext(path: &Path, header: &ArchiveHeader) -> BackupResult<Ciphertext> {
    let mut file = open(path)?;
    file.seek(SeekFrom::Start(header.header_len() as u64))
        .map_err(|e| BackupError::Io(format!("Failed to seek archive: {}", e)))?;

    let payload_len = usize::try_from(header.payload_len)
        .map_err(|_| BackupError::Format("Payload length exceeds address space".into()))?;

    let available = file
        .metadata()
        .map_err(|e| BackupError::Io(format!("Failed to stat archive: {}", e)))?
        .len()
        .saturating_sub(header.header_len() as u64);
    if available < header.payload_len {
        return Err(BackupError::Format(format!(
            "Truncated payload: header declares {} bytes, {} present",
            header.payload_len, available
        )));
    }

    let mut reader = BufReader::new(file);
    let mut body = vec![0u8; payload_len];
    reader.read_exact(&mut body).map_err(truncated_payload)?;

    let mac = if header.version() == 1 {
        let mut tag = [0u8; MAC_LEN];
        reader.read_exact(&mut tag).map_err(truncated_payload)?;
        Some(tag)
    } else {
        None
    };

    Ok(Ciphertext { body, mac })
}

fn open(path: &Path) -> BackupResult<File> {
    File::open(path)
        .map_err(|e| BackupError::Io(format!("Failed to open archive {}: {}", path.display(), e)))
}

fn truncated_payload(err: std::io::Error) -> BackupError {
    if err.kind() == ErrorKind::UnexpectedEof {
        BackupError::Format("Truncated archive payload".into())
    } else {
        BackupError::Io(format!("Failed to read archive payload: {}", err))
    }
}
