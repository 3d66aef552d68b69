//! Content access helpers: byte comparison, checksums and atomic writes.

use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::errors::{MergeError, WcError};
use crate::wc::NodeKind;

/// Kind of node on disk at `path`. Symlinks are not followed.
pub fn node_kind(path: &Path) -> NodeKind {
    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_symlink() => NodeKind::Symlink,
        Ok(meta) if meta.is_dir() => NodeKind::Dir,
        Ok(_) => NodeKind::File,
        Err(_) => NodeKind::None,
    }
}

/// Byte-for-byte comparison of two files.
pub fn files_equal(a: &Path, b: &Path) -> Result<bool, WcError> {
    let meta_a = std::fs::metadata(a).map_err(|e| WcError::io(a, e))?;
    let meta_b = std::fs::metadata(b).map_err(|e| WcError::io(b, e))?;
    if meta_a.len() != meta_b.len() {
        return Ok(false);
    }

    let mut reader_a = BufReader::new(File::open(a).map_err(|e| WcError::io(a, e))?);
    let mut reader_b = BufReader::new(File::open(b).map_err(|e| WcError::io(b, e))?);
    let mut buf_a = [0u8; 8192];
    let mut buf_b = [0u8; 8192];
    loop {
        let n = reader_a.read(&mut buf_a).map_err(|e| WcError::io(a, e))?;
        if n == 0 {
            return Ok(true);
        }
        reader_b
            .read_exact(&mut buf_b[..n])
            .map_err(|e| WcError::io(b, e))?;
        if buf_a[..n] != buf_b[..n] {
            return Ok(false);
        }
    }
}

/// Hex-encoded SHA-256 of a file's contents.
pub fn sha256_file(path: &Path) -> Result<String, WcError> {
    hash_file(path).map_err(|e| WcError::io(path, e))
}

pub fn sha256_bytes(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn hash_file(path: &Path) -> std::io::Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Fail with [`MergeError::ChecksumMismatch`] unless `path` hashes to `expected`.
pub fn verify_checksum(path: &Path, expected: &str) -> Result<(), MergeError> {
    let actual = hash_file(path).map_err(|e| MergeError::io(path, e))?;
    if !actual.eq_ignore_ascii_case(expected) {
        return Err(MergeError::ChecksumMismatch {
            path: path.to_path_buf(),
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(())
}

/// Write `data` to a scratch file beside `path` and rename it into place.
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<(), WcError> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut scratch = tempfile::NamedTempFile::new_in(dir).map_err(|e| WcError::io(dir, e))?;
    scratch.write_all(data).map_err(|e| WcError::io(path, e))?;
    scratch.flush().map_err(|e| WcError::io(path, e))?;
    scratch
        .persist(path)
        .map_err(|e| WcError::io(path, e.error))?;
    Ok(())
}

pub fn read_file(path: &Path) -> Result<Vec<u8>, WcError> {
    std::fs::read(path).map_err(|e| WcError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_files_equal() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        let c = dir.path().join("c");
        std::fs::write(&a, b"same bytes").unwrap();
        std::fs::write(&b, b"same bytes").unwrap();
        std::fs::write(&c, b"same byteZ").unwrap();
        assert!(files_equal(&a, &b).unwrap());
        assert!(!files_equal(&a, &c).unwrap());
        assert!(files_equal(&a, &dir.path().join("missing")).is_err());
    }

    #[test]
    fn test_checksum_and_verify() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        std::fs::write(&path, b"abc").unwrap();
        let sum = sha256_file(&path).unwrap();
        assert_eq!(
            sum,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(sum, sha256_bytes(b"abc"));
        assert!(verify_checksum(&path, &sum.to_uppercase()).is_ok());

        let err = verify_checksum(&path, "00").unwrap_err();
        assert!(matches!(err, MergeError::ChecksumMismatch { .. }));
    }

    #[test]
    fn test_write_atomic_and_node_kind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        assert_eq!(node_kind(&path), NodeKind::None);
        write_atomic(&path, b"one").unwrap();
        write_atomic(&path, b"two").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"two");
        assert_eq!(node_kind(&path), NodeKind::File);
        assert_eq!(node_kind(dir.path()), NodeKind::Dir);
    }
}
