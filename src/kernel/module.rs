//! Kernel module validation, loading and signature detection.
//!
//! Signed modules carry `~Module signature appended~\n` as the very last
//! bytes of the image, so only a bounded tail of the payload is searched.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ModuleError;
use crate::models::{ContainerFormat, LoadedModule, ModuleRecord};

/// Marker the kernel's sign-file appends after the signature block.
pub const SIGNATURE_MAGIC: &[u8] = b"~Module signature appended~\n";

/// Default number of trailing payload bytes searched for the marker.
pub const DEFAULT_SIGNATURE_WINDOW: usize = 100;

/// Accept a candidate module path.
///
/// The path must exist, be a regular file, and carry one of the recognized
/// container extensions. Nothing is read from the file here.
pub fn validate(path: &Path) -> Result<ModuleRecord, ModuleError> {
    let metadata = match fs::metadata(path) {
        Ok(m) => m,
        Err(_) => return Err(ModuleError::NotFound(path.to_path_buf())),
    };
    if !metadata.is_file() {
        return Err(ModuleError::NotAFile(path.to_path_buf()));
    }

    let container_format = ContainerFormat::from_path(path)
        .ok_or_else(|| ModuleError::UnknownExtension(path.to_path_buf()))?;

    Ok(ModuleRecord {
        path: absolute(path)?,
        container_format,
    })
}

fn absolute(path: &Path) -> Result<PathBuf, ModuleError> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .map_err(|source| ModuleError::Read {
            path: path.to_path_buf(),
            source,
        })
}

/// Read and decompress a validated module, then check it for a signature.
pub fn load(record: ModuleRecord, signature_window: usize) -> Result<LoadedModule, ModuleError> {
    let raw = fs::read(&record.path).map_err(|source| ModuleError::Read {
        path: record.path.clone(),
        source,
    })?;
    let payload = record.container_format.decompress(&raw)?;
    let is_signed = is_signed(&payload, signature_window);

    log::debug!(
        "[Module] Loaded {} ({}, {} bytes, signed={})",
        record.path.display(),
        record.container_format,
        payload.len(),
        is_signed
    );

    Ok(LoadedModule {
        record,
        payload,
        is_signed,
    })
}

/// True if the signature marker lies entirely within the last `window` bytes.
///
/// Payloads shorter than the window are searched in full.
pub fn is_signed(payload: &[u8], window: usize) -> bool {
    let start = payload.len().saturating_sub(window);
    payload[start..]
        .windows(SIGNATURE_MAGIC.len())
        .any(|w| w == SIGNATURE_MAGIC)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload_with_marker_at(len: usize, marker_end: usize) -> Vec<u8> {
        let mut data = vec![0xAAu8; len];
        let start = marker_end - SIGNATURE_MAGIC.len();
        data[start..marker_end].copy_from_slice(SIGNATURE_MAGIC);
        data
    }

    #[test]
    fn test_marker_at_exact_end_is_signed() {
        let data = payload_with_marker_at(4096, 4096);
        assert!(is_signed(&data, DEFAULT_SIGNATURE_WINDOW));
    }

    #[test]
    fn test_no_marker_is_unsigned() {
        let data = vec![0u8; 4096];
        assert!(!is_signed(&data, DEFAULT_SIGNATURE_WINDOW));
        assert!(!is_signed(&[], DEFAULT_SIGNATURE_WINDOW));
    }

    #[test]
    fn test_marker_outside_window_is_ignored() {
        // Marker ends 500 bytes before the end: far outside a 100 byte tail
        let data = payload_with_marker_at(4096, 4096 - 500);
        assert!(!is_signed(&data, DEFAULT_SIGNATURE_WINDOW));
    }

    #[test]
    fn test_window_boundary() {
        let window = DEFAULT_SIGNATURE_WINDOW;
        let len = 1000;

        // Marker starts exactly at the first byte of the window
        let inside = payload_with_marker_at(len, len - window + SIGNATURE_MAGIC.len());
        assert!(is_signed(&inside, window));

        // One byte earlier and it straddles the window edge
        let straddling = payload_with_marker_at(len, len - window + SIGNATURE_MAGIC.len() - 1);
        assert!(!is_signed(&straddling, window));
    }

    #[test]
    fn test_short_payload_searched_in_full() {
        let mut data = SIGNATURE_MAGIC.to_vec();
        data.extend_from_slice(&[0u8; 10]);
        assert!(is_signed(&data, DEFAULT_SIGNATURE_WINDOW));
    }

    #[test]
    fn test_validate_rejects_unknown_extension() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("notes.txt");
        fs::write(&path, b"hello").unwrap();
        assert!(matches!(validate(&path), Err(ModuleError::UnknownExtension(_))));
    }

    #[test]
    fn test_validate_rejects_missing_and_directories() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(matches!(
            validate(&dir.path().join("gone.ko")),
            Err(ModuleError::NotFound(_))
        ));
        let sub = dir.path().join("sub.ko");
        fs::create_dir(&sub).unwrap();
        assert!(matches!(validate(&sub), Err(ModuleError::NotAFile(_))));
    }

    #[test]
    fn test_load_decompresses_and_detects() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("m.ko.xz");
        let image = payload_with_marker_at(512, 512);
        fs::write(&path, ContainerFormat::Xz.compress(&image).unwrap()).unwrap();

        let record = validate(&path).unwrap();
        assert_eq!(record.container_format, ContainerFormat::Xz);
        let loaded = load(record, DEFAULT_SIGNATURE_WINDOW).unwrap();
        assert_eq!(loaded.payload, image);
        assert!(loaded.is_signed);
    }

    #[test]
    fn test_load_corrupt_container_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("m.ko.zst");
        fs::write(&path, b"not zstd").unwrap();
        let record = validate(&path).unwrap();
        assert!(matches!(
            load(record, DEFAULT_SIGNATURE_WINDOW),
            Err(ModuleError::Decompress { .. })
        ));
    }
}
