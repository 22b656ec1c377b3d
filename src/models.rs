//! Core data structures for module signing.
//!
//! A module moves through the pipeline as a sequence of immutable records:
//! `ModuleRecord` (validated path + container format) becomes a
//! `LoadedModule` (decompressed payload + signature check) once read.

use std::fmt;
use std::path::{Path, PathBuf};

/// Compression wrapper around a module payload, inferred from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerFormat {
    /// Raw `.ko`
    None,
    /// `.ko.zst` / `.zst`
    Zstd,
    /// `.ko.xz` / `.xz`
    Xz,
    /// `.ko.gz` / `.gz`
    Gzip,
}

impl ContainerFormat {
    /// Suffixes recognized when scanning a directory for modules.
    pub const MODULE_SUFFIXES: [&'static str; 4] = [".ko", ".ko.zst", ".ko.xz", ".ko.gz"];

    /// Map a final file extension (without the dot) to its container format.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "ko" => Some(ContainerFormat::None),
            "zst" => Some(ContainerFormat::Zstd),
            "xz" => Some(ContainerFormat::Xz),
            "gz" => Some(ContainerFormat::Gzip),
            _ => None,
        }
    }

    /// Container format of `path`, or `None` for unrecognized extensions.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    pub fn is_compressed(&self) -> bool {
        *self != ContainerFormat::None
    }
}

impl fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContainerFormat::None => "raw",
            ContainerFormat::Zstd => "zstd",
            ContainerFormat::Xz => "xz",
            ContainerFormat::Gzip => "gzip",
        };
        f.write_str(name)
    }
}

/// A module path that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRecord {
    /// Absolute path of the original file
    pub path: PathBuf,
    pub container_format: ContainerFormat,
}

impl ModuleRecord {
    /// Directory holding the module; temp files are staged here.
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("/"))
    }
}

/// A module read into memory and decompressed.
#[derive(Debug, Clone)]
pub struct LoadedModule {
    pub record: ModuleRecord,
    /// Decompressed module image
    pub payload: Vec<u8>,
    /// A signature marker was found in the payload's tail window
    pub is_signed: bool,
}

/// Where a single module ended up in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleStage {
    Unvalidated,
    Validated,
    Loaded,
    Staged,
    Stripped,
    NotSigned,
    Signed,
    Recompressed,
    Uncompressed,
    Committed,
    Failed,
}

impl ModuleStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ModuleStage::Committed | ModuleStage::Failed)
    }
}
