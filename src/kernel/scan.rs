//! Module discovery in a directory.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ModuleError;
use crate::models::ContainerFormat;

/// List the modules in `dir` (not recursive).
///
/// Only regular files whose names end in one of the module suffixes
/// (`.ko`, `.ko.zst`, `.ko.xz`, `.ko.gz`) are returned, as absolute paths
/// sorted by file name.
pub fn modules_from_dir(dir: &Path) -> Result<Vec<PathBuf>, ModuleError> {
    if !dir.is_dir() {
        return Err(ModuleError::BadDirectory(dir.to_path_buf()));
    }

    let mod_dir = dir.canonicalize().map_err(|source| ModuleError::Read {
        path: dir.to_path_buf(),
        source,
    })?;
    let entries = fs::read_dir(&mod_dir).map_err(|source| ModuleError::Read {
        path: mod_dir.clone(),
        source,
    })?;

    let mut modules = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| ModuleError::Read {
            path: mod_dir.clone(),
            source,
        })?;
        let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
        if !is_file {
            continue;
        }

        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            log::warn!("[Scan] Skipping non UTF-8 file name in {}", mod_dir.display());
            continue;
        };
        if ContainerFormat::MODULE_SUFFIXES
            .iter()
            .any(|suffix| name.ends_with(suffix))
        {
            modules.push(mod_dir.join(name));
        }
    }

    modules.sort();
    log::debug!("[Scan] Found {} modules in {}", modules.len(), mod_dir.display());
    Ok(modules)
}
