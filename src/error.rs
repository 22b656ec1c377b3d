//! Unified error type hierarchy for the module signer
//!
//! Provides structured error handling with ExecError, SignerError, ModuleError
//! and ConfigError.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::models::ContainerFormat;

/// External program execution errors.
///
/// These mean the tool could not run at all (or its pipes broke while we
/// talked to it). A tool that ran and exited nonzero is NOT an `ExecError`;
/// that is reported through `ProcessOutput::exit_code`.
#[derive(Error, Debug)]
pub enum ExecError {
    #[error("Failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("I/O error while running '{program}': {source}")]
    Io {
        program: String,
        #[source]
        source: io::Error,
    },
}

/// Signer configuration errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignerError {
    /// Signer, key or certificate missing - signer refuses to sign
    #[error("Uninitialized signer: {0}")]
    Uninitialized(String),

    #[error("Kernel config error: {0}")]
    KernelConfig(String),
}

/// Per-module processing errors.
#[derive(Error, Debug)]
pub enum ModuleError {
    #[error("Bad module file: {0}")]
    NotFound(PathBuf),

    #[error("Module path is not a regular file: {0}")]
    NotAFile(PathBuf),

    #[error("Unknown extension: {0}")]
    UnknownExtension(PathBuf),

    #[error("Module directory bad: {0}")]
    BadDirectory(PathBuf),

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to decompress {format} module: {source}")]
    Decompress {
        format: ContainerFormat,
        #[source]
        source: io::Error,
    },

    #[error("Failed to compress {format} module: {source}")]
    Compress {
        format: ContainerFormat,
        #[source]
        source: io::Error,
    },

    #[error("Failed to create temp mod file in {dir}: {source}")]
    Stage {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to strip temp file (exit {exit_code})")]
    StripFailed { exit_code: i32, stderr: String },

    #[error("Signing failed (exit {exit_code})")]
    SignFailed { exit_code: i32, stderr: String },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error("Failed to replace {path}: {source}")]
    Commit {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ModuleError {
    /// Captured stderr of a strip or sign tool that rejected the module.
    pub fn tool_stderr(&self) -> Option<&str> {
        match self {
            ModuleError::StripFailed { stderr, .. } | ModuleError::SignFailed { stderr, .. } => {
                Some(stderr.as_str())
            }
            _ => None,
        }
    }

    /// Path-level rejection: the module was skipped before any I/O on it.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ModuleError::NotFound(_)
                | ModuleError::NotAFile(_)
                | ModuleError::UnknownExtension(_)
                | ModuleError::BadDirectory(_)
        )
    }

    /// The external tool could not be started (as opposed to rejecting the input).
    pub fn is_exec_failure(&self) -> bool {
        matches!(self, ModuleError::Exec(ExecError::Spawn { .. }))
    }
}

/// Configuration file parsing and validation errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Invalid JSON in config: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    #[error("IO error during config operations: {0}")]
    IoError(#[from] io::Error),
}

/// Top-level result type for operations that may fail.
/// Use this as the return type for the binary entry point.
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;
