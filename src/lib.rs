//! Kernel module signer
//!
//! Signs out-of-tree kernel modules with a local key: each module is loaded,
//! decompressed, stripped of any previous signature, signed by the kernel's
//! `sign-file` tool, recompressed and atomically written back.
//!
//! The system is organized into functional modules:
//! - **error**: Unified error type hierarchy
//! - **models**: Core data structures and types
//! - **system**: External program execution and logging macros
//! - **config**: Settings loading and validation
//! - **log_collector**: `log` backend writing to stderr and a log file
//! - **kernel**: Module formats, signer and the signing pipeline

// Core foundational modules
pub mod error;
pub mod models;

// External program execution
pub mod system;

// Settings management
pub mod config;

// Decoupled logging
pub mod log_collector;

// Module signing
pub mod kernel;

// Re-export the log crate for macro usage
pub use log;

// Re-export log collector for use throughout the system
pub use log_collector::{LogCollector, LogLine};

// ============================================================================
// PUBLIC RE-EXPORTS FOR CONVENIENCE
// ============================================================================

pub use error::{ConfigError, ExecError, ModuleError, Result, SignerError};

pub use models::{ContainerFormat, LoadedModule, ModuleRecord, ModuleStage};

pub use system::process::{run_prog, ProcessOutput, RunOptions};

pub use config::Settings;

pub use kernel::pipeline::{ModulePipeline, SignReport, ToolOptions};
pub use kernel::scan::modules_from_dir;
pub use kernel::signer::{SignerConfig, SignerPaths};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_constant() {
        assert_eq!(VERSION, "0.1.0");
    }

    #[test]
    fn test_error_reexport() {
        let _: Result<i32> = Ok(42);
    }

    #[test]
    fn test_models_reexport() {
        assert_eq!(ContainerFormat::Zstd, ContainerFormat::Zstd);
        assert!(ContainerFormat::Gzip.is_compressed());
    }
}
