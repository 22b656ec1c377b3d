//! Kernel Module Signing
//!
//! Handles everything between a module file on disk and its signed replacement:
//! - Container formats (raw, zstd, xz, gzip) and their codecs
//! - Module validation, loading and signature detection
//! - Signer resolution from a kernel build tree
//! - The transform pipeline (strip, sign, recompress, atomic replace)
//! - Directory scanning for modules

pub mod compression;
pub mod kconfig;
pub mod module;
pub mod pipeline;
pub mod scan;
pub mod signer;
