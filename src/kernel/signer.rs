//! Signer configuration and the two external tool invocations.
//!
//! A `SignerConfig` can only be built from inputs that exist on disk, so a
//! signer that would fail for lack of a key or certificate never reaches the
//! point of signing anything.
//!
//! The default layout mirrors a kernel build tree with a `certs-local`
//! directory installed next to `scripts/`:
//!
//! ```text
//! <build>/scripts/sign-file
//! <build>/certs-local/current/signing_key.pem
//! <build>/certs-local/current/signing_crt.crt
//! <build>/certs-local/current/khash
//! ```

use std::ffi::OsStr;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use crate::error::{ModuleError, SignerError};
use crate::kernel::kconfig;
use crate::system::process::{run_prog, RunOptions};

/// Hash algorithm used when neither `khash` nor the kernel config names one.
pub const DEFAULT_HASH: &str = "sha512";

/// Immutable description of how modules get signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignerConfig {
    signer: PathBuf,
    key: PathBuf,
    cert: PathBuf,
    hash: String,
}

/// Signer inputs before validation; any field may still be missing.
#[derive(Debug, Clone, Default)]
pub struct SignerPaths {
    pub signer: Option<PathBuf>,
    pub key: Option<PathBuf>,
    pub cert: Option<PathBuf>,
    pub hash: Option<String>,
}

impl SignerPaths {
    /// Resolve signer, key, cert and hash from a kernel build directory.
    pub fn from_build_dir(build_dir: &Path) -> Self {
        let current = build_dir.join("certs-local/current");
        let hash = read_khash(&current.join("khash")).or_else(|| {
            kconfig::read_sig_types(&build_dir.join(".config"))
                .ok()
                .and_then(|t| t.hash)
        });

        SignerPaths {
            signer: Some(build_dir.join("scripts/sign-file")),
            key: Some(current.join("signing_key.pem")),
            cert: Some(current.join("signing_crt.crt")),
            hash: Some(hash.unwrap_or_else(|| DEFAULT_HASH.to_string())),
        }
    }

    /// Fields set in `other` replace ours.
    pub fn overridden_by(self, other: SignerPaths) -> Self {
        SignerPaths {
            signer: other.signer.or(self.signer),
            key: other.key.or(self.key),
            cert: other.cert.or(self.cert),
            hash: other.hash.or(self.hash),
        }
    }

    pub fn build(self) -> Result<SignerConfig, SignerError> {
        let missing = |what: &str| SignerError::Uninitialized(format!("No {} configured", what));
        SignerConfig::new(
            self.signer.ok_or_else(|| missing("signer"))?,
            self.key.ok_or_else(|| missing("key file"))?,
            self.cert.ok_or_else(|| missing("crt file"))?,
            self.hash.unwrap_or_else(|| DEFAULT_HASH.to_string()),
        )
    }
}

fn read_khash(path: &Path) -> Option<String> {
    let text = fs::read_to_string(path).ok()?;
    let hash = text.trim();
    if hash.is_empty() {
        None
    } else {
        Some(hash.to_string())
    }
}

impl SignerConfig {
    /// Validate and freeze a signer configuration.
    ///
    /// # Returns
    /// `Err(SignerError::Uninitialized)` if the signer is not an executable
    /// file, the key or certificate is not a readable file, or the hash name
    /// is empty.
    pub fn new(
        signer: impl Into<PathBuf>,
        key: impl Into<PathBuf>,
        cert: impl Into<PathBuf>,
        hash: impl Into<String>,
    ) -> Result<Self, SignerError> {
        let signer = signer.into();
        let key = key.into();
        let cert = cert.into();
        let hash = hash.into().trim().to_string();

        check_executable(&signer)?;
        check_readable(&key, "key")?;
        check_readable(&cert, "crt")?;
        if hash.is_empty() {
            return Err(SignerError::Uninitialized("Empty hash algorithm".to_string()));
        }

        Ok(SignerConfig {
            signer,
            key,
            cert,
            hash,
        })
    }

    pub fn signer(&self) -> &Path {
        &self.signer
    }

    pub fn key(&self) -> &Path {
        &self.key
    }

    pub fn cert(&self) -> &Path {
        &self.cert
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Sign `file` in place: `<signer> <hash> <key> <cert> <file>`.
    pub fn sign_file(&self, file: &Path, opts: &RunOptions) -> Result<(), ModuleError> {
        let argv = [
            self.signer.as_os_str(),
            OsStr::new(&self.hash),
            self.key.as_os_str(),
            self.cert.as_os_str(),
            file.as_os_str(),
        ];
        let out = run_prog(&argv, opts)?;
        if !out.success() {
            return Err(ModuleError::SignFailed {
                exit_code: out.exit_code,
                stderr: out.stderr,
            });
        }
        Ok(())
    }
}

/// Remove an existing signature (and debug info) from `file` in place.
pub fn strip_sig(strip_tool: &Path, file: &Path, opts: &RunOptions) -> Result<(), ModuleError> {
    let argv = [strip_tool.as_os_str(), OsStr::new("--strip-debug"), file.as_os_str()];
    let out = run_prog(&argv, opts)?;
    if !out.success() {
        return Err(ModuleError::StripFailed {
            exit_code: out.exit_code,
            stderr: out.stderr,
        });
    }
    Ok(())
}

fn check_executable(path: &Path) -> Result<(), SignerError> {
    let meta = fs::metadata(path).map_err(|_| {
        SignerError::Uninitialized(format!("Missing signer : {}", path.display()))
    })?;
    if !meta.is_file() || meta.permissions().mode() & 0o111 == 0 {
        return Err(SignerError::Uninitialized(format!(
            "Signer is not executable : {}",
            path.display()
        )));
    }
    Ok(())
}

fn check_readable(path: &Path, what: &str) -> Result<(), SignerError> {
    match fs::File::open(path) {
        Ok(f) if f.metadata().map(|m| m.is_file()).unwrap_or(false) => Ok(()),
        _ => Err(SignerError::Uninitialized(format!(
            "Missing {} file : {}",
            what,
            path.display()
        ))),
    }
}
