//! Configuration for signing runs.
//!
//! `Settings` is read once from JSON (see `loader`) and handed to the
//! pipeline explicitly; nothing reads configuration from global state.
//!
//! ```json
//! {
//!   "strip_tool": "/usr/bin/strip",
//!   "poll_timeout_ms": 30,
//!   "signature_window": 100,
//!   "verbose": false,
//!   "log_file": null
//! }
//! ```

pub mod loader;

use crate::error::ConfigError;
use crate::kernel::module::{DEFAULT_SIGNATURE_WINDOW, SIGNATURE_MAGIC};
use crate::kernel::pipeline::ToolOptions;
use crate::system::process::RunOptions;
use std::path::PathBuf;
use std::time::Duration;

/// Persistent settings; missing fields take their defaults
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Tool used to remove an existing signature
    pub strip_tool: PathBuf,
    /// Upper bound of one multiplexer wait while running external tools
    pub poll_timeout_ms: u16,
    /// Trailing payload bytes searched for the signature marker
    pub signature_window: usize,
    pub verbose: bool,
    /// Append log lines here in addition to stderr
    pub log_file: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            strip_tool: PathBuf::from("/usr/bin/strip"),
            poll_timeout_ms: 30,
            signature_window: DEFAULT_SIGNATURE_WINDOW,
            verbose: false,
            log_file: None,
        }
    }
}

impl Settings {
    /// Pipeline options for these settings
    pub fn tool_options(&self, dry_run: bool) -> ToolOptions {
        ToolOptions {
            strip_tool: self.strip_tool.clone(),
            run: RunOptions {
                poll_timeout: Duration::from_millis(u64::from(self.poll_timeout_ms)),
                ..RunOptions::default()
            }
            .dry_run(dry_run),
            signature_window: self.signature_window,
            verbose: self.verbose,
        }
    }
}

/// Reject settings the pipeline cannot work with.
pub fn validate_settings(settings: &Settings) -> Result<(), ConfigError> {
    if settings.strip_tool.as_os_str().is_empty() {
        return Err(ConfigError::ValidationFailed(
            "strip_tool cannot be empty".to_string(),
        ));
    }
    if settings.poll_timeout_ms == 0 {
        return Err(ConfigError::ValidationFailed(
            "poll_timeout_ms must be greater than zero".to_string(),
        ));
    }
    // A window narrower than the marker can never match
    if settings.signature_window < SIGNATURE_MAGIC.len() {
        return Err(ConfigError::ValidationFailed(format!(
            "signature_window must be at least {} bytes (got {})",
            SIGNATURE_MAGIC.len(),
            settings.signature_window
        )));
    }
    Ok(())
}
