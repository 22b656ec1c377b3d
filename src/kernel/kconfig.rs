//! Kernel config reading: module signing key type and hash algorithm.

use std::fs;
use std::path::Path;

use regex::Regex;

use crate::error::SignerError;

/// Module signing parameters found in a kernel `.config`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SigTypes {
    /// `rsa` or `ec`
    pub key_type: Option<String>,
    /// e.g. `sha512`
    pub hash: Option<String>,
}

/// Extract `CONFIG_MODULE_SIG_KEY_TYPE_*` and `CONFIG_MODULE_SIG_HASH` from config text.
pub fn parse_sig_types(text: &str) -> Result<SigTypes, SignerError> {
    let key_re = Regex::new(r"^CONFIG_MODULE_SIG_KEY_TYPE_([A-Z0-9_]+)=y\s*$")
        .map_err(|e| SignerError::KernelConfig(e.to_string()))?;
    let hash_re = Regex::new(r#"^CONFIG_MODULE_SIG_HASH="?([^"\s]*)"?\s*$"#)
        .map_err(|e| SignerError::KernelConfig(e.to_string()))?;

    let mut types = SigTypes::default();

    for line in text.lines() {
        if let Some(caps) = key_re.captures(line) {
            let key_type = match &caps[1] {
                "RSA" => "rsa",
                "ECDSA" => "ec",
                other => {
                    return Err(SignerError::KernelConfig(format!(
                        "Unknown module signing key type: {}",
                        other
                    )))
                }
            };
            types.key_type.get_or_insert_with(|| key_type.to_string());
        } else if let Some(caps) = hash_re.captures(line) {
            if caps[1].is_empty() {
                return Err(SignerError::KernelConfig(format!("Empty hash in: {}", line)));
            }
            types.hash.get_or_insert_with(|| caps[1].to_string());
        }

        if types.key_type.is_some() && types.hash.is_some() {
            break;
        }
    }

    Ok(types)
}

/// Read a kernel config file and extract its module signing types.
pub fn read_sig_types(path: &Path) -> Result<SigTypes, SignerError> {
    let text = fs::read_to_string(path)
        .map_err(|e| SignerError::KernelConfig(format!("Failed to open {}: {}", path.display(), e)))?;
    parse_sig_types(&text)
}
