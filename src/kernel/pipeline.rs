//! Module transform pipeline: load, strip, sign, recompress, replace.
//!
//! Every module is staged to a temp file in its own directory and the
//! original is touched exactly once, by the final same-directory rename.
//! Any failure before that drops the temp file (removing it) and leaves the
//! original byte-for-byte as it was.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::ModuleError;
use crate::kernel::module::{self, DEFAULT_SIGNATURE_WINDOW};
use crate::kernel::signer::{strip_sig, SignerConfig};
use crate::{log_info, log_parsed};
use crate::models::{LoadedModule, ModuleStage};
use crate::system::process::RunOptions;

/// Temp file prefix; staged modules are hidden files next to the original.
const STAGE_PREFIX: &str = ".kmod-sign-";

/// Knobs for the external tools and signature detection.
#[derive(Debug, Clone)]
pub struct ToolOptions {
    /// Tool invoked as `<strip_tool> --strip-debug <file>`
    pub strip_tool: PathBuf,
    /// Passed to every external tool invocation
    pub run: RunOptions,
    /// Trailing bytes searched for the signature marker
    pub signature_window: usize,
    /// Log captured tool stderr on failure
    pub verbose: bool,
}

impl Default for ToolOptions {
    fn default() -> Self {
        ToolOptions {
            strip_tool: PathBuf::from("/usr/bin/strip"),
            run: RunOptions::default(),
            signature_window: DEFAULT_SIGNATURE_WINDOW,
            verbose: false,
        }
    }
}

/// Outcome of a batch run.
#[derive(Debug, Default)]
pub struct SignReport {
    pub signed: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, ModuleError)>,
    /// Final pipeline stage of every module, in processing order
    pub stages: Vec<(PathBuf, ModuleStage)>,
}

impl SignReport {
    /// True when every module was signed.
    pub fn success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Modules rejected at validation, before any I/O.
    pub fn skipped(&self) -> impl Iterator<Item = &Path> {
        self.failed
            .iter()
            .filter(|(_, e)| e.is_validation())
            .map(|(p, _)| p.as_path())
    }

    /// Final stage reached by `path`, if it was part of the run.
    pub fn stage_of(&self, path: &Path) -> Option<ModuleStage> {
        self.stages
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, stage)| *stage)
    }
}

/// Signs modules with one signer configuration.
pub struct ModulePipeline<'a> {
    signer: &'a SignerConfig,
    opts: ToolOptions,
}

impl<'a> ModulePipeline<'a> {
    pub fn new(signer: &'a SignerConfig, opts: ToolOptions) -> Self {
        ModulePipeline { signer, opts }
    }

    /// Sign each module in order; one failure does not stop the rest.
    pub fn sign_all<P: AsRef<Path>>(&self, paths: &[P]) -> SignReport {
        let mut report = SignReport::default();
        for path in paths {
            let path = path.as_ref();
            let (stage, result) = self.run_module(path);
            if !stage.is_terminal() {
                log::debug!("[Sign] {} stopped at {:?} (dry run)", path.display(), stage);
            }
            report.stages.push((path.to_path_buf(), stage));
            match result {
                Ok(signed) => report.signed.push(signed),
                Err(e) => report.failed.push((path.to_path_buf(), e)),
            }
        }
        log_info!(
            "[Sign] {} signed, {} failed",
            report.signed.len(),
            report.failed.len()
        );
        report
    }

    /// Sign one module file in place.
    ///
    /// # Returns
    /// The absolute path of the replaced module. On error the original file
    /// is unchanged and no temp file is left behind.
    pub fn sign_module(&self, path: &Path) -> Result<PathBuf, ModuleError> {
        self.run_module(path).1
    }

    /// Run one module through the pipeline, returning the stage it ended in.
    ///
    /// Any error moves the module to `ModuleStage::Failed`.
    fn run_module(&self, path: &Path) -> (ModuleStage, Result<PathBuf, ModuleError>) {
        let mut stage = ModuleStage::Unvalidated;
        let result = self.transform(path, &mut stage);
        let reached = stage;
        if result.is_err() {
            stage = ModuleStage::Failed;
        }

        match &result {
            Ok(target) => {
                log_parsed!("SIGNED: {}", target.display());
            }
            Err(e) if e.is_validation() => {
                log::warn!("[Sign] Skipping {} ({:?}): {}", path.display(), stage, e);
            }
            Err(e) => {
                log::error!(
                    "[Sign] Problem signing {} (after {:?}, now {:?}): {}",
                    path.display(),
                    reached,
                    stage,
                    e
                );
                if self.opts.verbose {
                    if let Some(stderr) = e.tool_stderr().filter(|s| !s.trim().is_empty()) {
                        log::error!("[Sign] tool stderr:\n{}", stderr.trim_end());
                    }
                }
            }
        }

        (stage, result)
    }

    fn transform(&self, path: &Path, stage: &mut ModuleStage) -> Result<PathBuf, ModuleError> {
        let record = module::validate(path)?;
        *stage = ModuleStage::Validated;

        let LoadedModule {
            record,
            payload,
            is_signed,
        } = module::load(record, self.opts.signature_window)?;
        *stage = ModuleStage::Loaded;

        let dir = record.dir().to_path_buf();
        let mut staged = tempfile::Builder::new()
            .prefix(STAGE_PREFIX)
            .tempfile_in(&dir)
            .map_err(|source| ModuleError::Stage {
                dir: dir.clone(),
                source,
            })?;
        staged
            .write_all(&payload)
            .and_then(|_| staged.flush())
            .map_err(|source| ModuleError::Stage {
                dir: dir.clone(),
                source,
            })?;
        drop(payload);
        *stage = ModuleStage::Staged;
        log::debug!(
            "[Sign] Staged {} -> {}",
            record.path.display(),
            staged.path().display()
        );

        if is_signed {
            strip_sig(&self.opts.strip_tool, staged.path(), &self.opts.run)?;
            *stage = ModuleStage::Stripped;
        } else {
            *stage = ModuleStage::NotSigned;
        }

        self.signer.sign_file(staged.path(), &self.opts.run)?;
        *stage = ModuleStage::Signed;

        let format = record.container_format;
        if format.is_compressed() {
            let signed = fs::read(staged.path()).map_err(|source| ModuleError::Read {
                path: staged.path().to_path_buf(),
                source,
            })?;
            let packed = format.compress(&signed)?;
            fs::write(staged.path(), packed).map_err(|source| ModuleError::Write {
                path: staged.path().to_path_buf(),
                source,
            })?;
            *stage = ModuleStage::Recompressed;
        } else {
            *stage = ModuleStage::Uncompressed;
        }

        if self.opts.run.dry_run {
            log::info!("[Sign] [DRY-RUN] Would replace {}", record.path.display());
            return Ok(record.path);
        }

        // Temp files are created 0600; keep the module's own mode
        if let Ok(meta) = fs::metadata(&record.path) {
            fs::set_permissions(staged.path(), meta.permissions()).map_err(|source| {
                ModuleError::Commit {
                    path: record.path.clone(),
                    source,
                }
            })?;
        }

        staged
            .persist(&record.path)
            .map_err(|e| ModuleError::Commit {
                path: record.path.clone(),
                source: e.error,
            })?;
        *stage = ModuleStage::Committed;

        Ok(record.path)
    }
}
