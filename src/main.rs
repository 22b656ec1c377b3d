use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::LevelFilter;

use kmod_signer::config::loader::load_settings;
use kmod_signer::kernel::scan::modules_from_dir;
use kmod_signer::kernel::signer::SignerPaths;
use kmod_signer::{LogCollector, ModulePipeline};

/// Sign kernel modules: `kmod-signer mod1 mod2 ...` or `kmod-signer -d <dir>`
#[derive(Parser, Debug)]
#[command(name = "kmod-signer", version, about)]
struct Cli {
    /// Module files to sign (.ko, .ko.zst, .ko.xz, .ko.gz)
    #[arg(conflicts_with = "dir")]
    modules: Vec<PathBuf>,

    /// Sign every module found in this directory
    #[arg(short = 'd', long = "dir")]
    dir: Option<PathBuf>,

    /// Kernel build directory holding scripts/sign-file and certs-local/current
    #[arg(long)]
    build_dir: Option<PathBuf>,

    /// Signing executable (overrides the build directory)
    #[arg(long)]
    signer: Option<PathBuf>,

    /// Private key (overrides the build directory)
    #[arg(long)]
    key: Option<PathBuf>,

    /// Certificate (overrides the build directory)
    #[arg(long)]
    cert: Option<PathBuf>,

    /// Hash algorithm, e.g. sha512 (overrides khash / kernel config)
    #[arg(long)]
    hash: Option<String>,

    /// Tool used to strip an existing signature
    #[arg(long)]
    strip_tool: Option<PathBuf>,

    /// Settings file (default ~/.config/kmod-signer/settings.json)
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Verbose output, including stderr of failing tools
    #[arg(short, long)]
    verbose: bool,

    /// Show what would be done without running tools or replacing files
    #[arg(short = 'n', long)]
    dry_run: bool,
}

/// Build directory when none is given: the binary is installed in
/// `<build>/certs-local/`, so its grandparent directory.
fn default_build_dir() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?.canonicalize().ok()?;
    exe.parent()?.parent().map(PathBuf::from)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut settings = match load_settings(cli.settings.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    settings.verbose |= cli.verbose;
    if let Some(strip_tool) = &cli.strip_tool {
        settings.strip_tool = strip_tool.clone();
    }

    let level = if settings.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let collector = match LogCollector::new(level, settings.log_file.clone()).and_then(LogCollector::install) {
        Ok(collector) => {
            if let Some(path) = collector.log_file() {
                log::debug!("[Main] Logging to {}", path.display());
            }
            Some(collector)
        }
        Err(e) => {
            eprintln!("[Main] WARNING: logging unavailable: {}", e);
            None
        }
    };

    let code = run(&cli, &settings);

    if let Some(collector) = collector {
        if let Err(e) = collector.flush_and_wait() {
            eprintln!("[Main] WARNING: failed to flush log: {}", e);
        }
    }
    code
}

fn run(cli: &Cli, settings: &kmod_signer::Settings) -> ExitCode {
    let modules = match &cli.dir {
        Some(dir) => match modules_from_dir(dir) {
            Ok(modules) => modules,
            Err(e) => {
                log::error!("{}", e);
                return ExitCode::FAILURE;
            }
        },
        None => cli.modules.clone(),
    };

    if modules.is_empty() {
        log::info!("No modules to sign");
        return ExitCode::SUCCESS;
    }

    let base = match cli.build_dir.clone().or_else(default_build_dir) {
        Some(build_dir) => SignerPaths::from_build_dir(&build_dir),
        None => SignerPaths::default(),
    };
    let overrides = SignerPaths {
        signer: cli.signer.clone(),
        key: cli.key.clone(),
        cert: cli.cert.clone(),
        hash: cli.hash.clone(),
    };
    let signer = match base.overridden_by(overrides).build() {
        Ok(signer) => signer,
        Err(e) => {
            log::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    log::debug!(
        "[Main] signer={} key={} cert={} hash={}",
        signer.signer().display(),
        signer.key().display(),
        signer.cert().display(),
        signer.hash()
    );

    let pipeline = ModulePipeline::new(&signer, settings.tool_options(cli.dry_run));
    let report = pipeline.sign_all(&modules);

    for (path, _) in &report.failed {
        log::error!("Problem signing : {}", path.display());
    }

    if report.success() {
        log::info!("Success: all done");
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
