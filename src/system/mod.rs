/// System module: external program execution and logging helpers

pub mod process;

pub use process::{run_prog, ProcessOutput, RunOptions};

/// Logging macros for convenient access
/// Use the log crate directly for target-aware routing
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {{
        let msg = format!($($arg)*);
        log::info!("{}", msg);
    }}
}

#[macro_export]
macro_rules! log_parsed {
    ($($arg:tt)*) => {{
        let msg = format!($($arg)*);
        // Use target="parsed" for high-level events
        log::info!(target: "parsed", "{}", msg);
    }}
}
