//! Decoupled logging pipeline for signing runs.
//!
//! # Architecture
//!
//! ```text
//! log::info!() / log_parsed!()
//!     |
//! [LogCollector] (log::Log impl, never blocks the caller)
//!     | (crossbeam unbounded channel)
//!     v
//! [writer thread] --> stderr
//!                 --> optional log file ([HH:MM:SS.mmm] [LEVEL] msg)
//!
//! Milestone lines render as `[HH:MM:SS.mmm] >> msg`.
//! ```
//!
//! Records with `target: "parsed"` are high-level milestones and are always
//! shown; everything else is subject to the configured level.

use chrono::Local;
use crossbeam_channel::{unbounded, Sender};
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Internal log line or special marker
enum LogMessage {
    /// Regular log line
    Line(LogLine),
    /// Flush marker with channel sender to signal completion
    Flush(std::sync::mpsc::Sender<()>),
}

/// A log line with metadata
#[derive(Clone, Debug)]
pub struct LogLine {
    /// The actual log message
    pub message: String,
    /// Log type: "full" or "parsed"
    pub log_type: String,
    /// Timestamp of when the log was created
    pub timestamp: String,
}

impl LogLine {
    pub fn new(message: String) -> Self {
        LogLine {
            message,
            log_type: "full".to_string(),
            timestamp: Local::now().format("%H:%M:%S%.3f").to_string(),
        }
    }

    pub fn parsed(message: String) -> Self {
        LogLine {
            log_type: "parsed".to_string(),
            ..LogLine::new(message)
        }
    }

    pub fn is_parsed(&self) -> bool {
        self.log_type == "parsed"
    }

    /// Milestones are marked so they stand out in a long log
    fn render(&self) -> String {
        if self.is_parsed() {
            format!("[{}] >> {}\n", self.timestamp, self.message)
        } else {
            format!("[{}] {}\n", self.timestamp, self.message)
        }
    }
}

/// Unified logger: stderr plus an optional log file
#[derive(Clone)]
pub struct LogCollector {
    /// Channel sender for log lines - crossbeam unbounded for cross-thread reliability
    tx: Sender<LogMessage>,
    level: LevelFilter,
    log_file: Option<PathBuf>,
}

impl LogCollector {
    /// Create a LogCollector and spawn its writer thread
    pub fn new(level: LevelFilter, log_file: Option<PathBuf>) -> Result<Self, String> {
        let mut file = match &log_file {
            Some(path) => Some(open_log_file(path)?),
            None => None,
        };

        let (tx, rx) = unbounded::<LogMessage>();

        std::thread::Builder::new()
            .name("kmod-signer-log".to_string())
            .spawn(move || {
                // Blocking recv() until every sender is gone
                while let Ok(msg) = rx.recv() {
                    match msg {
                        LogMessage::Line(line) => {
                            let rendered = line.render();
                            let _ = std::io::stderr().write_all(rendered.as_bytes());
                            if let Some(f) = file.as_mut() {
                                if let Err(e) = f.write_all(rendered.as_bytes()) {
                                    eprintln!("[Log] Failed to write to log file: {}", e);
                                    file = None;
                                }
                            }
                        }
                        LogMessage::Flush(done) => {
                            let _ = std::io::stderr().flush();
                            if let Some(f) = file.as_mut() {
                                let _ = f.flush();
                            }
                            let _ = done.send(());
                        }
                    }
                }
            })
            .map_err(|e| format!("Failed to spawn log writer: {}", e))?;

        Ok(LogCollector {
            tx,
            level,
            log_file,
        })
    }

    /// Register this collector as the global `log` backend
    pub fn install(self) -> Result<LogCollector, String> {
        let level = self.level;
        log::set_boxed_logger(Box::new(self.clone()))
            .map(|()| log::set_max_level(level))
            .map_err(|e| format!("Failed to set global logger: {}", e))?;
        Ok(self)
    }

    pub fn log_file(&self) -> Option<&Path> {
        self.log_file.as_deref()
    }

    /// Queue a regular log line
    pub fn log_str(&self, message: impl Into<String>) {
        let _ = self.tx.send(LogMessage::Line(LogLine::new(message.into())));
    }

    /// Queue a high-level milestone line
    pub fn log_parsed(&self, message: impl Into<String>) {
        let _ = self.tx.send(LogMessage::Line(LogLine::parsed(message.into())));
    }

    /// Block until every line queued so far has been written
    pub fn flush_and_wait(&self) -> Result<(), String> {
        let (done_tx, done_rx) = std::sync::mpsc::channel();
        self.tx
            .send(LogMessage::Flush(done_tx))
            .map_err(|_| "Log writer thread is gone".to_string())?;
        done_rx
            .recv()
            .map_err(|_| "Log writer thread exited before flushing".to_string())
    }
}

fn open_log_file(path: &Path) -> Result<File, String> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create log directory: {}", e))?;
        }
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| format!("Failed to open log file {}: {}", path.display(), e))
}

/// Implementation of the `log` crate's Log trait
/// Wires all log::info!(), log::warn!(), log::error!() calls into LogCollector
impl Log for LogCollector {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.target() == "parsed" || metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        // Target-aware routing: "parsed" lines are milestones, shown without a level tag
        if record.target() == "parsed" {
            self.log_parsed(record.args().to_string());
        } else if record.level() == Level::Info {
            self.log_str(record.args().to_string());
        } else {
            self.log_str(format!("[{}] {}", record.level(), record.args()));
        }
    }

    fn flush(&self) {
        let _ = self.flush_and_wait();
    }
}
