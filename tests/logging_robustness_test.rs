//! Test for the decoupled logging system
//!
//! Tests that:
//! 1. Logs are persisted to disk even under high volume
//! 2. Callers are never blocked by the writer thread
//! 3. Log ordering is preserved
//! 4. Parsed milestones are written alongside regular lines

use std::fs;

use kmod_signer::log::LevelFilter;
use kmod_signer::LogCollector;

#[test]
fn test_log_collector_high_volume() {
    let temp_dir = tempfile::TempDir::new().expect("tempdir");
    let log_path = temp_dir.path().join("sign.log");
    let collector =
        LogCollector::new(LevelFilter::Info, Some(log_path.clone())).expect("Failed to create LogCollector");

    eprintln!("[TEST] Sending 5000 logs");
    for i in 0..5000 {
        collector.log_str(format!("[Sign] Processing module {}/5000", i));
        if i % 100 == 0 {
            collector.log_parsed(format!("SIGNED: module_{}.ko", i));
        }
    }
    collector.flush_and_wait().expect("flush");

    let content = fs::read_to_string(&log_path).expect("Failed to read log file");
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 5050);

    // Ordering preserved
    let first = lines.iter().position(|l| l.ends_with("Processing module 0/5000")).unwrap();
    let last = lines.iter().position(|l| l.ends_with("Processing module 4999/5000")).unwrap();
    assert!(first < last);
    assert_eq!(lines.iter().filter(|l| l.contains("SIGNED: ")).count(), 50);
    eprintln!("[TEST] ✓ {} lines persisted in order", lines.len());
}

#[test]
fn test_log_collector_from_many_threads() {
    let temp_dir = tempfile::TempDir::new().expect("tempdir");
    let log_path = temp_dir.path().join("threads.log");
    let collector = LogCollector::new(LevelFilter::Info, Some(log_path.clone())).expect("collector");

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let c = collector.clone();
            std::thread::spawn(move || {
                for i in 0..250 {
                    c.log_str(format!("thread {} line {}", t, i));
                }
            })
        })
        .collect();
    for h in handles {
        h.join().expect("thread");
    }
    collector.flush_and_wait().expect("flush");

    let content = fs::read_to_string(&log_path).expect("read log");
    assert_eq!(content.lines().count(), 1000);
}
