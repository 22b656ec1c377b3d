//! Process executor stress tests
//!
//! Tests that:
//! 1. Multi-megabyte stdout and stderr are captured completely
//! 2. Large stdin input is delivered while output is drained concurrently
//! 3. Calls finish in bounded time whatever the output volume
//! 4. Start failures are reported separately from nonzero exits

use std::time::{Duration, Instant};

use kmod_signer::{run_prog, ExecError, RunOptions};

const BOUND: Duration = Duration::from_secs(60);

#[test]
fn test_large_output_on_both_streams() {
    let start = Instant::now();
    let out = run_prog(
        &[
            "/bin/sh",
            "-c",
            "head -c 5000000 /dev/zero | tr '\\0' a; head -c 3000000 /dev/zero | tr '\\0' b >&2; exit 7",
        ],
        &RunOptions::default(),
    )
    .expect("program should run");

    eprintln!("[TEST] ✓ Collected {} + {} bytes in {:?}", out.stdout.len(), out.stderr.len(), start.elapsed());
    assert!(start.elapsed() < BOUND);
    assert_eq!(out.exit_code, 7);
    assert_eq!(out.stdout.len(), 5_000_000);
    assert_eq!(out.stderr.len(), 3_000_000);
    assert!(out.stdout.bytes().all(|b| b == b'a'));
    assert!(out.stderr.bytes().all(|b| b == b'b'));
}

#[test]
fn test_interleaved_streams_do_not_deadlock() {
    // Alternate writes so each pipe fills while the other is being written
    let script = "i=0; while [ $i -lt 200 ]; do \
                  head -c 16384 /dev/zero | tr '\\0' o; \
                  head -c 16384 /dev/zero | tr '\\0' e >&2; \
                  i=$((i+1)); done";
    let start = Instant::now();
    let out = run_prog(&["/bin/sh", "-c", script], &RunOptions::default()).expect("program should run");

    assert!(start.elapsed() < BOUND);
    assert!(out.success());
    assert_eq!(out.stdout.len(), 200 * 16384);
    assert_eq!(out.stderr.len(), 200 * 16384);
}

#[test]
fn test_large_input_round_trips_through_cat() {
    let input: Vec<u8> = (0..2_000_000u32).map(|i| b'a' + (i % 26) as u8).collect();
    let opts = RunOptions::default().with_input(input.clone());

    let start = Instant::now();
    let out = run_prog(&["/bin/cat"], &opts).expect("cat should run");

    assert!(start.elapsed() < BOUND);
    assert!(out.success());
    assert_eq!(out.stdout.as_bytes(), input.as_slice());
}

#[test]
fn test_child_ignoring_input_does_not_hang() {
    let opts = RunOptions::default().with_input(vec![b'x'; 1_000_000]);
    let out = run_prog(&["/bin/sh", "-c", "exec 0<&-; echo done"], &opts).expect("program should run");
    assert!(out.success());
    assert_eq!(out.stdout, "done\n");
}

#[test]
fn test_spawn_failure_vs_nonzero_exit() {
    let missing = run_prog(&["/no/such/sign-file"], &RunOptions::default());
    assert!(matches!(missing, Err(ExecError::Spawn { .. })));

    let rejected = run_prog(&["/bin/sh", "-c", "exit 1"], &RunOptions::default()).expect("sh runs");
    assert_eq!(rejected.exit_code, 1);
    assert!(!rejected.success());
}

#[test]
fn test_short_poll_timeout_still_completes() {
    let opts = RunOptions {
        poll_timeout: Duration::from_millis(1),
        ..RunOptions::default()
    };
    let out = run_prog(&["/bin/sh", "-c", "sleep 0.2; echo late"], &opts).expect("program should run");
    assert_eq!(out.stdout, "late\n");
}
