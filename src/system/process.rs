//! External program execution.
//!
//! `run_prog` runs a program (never through a shell), optionally feeding it
//! input, and collects stdout and stderr to exhaustion. All three pipes are
//! switched to non-blocking mode and serviced from a single `poll(2)` loop, so
//! a child blocked on a full stderr pipe can never deadlock us while we wait
//! on stdout (or the other way round), whatever the output volume.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::io::{self, ErrorKind, Read, Write};
use std::os::fd::{AsFd, AsRawFd};
use std::os::unix::process::ExitStatusExt;
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};
use std::time::Duration;

use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};

use crate::error::ExecError;

/// Bytes read from a pipe per readiness event.
const READ_BUF_SIZE: usize = 8192;

/// Default bound on a single multiplexer wait.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(30);

/// Captured result of a finished program.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code, or the negated signal number if the program was killed
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Options for a single `run_prog` call.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Bytes written to the program's stdin; stdin is /dev/null when unset
    pub input: Option<Vec<u8>>,
    /// Replaces the inherited environment entirely when set
    pub env: Option<HashMap<String, String>>,
    /// Report success without starting anything
    pub dry_run: bool,
    pub poll_timeout: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions {
            input: None,
            env: None,
            dry_run: false,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
        }
    }
}

impl RunOptions {
    pub fn with_input(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.input = Some(input.into());
        self
    }

    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = Some(env);
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

/// Run `argv[0]` with `argv[1..]` as arguments and wait for it to finish.
///
/// An empty `argv` is a no-op that succeeds with no output.
///
/// # Returns
/// - `Ok(ProcessOutput)` once the program has terminated and both output
///   streams reached end-of-file; a nonzero exit is still `Ok`
/// - `Err(ExecError::Spawn)` if the program could not be started
/// - `Err(ExecError::Io)` if talking to the program failed midway
pub fn run_prog<S: AsRef<OsStr>>(argv: &[S], opts: &RunOptions) -> Result<ProcessOutput, ExecError> {
    let Some((program, args)) = argv.split_first() else {
        return Ok(ProcessOutput::default());
    };
    let program_name = program.as_ref().to_string_lossy().to_string();

    if opts.dry_run {
        log::debug!(
            "[Exec] [DRY-RUN] {}",
            argv.iter()
                .map(|a| a.as_ref().to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ")
        );
        return Ok(ProcessOutput::default());
    }

    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(if opts.input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    if let Some(env) = &opts.env {
        command.env_clear().envs(env);
    }

    let child = command.spawn().map_err(|source| ExecError::Spawn {
        program: program_name.clone(),
        source,
    })?;

    log::debug!("[Exec] Started '{}' (pid {})", program_name, child.id());

    let io_err = |source: io::Error| ExecError::Io {
        program: program_name.clone(),
        source,
    };

    let input = opts.input.as_deref().unwrap_or_default();
    let (status, stdout, stderr) = wait_for_child(child, input, opts.poll_timeout).map_err(io_err)?;

    let exit_code = status
        .code()
        .or_else(|| status.signal().map(|sig| -sig))
        .unwrap_or(-1);

    Ok(ProcessOutput {
        exit_code,
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
    })
}

fn set_nonblocking<F: AsRawFd>(fd: &F) -> io::Result<()> {
    let flags = fcntl(fd.as_raw_fd(), FcntlArg::F_GETFL).map_err(io::Error::from)?;
    let flags = OFlag::from_bits_truncate(flags) | OFlag::O_NONBLOCK;
    fcntl(fd.as_raw_fd(), FcntlArg::F_SETFL(flags)).map_err(io::Error::from)?;
    Ok(())
}

/// Readiness of the three pipes after one multiplexer wait.
#[derive(Default)]
struct Ready {
    stdin: bool,
    stdout: bool,
    stderr: bool,
}

/// Drive the child to completion, servicing all pipes from one poll loop.
fn wait_for_child(
    mut child: Child,
    input: &[u8],
    poll_timeout: Duration,
) -> io::Result<(ExitStatus, Vec<u8>, Vec<u8>)> {
    let mut stdin: Option<ChildStdin> = child.stdin.take().filter(|_| !input.is_empty());
    let mut stdout: Option<ChildStdout> = child.stdout.take();
    let mut stderr: Option<ChildStderr> = child.stderr.take();

    if let Some(pipe) = &stdin {
        set_nonblocking(pipe)?;
    }
    if let Some(pipe) = &stdout {
        set_nonblocking(pipe)?;
    }
    if let Some(pipe) = &stderr {
        set_nonblocking(pipe)?;
    }

    let timeout_ms = u16::try_from(poll_timeout.as_millis()).unwrap_or(u16::MAX);
    let mut written = 0usize;
    let mut out_buf = Vec::new();
    let mut err_buf = Vec::new();
    let mut chunk = [0u8; READ_BUF_SIZE];
    let mut status: Option<ExitStatus> = None;

    loop {
        if status.is_none() {
            status = child.try_wait()?;
        }

        if stdin.is_none() && stdout.is_none() && stderr.is_none() {
            break;
        }

        let ready = {
            let read_events = PollFlags::POLLIN;
            let mut fds: Vec<PollFd> = Vec::with_capacity(3);
            let mut slots: Vec<u8> = Vec::with_capacity(3);

            if let Some(pipe) = &stdout {
                fds.push(PollFd::new(pipe.as_fd(), read_events));
                slots.push(1);
            }
            if let Some(pipe) = &stderr {
                fds.push(PollFd::new(pipe.as_fd(), read_events));
                slots.push(2);
            }
            if let Some(pipe) = &stdin {
                fds.push(PollFd::new(pipe.as_fd(), PollFlags::POLLOUT));
                slots.push(0);
            }

            match poll(&mut fds, PollTimeout::from(timeout_ms)) {
                Ok(_) => {}
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(io::Error::from(e)),
            }

            let mut ready = Ready::default();
            for (fd, slot) in fds.iter().zip(slots) {
                let hit = fd.revents().is_some_and(|r| !r.is_empty());
                match slot {
                    0 => ready.stdin = hit,
                    1 => ready.stdout = hit,
                    _ => ready.stderr = hit,
                }
            }
            ready
        };

        if ready.stdin {
            if let Some(pipe) = stdin.as_mut() {
                match pipe.write(&input[written..]) {
                    Ok(n) => written += n,
                    Err(e) if e.kind() == ErrorKind::WouldBlock => {}
                    Err(e) if e.kind() == ErrorKind::Interrupted => {}
                    // Child closed its end without reading everything
                    Err(e) if e.kind() == ErrorKind::BrokenPipe => written = input.len(),
                    Err(e) => return Err(e),
                }
            }
            if written >= input.len() {
                // Dropping the handle closes the pipe and signals EOF
                stdin = None;
            }
        }

        if ready.stdout && drain_once(&mut stdout, &mut out_buf, &mut chunk)? {
            stdout = None;
        }

        if ready.stderr && drain_once(&mut stderr, &mut err_buf, &mut chunk)? {
            stderr = None;
        }
    }

    let status = match status {
        Some(status) => status,
        None => child.wait()?,
    };

    Ok((status, out_buf, err_buf))
}

/// Read one chunk from a ready pipe. Returns true at end-of-stream.
fn drain_once<R: Read>(pipe: &mut Option<R>, acc: &mut Vec<u8>, chunk: &mut [u8]) -> io::Result<bool> {
    let Some(reader) = pipe.as_mut() else {
        return Ok(true);
    };
    match reader.read(chunk) {
        Ok(0) => Ok(true),
        Ok(n) => {
            acc.extend_from_slice(&chunk[..n]);
            Ok(false)
        }
        Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::Interrupted => Ok(false),
        Err(e) => Err(e),
    }
}
