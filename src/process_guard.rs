//! Lifetime management for local helper processes
//!
//! `rsync` and the captured `ssh` dispatch run as children of `rrun` and must
//! not outlive it when a run is interrupted.
//!
//! - Children are spawned in their own process group with a parent-death signal
//! - Their PIDs are tracked in a global registry while they run
//! - SIGINT/SIGTERM/SIGHUP terminate every tracked group before exiting
//!
//! The remote tmux session is never a child of `rrun` and is unaffected.

use nix::libc;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::collections::HashSet;
use std::io::{self, Write};
use std::process::{Command, Output, Stdio};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

static CHILD_REGISTRY: OnceLock<Arc<Mutex<ChildRegistry>>> = OnceLock::new();

/// Registry of running helper processes
#[derive(Debug, Default)]
pub struct ChildRegistry {
    pids: HashSet<u32>,
    cleanup_initiated: bool,
}

impl ChildRegistry {
    /// Get or create the global child registry
    pub fn global() -> Arc<Mutex<ChildRegistry>> {
        CHILD_REGISTRY
            .get_or_init(|| Arc::new(Mutex::new(ChildRegistry::default())))
            .clone()
    }

    pub fn register(&mut self, pid: u32) {
        self.pids.insert(pid);
        tracing::debug!(pid, "registered child process");
    }

    pub fn unregister(&mut self, pid: u32) {
        self.pids.remove(&pid);
        tracing::debug!(pid, "unregistered child process");
    }

    pub fn count(&self) -> usize {
        self.pids.len()
    }

    pub fn contains(&self, pid: u32) -> bool {
        self.pids.contains(&pid)
    }

    /// SIGTERM every tracked process group, wait up to `grace_period`, then
    /// SIGKILL whatever is left. Runs at most once per registry.
    pub fn terminate_all(&mut self, grace_period: Duration) {
        if self.cleanup_initiated {
            return;
        }
        self.cleanup_initiated = true;

        if self.pids.is_empty() {
            return;
        }

        tracing::info!(count = self.pids.len(), "terminating child processes");

        let pids: Vec<u32> = self.pids.iter().copied().collect();
        for &pid in &pids {
            if let Err(e) = send_signal_to_group(pid, Signal::SIGTERM) {
                tracing::warn!(pid, error = %e, "SIGTERM to process group failed");
                let _ = send_signal(pid, Signal::SIGTERM);
            }
        }

        let start = Instant::now();
        while start.elapsed() < grace_period {
            if pids.iter().all(|&pid| !is_process_alive(pid)) {
                self.pids.clear();
                return;
            }
            std::thread::sleep(Duration::from_millis(100));
        }

        for &pid in &pids {
            if is_process_alive(pid) {
                tracing::warn!(pid, "process group did not exit, sending SIGKILL");
                if send_signal_to_group(pid, Signal::SIGKILL).is_err() {
                    let _ = send_signal(pid, Signal::SIGKILL);
                }
            }
        }

        self.pids.clear();
    }
}

fn send_signal(pid: u32, signal: Signal) -> Result<(), nix::Error> {
    signal::kill(Pid::from_raw(pid as i32), signal)
}

/// Negative PID signals the whole group, so grandchildren (the `ssh` that
/// rsync spawns) go down too
fn send_signal_to_group(pgid: u32, signal: Signal) -> Result<(), nix::Error> {
    signal::kill(Pid::from_raw(-(pgid as i32)), signal)
}

/// Alive means it exists and is not a zombie
fn is_process_alive(pid: u32) -> bool {
    if signal::kill(Pid::from_raw(pid as i32), None).is_err() {
        return false;
    }

    if let Ok(stat) = std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        let fields: Vec<&str> = stat.split_whitespace().collect();
        if fields.len() > 2 {
            return !matches!(fields[2], "Z" | "X");
        }
    }

    true
}

/// Install SIGINT/SIGTERM/SIGHUP handlers that clean up tracked children and
/// exit with `128 + signal`. Call once at program start.
pub fn init_signal_handlers() -> Result<(), io::Error> {
    use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP])?;

    std::thread::spawn(move || {
        if let Some(sig) = signals.forever().next() {
            tracing::info!(signal = sig, "received signal, cleaning up");

            if let Ok(mut registry) = ChildRegistry::global().lock() {
                registry.terminate_all(Duration::from_secs(3));
            }

            std::process::exit(128 + sig);
        }
    });

    Ok(())
}

/// Extension trait for `Command` to isolate children in their own group
pub trait CommandProcessGroup {
    fn in_new_process_group(&mut self) -> &mut Self;
}

impl CommandProcessGroup for Command {
    fn in_new_process_group(&mut self) -> &mut Self {
        use std::os::unix::process::CommandExt;
        // SAFETY: only async-signal-safe calls between fork and exec
        unsafe {
            self.pre_exec(|| {
                nix::unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0))
                    .map_err(io::Error::other)?;

                if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) == -1 {
                    return Err(io::Error::last_os_error());
                }

                Ok(())
            });
        }
        self
    }
}

/// Spawn `cmd` in its own process group, track it while it runs and collect
/// its output. Stdout and stderr must already be configured by the caller.
///
/// `input`, when given, is written to the child's stdin from a helper thread
/// and stdin is closed afterwards. A child that exits without reading all of
/// it is not an error.
pub fn run_guarded(cmd: &mut Command, input: Option<&[u8]>) -> io::Result<Output> {
    if input.is_some() {
        cmd.stdin(Stdio::piped());
    }
    let mut child = cmd.in_new_process_group().spawn()?;
    let pid = child.id();

    let registry = ChildRegistry::global();
    if let Ok(mut guard) = registry.lock() {
        guard.register(pid);
    }

    let writer = match (input, child.stdin.take()) {
        (Some(data), Some(mut stdin)) => {
            let data = data.to_vec();
            Some(std::thread::spawn(move || stdin.write_all(&data)))
        }
        _ => None,
    };

    let output = child.wait_with_output();

    if let Ok(mut guard) = registry.lock() {
        guard.unregister(pid);
    }

    if let Some(writer) = writer {
        match writer.join() {
            Ok(Err(e)) if e.kind() != io::ErrorKind::BrokenPipe => return Err(e),
            Err(_) => return Err(io::Error::other("stdin writer thread panicked")),
            _ => {}
        }
    }

    output
}
