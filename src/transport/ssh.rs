//! SSH command channel to the target.

use super::shell_join;
use crate::dispatcher::{AuthRef, SessionHandle, TargetInfo};
use crate::process_guard::run_guarded;
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::process::{Command, Stdio};

/// Runs commands on the target through the local `ssh` binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshTransport {
    host: String,
    port: u16,
    user: String,
    key_path: Option<PathBuf>,
    connect_timeout_secs: u64,
    dry_run: bool,
}

impl SshTransport {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        auth: &AuthRef,
        local_port: Option<u16>,
    ) -> Self {
        let (host, port) = match local_port {
            Some(local) => ("127.0.0.1".to_string(), local),
            None => (host.into(), port),
        };
        Self {
            host,
            port,
            user: user.into(),
            key_path: match auth {
                AuthRef::KeyFile(path) => Some(path.clone()),
                AuthRef::Agent => None,
            },
            connect_timeout_secs: 10,
            dry_run: false,
        }
    }

    /// Transport for the session addressed by `handle`
    pub fn for_handle(handle: &SessionHandle) -> Self {
        Self::new(
            handle.target.host.clone(),
            handle.target.port,
            handle.target.user.clone(),
            &handle.auth,
            handle.local_port,
        )
    }

    pub fn for_target(target: &TargetInfo) -> Self {
        Self::new(
            target.address.host.clone(),
            target.address.port,
            target.address.user.clone(),
            &target.auth,
            target.local_port,
        )
    }

    pub fn with_connect_timeout(mut self, secs: u64) -> Self {
        self.connect_timeout_secs = secs;
        self
    }

    /// Print commands instead of running them
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// `user@host`
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    /// Connection options shared by every invocation, without the program name
    pub fn connection_args(&self) -> Vec<String> {
        let mut args = vec![
            "-p".to_string(),
            self.port.to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=accept-new".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout_secs),
        ];
        if let Some(ref key) = self.key_path {
            args.push("-i".to_string());
            args.push(key.display().to_string());
        }
        args
    }

    /// Full argument vector (program included) running `remote_command`.
    ///
    /// `interactive` allocates a TTY; otherwise BatchMode forbids prompts.
    pub fn command_line(&self, remote_command: &str, interactive: bool) -> Vec<String> {
        let mut args = vec!["ssh".to_string()];
        args.extend(self.connection_args());
        if interactive {
            args.push("-t".to_string());
        } else {
            args.push("-o".to_string());
            args.push("BatchMode=yes".to_string());
        }
        args.push(self.destination());
        args.push(remote_command.to_string());
        args
    }

    /// Value for rsync's `-e` option
    pub fn rsh(&self) -> String {
        let mut args = vec!["ssh".to_string()];
        args.extend(self.connection_args());
        args.push("-o".to_string());
        args.push("BatchMode=yes".to_string());
        shell_join(&args)
    }

    /// Run `remote_command` and return its stdout.
    ///
    /// `input` is streamed to the remote command's stdin; stdin is empty
    /// otherwise. In dry-run mode the command is printed and `None` is
    /// returned.
    pub fn run_captured(&self, remote_command: &str, input: Option<&[u8]>) -> Result<Option<String>> {
        let argv = self.command_line(remote_command, false);
        if self.dry_run {
            match input {
                Some(data) => println!("[DRY RUN] {} < ({} bytes)", shell_join(&argv), data.len()),
                None => println!("[DRY RUN] {}", shell_join(&argv)),
            }
            return Ok(None);
        }

        tracing::debug!(
            destination = %self.destination(),
            input_bytes = input.map_or(0, |data| data.len()),
            "running remote command"
        );
        let output = run_guarded(
            Command::new(&argv[0])
                .args(&argv[1..])
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped()),
            input,
        )
        .context("Failed to spawn ssh")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "ssh to {} failed (exit code {}): {}",
                self.destination(),
                output.status.code().unwrap_or(-1),
                stderr.trim()
            );
        }

        Ok(Some(String::from_utf8_lossy(&output.stdout).to_string()))
    }

    /// Run `remote_command` on a TTY wired to this terminal.
    ///
    /// Not placed in a separate process group: the terminal must keep
    /// delivering keystrokes (and tmux's detach key) to it.
    pub fn run_interactive(&self, remote_command: &str) -> Result<()> {
        let argv = self.command_line(remote_command, true);
        if self.dry_run {
            println!("[DRY RUN] {}", shell_join(&argv));
            return Ok(());
        }

        let status = Command::new(&argv[0])
            .args(&argv[1..])
            .status()
            .context("Failed to spawn ssh")?;

        if !status.success() {
            anyhow::bail!(
                "interactive ssh to {} exited with code {}",
                self.destination(),
                status.code().unwrap_or(-1)
            );
        }
        Ok(())
    }
}
