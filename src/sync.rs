//! One-way project sync to the target with `rsync` over SSH.

use crate::config_file::SyncConfig;
use crate::dispatcher::{ProjectSync, TargetInfo};
use crate::process_guard::run_guarded;
use crate::transport::{SshTransport, shell_join};
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::process::{Command, Stdio};

/// Pushes `local_dir` to `remote_dir` on the target, deleting remote files
/// that no longer exist locally. Excluded paths are left alone on both sides.
#[derive(Debug, Clone)]
pub struct RsyncProjectSync {
    local_dir: PathBuf,
    remote_dir: String,
    exclude: Vec<String>,
    transport: SshTransport,
}

impl RsyncProjectSync {
    pub fn new(config: &SyncConfig, transport: SshTransport) -> Self {
        Self {
            local_dir: config.local_dir.clone(),
            remote_dir: config.remote_dir.clone(),
            exclude: config.exclude.clone(),
            transport,
        }
    }

    pub fn for_target(config: &SyncConfig, target: &TargetInfo, dry_run: bool) -> Self {
        Self::new(config, SshTransport::for_target(target).with_dry_run(dry_run))
    }

    /// Full argument vector, program included
    pub fn command_line(&self) -> Vec<String> {
        let mut args = vec![
            "rsync".to_string(),
            "-az".to_string(),
            "--delete".to_string(),
            "-e".to_string(),
            self.transport.rsh(),
        ];
        for pattern in &self.exclude {
            args.push("--exclude".to_string());
            args.push(pattern.clone());
        }
        // Trailing slashes: copy the directory's contents, not the directory
        args.push(format!("{}/", self.local_dir.display().to_string().trim_end_matches('/')));
        args.push(format!(
            "{}:{}/",
            self.transport.destination(),
            self.remote_dir.trim_end_matches('/')
        ));
        args
    }
}

impl ProjectSync for RsyncProjectSync {
    fn sync(&self) -> Result<()> {
        let argv = self.command_line();
        if self.transport.is_dry_run() {
            println!("[DRY RUN] {}", shell_join(&argv));
            return Ok(());
        }

        tracing::info!(
            local = %self.local_dir.display(),
            remote = %self.remote_dir,
            "syncing project"
        );

        let output = run_guarded(
            Command::new(&argv[0])
                .args(&argv[1..])
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped()),
            None,
        )
        .context("Failed to spawn rsync")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "Project sync failed (rsync exit code {}): {}",
                output.status.code().unwrap_or(-1),
                stderr.trim()
            );
        }

        tracing::info!("project sync complete");
        Ok(())
    }
}
