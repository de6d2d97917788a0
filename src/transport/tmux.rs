//! tmux-backed session layer.
//!
//! A dispatch is one `sh -c` command built by [`remote_command`], so the
//! protocol does not depend on the target user's login shell:
//!
//! - restart: kill `=<session>` (exact match), then launch
//! - otherwise: if `=<session>` exists, report `attached` and do nothing else;
//!   if not, launch
//!
//! The rendered script travels base64-encoded on the command's stdin
//! ([`script_payload`]), never inside the command itself. Launching decodes it
//! to `<script_dir>/<session>.sh` and starts it with `tmux new-session -d`.
//! With logging the output goes through `tee` to `<log_dir>/<session>.log`:
//! appended on a fresh launch, truncated on restart.
//!
//! The command ends by echoing `created`, `attached` or `restarted`, which
//! becomes the [`SessionOutcome`].

use super::shell_quote;
use super::ssh::SshTransport;
use crate::config_file::SessionConfig;
use crate::dispatcher::{DispatchDirective, SessionHandle, SessionLayer, SessionOutcome};
use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Remote locations and interpreter used for launched scripts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteLayout {
    pub shell: String,
    pub script_dir: String,
    pub log_dir: String,
}

impl From<&SessionConfig> for RemoteLayout {
    fn from(config: &SessionConfig) -> Self {
        Self {
            shell: config.shell.clone(),
            script_dir: config.script_dir.clone(),
            log_dir: config.log_dir.clone(),
        }
    }
}

impl Default for RemoteLayout {
    fn default() -> Self {
        Self::from(&SessionConfig::default())
    }
}

impl RemoteLayout {
    pub fn script_path(&self, session_name: &str) -> String {
        format!("{}/{}.sh", self.script_dir.trim_end_matches('/'), session_name)
    }

    pub fn log_path(&self, session_name: &str) -> String {
        format!("{}/{}.log", self.log_dir.trim_end_matches('/'), session_name)
    }
}

/// Exact-match tmux target for a session
fn exact_target(session_name: &str) -> String {
    shell_quote(&format!("={}", session_name))
}

/// Command run inside the tmux pane
fn pane_command(layout: &RemoteLayout, handle: &SessionHandle) -> String {
    let script_path = layout.script_path(&handle.session_name);
    let mut command = format!("{} {}", layout.shell, shell_quote(&script_path));
    if handle.logging {
        let tee = if handle.restart { "tee" } else { "tee -a" };
        command.push_str(&format!(
            " 2>&1 | {} {}",
            tee,
            shell_quote(&layout.log_path(&handle.session_name))
        ));
    }
    command
}

/// Decode the script from stdin and start a detached session, then echo `marker`
fn launch_command(layout: &RemoteLayout, handle: &SessionHandle, marker: &str) -> String {
    let mut dirs = shell_quote(&layout.script_dir);
    if handle.logging {
        dirs.push(' ');
        dirs.push_str(&shell_quote(&layout.log_dir));
    }

    format!(
        "mkdir -p {dirs} && base64 -d > {path} && \
         tmux new-session -d -s {session} -c \"$PWD\" {pane} && echo {marker}",
        dirs = dirs,
        path = shell_quote(&layout.script_path(&handle.session_name)),
        session = shell_quote(&handle.session_name),
        pane = shell_quote(&pane_command(layout, handle)),
        marker = marker,
    )
}

/// POSIX shell script implementing one dispatch directive.
///
/// Only the launch branch reads stdin; an attached session leaves it unread.
pub fn session_script(layout: &RemoteLayout, handle: &SessionHandle) -> String {
    let target = exact_target(&handle.session_name);
    if handle.restart {
        format!(
            "tmux kill-session -t {} 2>/dev/null; {}",
            target,
            launch_command(layout, handle, "restarted")
        )
    } else {
        format!(
            "if tmux has-session -t {} 2>/dev/null; then echo attached; else {}; fi",
            target,
            launch_command(layout, handle, "created")
        )
    }
}

/// Remote command for one dispatch directive, run under `sh` whatever the
/// login shell is. Its length does not depend on the script body.
pub fn remote_command(layout: &RemoteLayout, directive: &DispatchDirective) -> String {
    format!("sh -c {}", shell_quote(&session_script(layout, &directive.handle)))
}

/// Bytes fed to [`remote_command`] on stdin: the script body, base64-encoded
pub fn script_payload(directive: &DispatchDirective) -> String {
    let mut payload = STANDARD.encode(directive.script_body.as_bytes());
    payload.push('\n');
    payload
}

/// Remote command attaching the caller's terminal to a session
pub fn attach_command(session_name: &str) -> String {
    format!("tmux attach-session -t {}", exact_target(session_name))
}

/// Read the outcome marker from the last non-empty stdout line
pub fn parse_outcome(stdout: &str) -> Result<SessionOutcome> {
    let marker = stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default();
    marker
        .parse::<SessionOutcome>()
        .with_context(|| format!("Unexpected reply from remote session layer: {:?}", marker))
}

/// [`SessionLayer`] running tmux on the target over SSH
#[derive(Debug, Clone)]
pub struct TmuxSessionLayer {
    layout: RemoteLayout,
    connect_timeout_secs: u64,
    dry_run: bool,
}

impl TmuxSessionLayer {
    pub fn new(layout: RemoteLayout) -> Self {
        Self {
            layout,
            connect_timeout_secs: 10,
            dry_run: false,
        }
    }

    pub fn with_connect_timeout(mut self, secs: u64) -> Self {
        self.connect_timeout_secs = secs;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    fn transport(&self, handle: &SessionHandle) -> SshTransport {
        SshTransport::for_handle(handle)
            .with_connect_timeout(self.connect_timeout_secs)
            .with_dry_run(self.dry_run)
    }

    /// Attach this terminal to the session until the user detaches
    pub fn attach(&self, handle: &SessionHandle) -> Result<()> {
        tracing::info!(session = %handle.session_name, "attaching to session");
        self.transport(handle)
            .run_interactive(&attach_command(&handle.session_name))
    }
}

impl SessionLayer for TmuxSessionLayer {
    fn dispatch(&self, directive: &DispatchDirective) -> Result<SessionOutcome> {
        let command = remote_command(&self.layout, directive);
        let payload = script_payload(directive);
        let stdout = self
            .transport(&directive.handle)
            .run_captured(&command, Some(payload.as_bytes()))?;

        match stdout {
            Some(stdout) => parse_outcome(&stdout),
            // Dry run: report what a clean target would do
            None if directive.handle.restart => Ok(SessionOutcome::Restarted),
            None => Ok(SessionOutcome::Created),
        }
    }
}
