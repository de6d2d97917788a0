//! Project configuration file handling.
//!
//! The project file is JSON and carries the target description, sync and
//! session settings, and the script catalog. It is loaded once per invocation
//! and handed to the pipeline as explicit values; nothing reads it globally.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Default configuration file name, looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "rrun.json";

/// Default prefix for derived session names (`<prefix>-<script_name>`)
pub const DEFAULT_SESSION_PREFIX: &str = "rrun-script";

/// Read-only mapping from script name to template body.
pub trait ScriptCatalog {
    /// Template body for `name`, if defined
    fn script(&self, name: &str) -> Option<&str>;

    /// All script names, sorted
    fn script_names(&self) -> Vec<String>;
}

impl ScriptCatalog for BTreeMap<String, String> {
    fn script(&self, name: &str) -> Option<&str> {
        self.get(name).map(String::as_str)
    }

    fn script_names(&self) -> Vec<String> {
        self.keys().cloned().collect()
    }
}

/// Remote host the scripts run on
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TargetConfig {
    /// Display name used in messages (defaults to the host)
    #[serde(default)]
    pub name: Option<String>,
    pub host: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    pub user: String,
    /// Private key; ssh-agent is used when absent
    #[serde(default)]
    pub key_path: Option<PathBuf>,
    /// Local port forwarded to the target's SSH port
    #[serde(default)]
    pub local_ssh_port: Option<u16>,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

/// Project synchronization settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncConfig {
    #[serde(default = "default_local_dir")]
    pub local_dir: PathBuf,
    #[serde(default = "default_remote_dir")]
    pub remote_dir: String,
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// Remote session settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionConfig {
    #[serde(default = "default_session_prefix")]
    pub prefix: String,
    /// Interpreter the uploaded script is run with
    #[serde(default = "default_shell")]
    pub shell: String,
    /// Remote directory for uploaded scripts (relative to the login directory)
    #[serde(default = "default_script_dir")]
    pub script_dir: String,
    /// Remote directory for session logs
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
}

/// Whole project file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub target: TargetConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub scripts: BTreeMap<String, String>,
}

fn default_ssh_port() -> u16 {
    22
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_local_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_remote_dir() -> String {
    "project".to_string()
}

fn default_session_prefix() -> String {
    DEFAULT_SESSION_PREFIX.to_string()
}

fn default_shell() -> String {
    "bash".to_string()
}

fn default_script_dir() -> String {
    ".rrun/scripts".to_string()
}

fn default_log_dir() -> String {
    ".rrun/logs".to_string()
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            local_dir: default_local_dir(),
            remote_dir: default_remote_dir(),
            exclude: Vec::new(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            prefix: default_session_prefix(),
            shell: default_shell(),
            script_dir: default_script_dir(),
            log_dir: default_log_dir(),
        }
    }
}

impl TargetConfig {
    /// Name used in user-facing messages
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.host)
    }

    /// Host and port SSH actually connects to, honouring a local forward
    pub fn ssh_endpoint(&self) -> (String, u16) {
        match self.local_ssh_port {
            Some(port) => ("127.0.0.1".to_string(), port),
            None => (self.host.clone(), self.port),
        }
    }

    /// Key path with a leading `~/` expanded against `$HOME`
    pub fn resolved_key_path(&self) -> Option<PathBuf> {
        self.key_path.as_ref().map(|path| expand_home(path))
    }
}

fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), std::env::var_os("HOME")) {
        (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => path.to_path_buf(),
    }
}

/// Names embedded in tmux session names and remote file names
pub(crate) fn is_session_safe(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

impl ProjectConfig {
    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read configuration from {:?}", path.as_ref()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse configuration JSON {:?}", path.as_ref()))?;

        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize configuration to JSON")?;

        fs::write(&path, json)
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.target.host.trim().is_empty() {
            anyhow::bail!("Target host must be specified");
        }
        if self.target.user.trim().is_empty() {
            anyhow::bail!("Target user must be specified");
        }
        if self.target.connect_timeout_secs == 0 {
            anyhow::bail!("connect_timeout_secs must be greater than zero");
        }

        if self.scripts.is_empty() {
            anyhow::bail!("At least one script must be defined");
        }
        // Script names end up in default session names
        for name in self.scripts.keys() {
            if !is_session_safe(name) {
                anyhow::bail!(
                    "Script name \"{}\" may only contain letters, digits, '_' and '-'",
                    name
                );
            }
        }

        if !is_session_safe(&self.session.prefix) {
            anyhow::bail!(
                "Session prefix \"{}\" may only contain letters, digits, '_' and '-'",
                self.session.prefix
            );
        }
        if self.session.shell.trim().is_empty() {
            anyhow::bail!("Session shell must not be empty");
        }
        if self.session.script_dir.trim().is_empty() || self.session.log_dir.trim().is_empty() {
            anyhow::bail!("Session script_dir and log_dir must not be empty");
        }
        if self.sync.remote_dir.trim().is_empty() {
            anyhow::bail!("Sync remote_dir must not be empty");
        }

        Ok(())
    }
}

impl ScriptCatalog for ProjectConfig {
    fn script(&self, name: &str) -> Option<&str> {
        self.scripts.script(name)
    }

    fn script_names(&self) -> Vec<String> {
        self.scripts.script_names()
    }
}
