//! Pre-flight checks for the local environment
//!
//! Verifies the binaries the concrete collaborators shell out to are on
//! `PATH` before anything reaches the network:
//! - `ssh` for every run
//! - `rsync` when the run syncs the project

use crate::error::RunError;

/// Result of environment verification
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SanityCheckResult {
    pub missing_binaries: Vec<String>,
}

impl SanityCheckResult {
    pub fn is_ok(&self) -> bool {
        self.missing_binaries.is_empty()
    }

    /// Turn missing binaries into a configuration-class error
    pub fn into_result(self) -> Result<(), RunError> {
        if self.is_ok() {
            return Ok(());
        }
        let hints: Vec<String> = self
            .missing_binaries
            .iter()
            .map(|b| format!("{} (package: {})", b, package_for_binary(b)))
            .collect();
        Err(RunError::config(format!(
            "Missing required local binaries: {}",
            hints.join(", ")
        )))
    }
}

fn binary_exists(name: &str) -> bool {
    which::which(name).is_ok()
}

/// Package that usually ships `binary`
fn package_for_binary(binary: &str) -> &'static str {
    match binary {
        "ssh" => "openssh-client",
        "rsync" => "rsync",
        _ => "unknown",
    }
}

/// Binaries needed for a run, given whether it syncs
pub fn required_binaries(sync: bool) -> Vec<&'static str> {
    let mut binaries = vec!["ssh"];
    if sync {
        binaries.push("rsync");
    }
    binaries
}

/// Check that every binary in `binaries` can be found
pub fn verify_binaries(binaries: &[&str]) -> SanityCheckResult {
    let missing_binaries: Vec<String> = binaries
        .iter()
        .filter(|b| !binary_exists(b))
        .map(|b| b.to_string())
        .collect();

    if missing_binaries.is_empty() {
        tracing::debug!(?binaries, "pre-flight checks passed");
    } else {
        tracing::warn!(?missing_binaries, "pre-flight checks failed");
    }

    SanityCheckResult { missing_binaries }
}

/// Pre-flight check for a run
pub fn run_preflight_checks(sync: bool) -> Result<(), RunError> {
    verify_binaries(&required_binaries(sync)).into_result()
}
