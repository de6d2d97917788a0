//! Session dispatch.
//!
//! Takes a validated [`RunRequest`] and a rendered script body and hands them
//! to the remote session layer:
//!
//! 1. **CheckReady**: the readiness probe must report the target as up.
//! 2. **OptionalSync**: push the project when the request asks for it.
//! 3. **NameSession**: explicit session name, or `<prefix>-<script_name>`.
//! 4. **Dispatch**: one directive to the session layer, which creates,
//!    attaches or restarts the named session.
//!
//! The dispatcher holds no state between invocations. Session identity lives
//! only in the remote session layer, keyed by name.

use crate::config_file::{DEFAULT_SESSION_PREFIX, TargetConfig};
use crate::error::{Result, RunError};
use crate::request::RunRequest;
use std::fmt;
use std::path::PathBuf;
use strum::{Display, EnumString};

/// Reports whether the target accepts commands.
pub trait ReadinessProbe {
    fn is_ready(&self) -> bool;
}

/// One-way push of local project files to the target.
pub trait ProjectSync {
    fn sync(&self) -> anyhow::Result<()>;
}

/// Create/attach/restart semantics over named remote sessions.
///
/// Implementations must honour [`SessionHandle::restart`]: kill a same-named
/// session before creating a fresh one. Without `restart`, an existing
/// session is attached to and the script body is not run again.
pub trait SessionLayer {
    fn dispatch(&self, directive: &DispatchDirective) -> anyhow::Result<SessionOutcome>;
}

/// What the session layer did with a directive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum SessionOutcome {
    /// No session of that name existed; the script was launched
    Created,
    /// A session of that name was already running and was left as is
    Attached,
    /// The previous session was killed and the script launched fresh
    Restarted,
}

impl SessionOutcome {
    /// True when the script was launched by this dispatch
    pub fn started(self) -> bool {
        !matches!(self, Self::Attached)
    }
}

/// Network address of the target's command channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetAddress {
    pub host: String,
    pub port: u16,
    pub user: String,
}

impl fmt::Display for TargetAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.user, self.host, self.port)
    }
}

/// How the transport authenticates
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthRef {
    /// Whatever the local ssh-agent offers
    Agent,
    /// Private key file
    KeyFile(PathBuf),
}

/// Everything the session layer needs to address one named session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    pub session_name: String,
    pub target: TargetAddress,
    pub auth: AuthRef,
    pub logging: bool,
    pub restart: bool,
    /// Local port forwarded to the target's SSH port, if any
    pub local_port: Option<u16>,
}

/// The single directive handed to [`SessionLayer::dispatch`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchDirective {
    pub handle: SessionHandle,
    /// Used for labelling only
    pub script_name: String,
    pub script_body: String,
}

/// Connection details the dispatcher copies into every [`SessionHandle`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetInfo {
    pub name: String,
    pub address: TargetAddress,
    pub auth: AuthRef,
    pub local_port: Option<u16>,
}

impl From<&TargetConfig> for TargetInfo {
    fn from(config: &TargetConfig) -> Self {
        Self {
            name: config.display_name().to_string(),
            address: TargetAddress {
                host: config.host.clone(),
                port: config.port,
                user: config.user.clone(),
            },
            auth: match config.resolved_key_path() {
                Some(path) => AuthRef::KeyFile(path),
                None => AuthRef::Agent,
            },
            local_port: config.local_ssh_port,
        }
    }
}

/// Derive the effective session name for a request.
///
/// Runs of the same script without an explicit name always map onto the same
/// session, which is what makes attach and restart work without bookkeeping.
pub fn session_name_for(request: &RunRequest, prefix: &str) -> String {
    match request.session_name() {
        Some(name) => name.to_string(),
        None => format!("{}-{}", prefix, request.script_name()),
    }
}

/// Drives one run request through readiness, sync and dispatch.
pub struct SessionDispatcher<'a> {
    target: TargetInfo,
    session_prefix: String,
    probe: &'a dyn ReadinessProbe,
    sync: &'a dyn ProjectSync,
    sessions: &'a dyn SessionLayer,
}

impl<'a> SessionDispatcher<'a> {
    pub fn new(
        target: TargetInfo,
        probe: &'a dyn ReadinessProbe,
        sync: &'a dyn ProjectSync,
        sessions: &'a dyn SessionLayer,
    ) -> Self {
        Self {
            target,
            session_prefix: DEFAULT_SESSION_PREFIX.to_string(),
            probe,
            sync,
            sessions,
        }
    }

    /// Override the prefix of derived session names
    pub fn with_session_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.session_prefix = prefix.into();
        self
    }

    /// Dispatch a rendered script. Returns once the session layer has
    /// acknowledged the directive; never waits for the script itself.
    pub fn dispatch(&self, request: &RunRequest, rendered_script: &str) -> Result<SessionOutcome> {
        if !self.probe.is_ready() {
            return Err(RunError::TargetNotRunning {
                target: self.target.name.clone(),
            });
        }

        if request.sync() {
            tracing::info!(target_name = %self.target.name, "syncing project");
            self.sync.sync().map_err(RunError::SyncFailed)?;
        }

        let session_name = session_name_for(request, &self.session_prefix);
        let directive = DispatchDirective {
            handle: SessionHandle {
                session_name,
                target: self.target.address.clone(),
                auth: self.target.auth.clone(),
                logging: request.logging(),
                restart: request.restart(),
                local_port: self.target.local_port,
            },
            script_name: request.script_name().to_string(),
            script_body: rendered_script.to_string(),
        };

        tracing::info!(
            session = %directive.handle.session_name,
            script = %directive.script_name,
            restart = directive.handle.restart,
            logging = directive.handle.logging,
            "dispatching script"
        );

        let outcome = self
            .sessions
            .dispatch(&directive)
            .map_err(RunError::DispatchFailed)?;

        tracing::info!(session = %directive.handle.session_name, %outcome, "dispatch acknowledged");
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::RunOptions;
    use std::cell::RefCell;
    use std::collections::BTreeMap;

    struct FixedProbe(bool);

    impl ReadinessProbe for FixedProbe {
        fn is_ready(&self) -> bool {
            self.0
        }
    }

    struct NoSync;

    impl ProjectSync for NoSync {
        fn sync(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct Recorder {
        directives: RefCell<Vec<DispatchDirective>>,
    }

    impl SessionLayer for Recorder {
        fn dispatch(&self, directive: &DispatchDirective) -> anyhow::Result<SessionOutcome> {
            self.directives.borrow_mut().push(directive.clone());
            Ok(SessionOutcome::Created)
        }
    }

    fn target() -> TargetInfo {
        TargetInfo {
            name: "gpu-box".to_string(),
            address: TargetAddress {
                host: "203.0.113.10".to_string(),
                port: 22,
                user: "ubuntu".to_string(),
            },
            auth: AuthRef::Agent,
            local_port: Some(2222),
        }
    }

    fn request(options: RunOptions) -> RunRequest {
        let mut scripts = BTreeMap::new();
        scripts.insert("train".to_string(), "python train.py".to_string());
        RunRequest::validate("train", &["lr=0.1"], options, &scripts).unwrap()
    }

    #[test]
    fn test_default_session_name() {
        let req = request(RunOptions::default());
        assert_eq!(session_name_for(&req, "rrun-script"), "rrun-script-train");
    }

    #[test]
    fn test_explicit_session_name() {
        let req = request(RunOptions {
            session_name: Some("exp-7".to_string()),
            ..RunOptions::default()
        });
        assert_eq!(session_name_for(&req, "rrun-script"), "exp-7");
    }

    #[test]
    fn test_directive_carries_handle_fields() {
        let probe = FixedProbe(true);
        let recorder = Recorder::default();
        let dispatcher = SessionDispatcher::new(target(), &probe, &NoSync, &recorder)
            .with_session_prefix("job");

        let req = request(RunOptions {
            logging: true,
            restart: true,
            ..RunOptions::default()
        });
        let outcome = dispatcher.dispatch(&req, "python train.py --lr 0.1").unwrap();
        assert!(outcome.started());

        let directives = recorder.directives.borrow();
        assert_eq!(directives.len(), 1);
        let d = &directives[0];
        assert_eq!(d.handle.session_name, "job-train");
        assert_eq!(d.handle.target.to_string(), "ubuntu@203.0.113.10:22");
        assert_eq!(d.handle.auth, AuthRef::Agent);
        assert!(d.handle.logging);
        assert!(d.handle.restart);
        assert_eq!(d.handle.local_port, Some(2222));
        assert_eq!(d.script_name, "train");
        assert_eq!(d.script_body, "python train.py --lr 0.1");
    }

    #[test]
    fn test_not_ready_short_circuits() {
        let probe = FixedProbe(false);
        let recorder = Recorder::default();
        let dispatcher = SessionDispatcher::new(target(), &probe, &NoSync, &recorder);

        let err = dispatcher
            .dispatch(&request(RunOptions::default()), "x")
            .unwrap_err();
        assert!(matches!(err, RunError::TargetNotRunning { ref target } if target == "gpu-box"));
        assert!(recorder.directives.borrow().is_empty());
    }

    #[test]
    fn test_outcome_strings() {
        assert_eq!(SessionOutcome::Created.to_string(), "created");
        assert_eq!("restarted".parse::<SessionOutcome>().unwrap(), SessionOutcome::Restarted);
        assert!(!SessionOutcome::Attached.started());
    }

    #[test]
    fn test_target_info_from_config() {
        let config = TargetConfig {
            name: None,
            host: "10.0.0.5".to_string(),
            port: 2200,
            user: "root".to_string(),
            key_path: Some(PathBuf::from("/keys/id")),
            local_ssh_port: None,
            connect_timeout_secs: 5,
        };
        let info = TargetInfo::from(&config);
        assert_eq!(info.name, "10.0.0.5");
        assert_eq!(info.address.port, 2200);
        assert_eq!(info.auth, AuthRef::KeyFile(PathBuf::from("/keys/id")));
        assert_eq!(info.local_port, None);
    }
}
