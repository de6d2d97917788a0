//! Script execution entry point
//!
//! Every run goes validate -> render -> dispatch, in that order.
//! [`prepare_run`] covers the first two steps and [`dispatch_prepared`] the
//! last; [`run_pipeline`] chains them. The binary goes through
//! [`ScriptRunner`], which checks the local environment between the two and
//! plugs in the TCP probe, rsync and the tmux session layer. Tests plug in
//! stubs.

use crate::config_file::{ProjectConfig, ScriptCatalog};
use crate::dispatcher::{
    ProjectSync, ReadinessProbe, SessionDispatcher, SessionHandle, SessionLayer, SessionOutcome,
    TargetInfo, session_name_for,
};
use crate::error::{Result, RunError};
use crate::probe::TcpReadinessProbe;
use crate::request::{RunOptions, RunRequest};
use crate::sanity;
use crate::sync::RsyncProjectSync;
use crate::template::{MissingPolicy, Renderer};
use crate::transport::TmuxSessionLayer;
use crate::transport::tmux::RemoteLayout;

/// Inputs of one `run` invocation
#[derive(Debug, Clone, Default)]
pub struct RunArgs {
    pub script_name: String,
    /// Raw `NAME=VALUE` tokens
    pub params: Vec<String>,
    pub options: RunOptions,
    /// Fail on placeholders without a parameter instead of rendering them empty
    pub strict: bool,
    /// Attach the terminal to the session after dispatch
    pub attach: bool,
}

/// What a successful run did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub script_name: String,
    pub session_name: String,
    pub outcome: SessionOutcome,
    /// Remote log file, when logging was requested
    pub log_path: Option<String>,
}

/// A validated request together with its rendered script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedRun {
    pub request: RunRequest,
    pub script: String,
}

/// Validate and render. Never touches the target.
pub fn prepare_run<C: ScriptCatalog + ?Sized>(
    catalog: &C,
    script_name: &str,
    raw_params: &[String],
    options: RunOptions,
    strict: bool,
) -> Result<PreparedRun> {
    let request = RunRequest::validate(script_name, raw_params, options, catalog)?;
    let template = catalog
        .script(request.script_name())
        .ok_or_else(|| RunError::UnknownScript {
            name: script_name.to_string(),
            available: catalog.script_names(),
        })?;
    let policy = if strict { MissingPolicy::Fail } else { MissingPolicy::Empty };
    let script = Renderer::with_policy(policy).render(request.script_name(), template, request.params())?;
    Ok(PreparedRun { request, script })
}

/// Validate and render without touching the target.
pub fn render_script<C: ScriptCatalog + ?Sized>(
    catalog: &C,
    script_name: &str,
    raw_params: &[String],
    strict: bool,
) -> Result<String> {
    prepare_run(catalog, script_name, raw_params, RunOptions::default(), strict).map(|p| p.script)
}

/// Dispatch an already prepared run against the given collaborators.
pub fn dispatch_prepared(
    config: &ProjectConfig,
    prepared: &PreparedRun,
    probe: &dyn ReadinessProbe,
    sync: &dyn ProjectSync,
    sessions: &dyn SessionLayer,
) -> Result<RunReport> {
    let request = &prepared.request;
    let dispatcher = SessionDispatcher::new(TargetInfo::from(&config.target), probe, sync, sessions)
        .with_session_prefix(config.session.prefix.clone());
    let outcome = dispatcher.dispatch(request, &prepared.script)?;

    let session_name = session_name_for(request, &config.session.prefix);
    let log_path = request
        .logging()
        .then(|| RemoteLayout::from(&config.session).log_path(&session_name));

    Ok(RunReport {
        script_name: request.script_name().to_string(),
        session_name,
        outcome,
        log_path,
    })
}

/// Run the full pipeline against the given collaborators.
pub fn run_pipeline(
    config: &ProjectConfig,
    args: &RunArgs,
    probe: &dyn ReadinessProbe,
    sync: &dyn ProjectSync,
    sessions: &dyn SessionLayer,
) -> Result<RunReport> {
    let prepared = prepare_run(
        config,
        &args.script_name,
        &args.params,
        args.options.clone(),
        args.strict,
    )?;
    dispatch_prepared(config, &prepared, probe, sync, sessions)
}

/// Runs scripts from a loaded project configuration.
pub struct ScriptRunner {
    config: ProjectConfig,
    dry_run: bool,
}

impl ScriptRunner {
    pub fn new(config: ProjectConfig) -> Self {
        Self {
            config,
            dry_run: false,
        }
    }

    /// Print SSH and rsync commands instead of running them
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    fn session_layer(&self) -> TmuxSessionLayer {
        TmuxSessionLayer::new(RemoteLayout::from(&self.config.session))
            .with_connect_timeout(self.config.target.connect_timeout_secs)
            .with_dry_run(self.dry_run)
    }

    /// Run `args` against the configured target.
    ///
    /// Input errors are reported before the local environment is checked.
    pub fn run(&self, args: &RunArgs) -> Result<RunReport> {
        let prepared = prepare_run(
            &self.config,
            &args.script_name,
            &args.params,
            args.options.clone(),
            args.strict,
        )?;

        if !self.dry_run {
            sanity::run_preflight_checks(args.options.sync)?;
        }

        let target = TargetInfo::from(&self.config.target);
        let probe = TcpReadinessProbe::for_target(&self.config.target);
        let sync = RsyncProjectSync::for_target(&self.config.sync, &target, self.dry_run);
        let sessions = self.session_layer();

        let report = dispatch_prepared(&self.config, &prepared, &probe, &sync, &sessions)?;

        if args.attach {
            let handle = SessionHandle {
                session_name: report.session_name.clone(),
                target: target.address,
                auth: target.auth,
                logging: args.options.logging,
                restart: false,
                local_port: target.local_port,
            };
            sessions.attach(&handle).map_err(RunError::DispatchFailed)?;
        }

        Ok(report)
    }
}
