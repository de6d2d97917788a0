//! rrun library
//!
//! Runs named script templates from a project configuration inside named,
//! detachable tmux sessions on a remote host.
//!
//! The pipeline is `request` (validate) -> `template` (render) ->
//! `dispatcher` (readiness, sync, session directive). Collaborators sit behind
//! the traits in `dispatcher`; `probe`, `sync` and `transport` provide the
//! concrete TCP, rsync and ssh+tmux implementations.

pub mod cli;
pub mod config_file;
pub mod dispatcher;
pub mod error;
pub mod probe;
pub mod process_guard;
pub mod request;
pub mod sanity;
pub mod script_runner;
pub mod sync;
pub mod template;
pub mod transport;

pub use config_file::{ProjectConfig, ScriptCatalog};
pub use dispatcher::{
    AuthRef, DispatchDirective, ProjectSync, ReadinessProbe, SessionDispatcher, SessionHandle,
    SessionLayer, SessionOutcome, TargetAddress, TargetInfo,
};
pub use error::RunError;
pub use request::{ParameterSet, RunOptions, RunRequest};
pub use script_runner::{
    PreparedRun, RunArgs, RunReport, ScriptRunner, dispatch_prepared, prepare_run, render_script,
    run_pipeline,
};
pub use template::{MissingPolicy, Renderer};
