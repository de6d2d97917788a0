//! End-to-end pipeline tests
//!
//! Loads a project file from a temporary directory and drives
//! `run_pipeline` against in-memory collaborators. The session layer keeps a
//! table of live sessions so create/attach/restart behave like tmux would.

use rrun::config_file::ProjectConfig;
use rrun::dispatcher::{
    DispatchDirective, ProjectSync, ReadinessProbe, SessionLayer, SessionOutcome,
};
use rrun::error::RunError;
use rrun::request::RunOptions;
use rrun::script_runner::{RunArgs, render_script, run_pipeline};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fs;
use tempfile::TempDir;

const PROJECT_JSON: &str = r#"{
  "target": {
    "name": "gpu-box",
    "host": "203.0.113.10",
    "user": "ubuntu"
  },
  "sync": {
    "local_dir": ".",
    "remote_dir": "project",
    "exclude": [".git", "target"]
  },
  "session": {
    "log_dir": "logs"
  },
  "scripts": {
    "train": "cd project\npython train.py --lr {{lr}} --epochs {{{ epochs }}}\n",
    "hello": "echo hello {{name}}"
  }
}"#;

fn load_project() -> (TempDir, ProjectConfig) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("rrun.json");
    fs::write(&path, PROJECT_JSON).unwrap();
    let config = ProjectConfig::load_from_file(&path).unwrap();
    config.validate().unwrap();
    (dir, config)
}

struct FixedProbe {
    ready: bool,
    calls: Cell<usize>,
}

impl FixedProbe {
    fn ready() -> Self {
        Self {
            ready: true,
            calls: Cell::new(0),
        }
    }

    fn down() -> Self {
        Self {
            ready: false,
            calls: Cell::new(0),
        }
    }
}

impl ReadinessProbe for FixedProbe {
    fn is_ready(&self) -> bool {
        self.calls.set(self.calls.get() + 1);
        self.ready
    }
}

#[derive(Default)]
struct CountingSync {
    calls: Cell<usize>,
}

impl ProjectSync for CountingSync {
    fn sync(&self) -> anyhow::Result<()> {
        self.calls.set(self.calls.get() + 1);
        Ok(())
    }
}

/// Session table standing in for tmux on the target
#[derive(Default)]
struct FakeTmux {
    sessions: RefCell<BTreeMap<String, String>>,
    launches: Cell<usize>,
}

impl SessionLayer for FakeTmux {
    fn dispatch(&self, directive: &DispatchDirective) -> anyhow::Result<SessionOutcome> {
        let name = directive.handle.session_name.clone();
        let mut sessions = self.sessions.borrow_mut();

        if directive.handle.restart {
            sessions.insert(name, directive.script_body.clone());
            self.launches.set(self.launches.get() + 1);
            return Ok(SessionOutcome::Restarted);
        }
        if sessions.contains_key(&name) {
            return Ok(SessionOutcome::Attached);
        }
        sessions.insert(name, directive.script_body.clone());
        self.launches.set(self.launches.get() + 1);
        Ok(SessionOutcome::Created)
    }
}

fn args(script: &str, params: &[&str], options: RunOptions) -> RunArgs {
    RunArgs {
        script_name: script.to_string(),
        params: params.iter().map(|p| p.to_string()).collect(),
        options,
        ..RunArgs::default()
    }
}

#[test]
fn test_run_renders_and_creates_session() {
    let (_dir, config) = load_project();
    let probe = FixedProbe::ready();
    let sync = CountingSync::default();
    let tmux = FakeTmux::default();

    let report = run_pipeline(
        &config,
        &args("train", &["lr=0.01", "epochs=5"], RunOptions::default()),
        &probe,
        &sync,
        &tmux,
    )
    .unwrap();

    assert_eq!(report.script_name, "train");
    assert_eq!(report.session_name, "rrun-script-train");
    assert_eq!(report.outcome, SessionOutcome::Created);
    assert_eq!(report.log_path, None);
    assert_eq!(sync.calls.get(), 0);
    assert_eq!(
        tmux.sessions.borrow().get("rrun-script-train").map(String::as_str),
        Some("cd project\npython train.py --lr 0.01 --epochs 5\n")
    );
}

#[test]
fn test_second_run_attaches_then_restart_relaunches() {
    let (_dir, config) = load_project();
    let probe = FixedProbe::ready();
    let sync = CountingSync::default();
    let tmux = FakeTmux::default();

    let first = run_pipeline(&config, &args("hello", &["name=a"], RunOptions::default()), &probe, &sync, &tmux)
        .unwrap();
    let second = run_pipeline(&config, &args("hello", &["name=b"], RunOptions::default()), &probe, &sync, &tmux)
        .unwrap();

    assert_eq!(first.outcome, SessionOutcome::Created);
    assert_eq!(second.outcome, SessionOutcome::Attached);
    assert_eq!(first.session_name, second.session_name);
    assert_eq!(tmux.launches.get(), 1);
    // The running session keeps the script it was started with
    assert_eq!(
        tmux.sessions.borrow().get("rrun-script-hello").map(String::as_str),
        Some("echo hello a")
    );

    let restart = RunOptions {
        restart: true,
        ..RunOptions::default()
    };
    let third = run_pipeline(&config, &args("hello", &["name=c"], restart), &probe, &sync, &tmux).unwrap();
    assert_eq!(third.outcome, SessionOutcome::Restarted);
    assert_eq!(tmux.launches.get(), 2);
    assert_eq!(
        tmux.sessions.borrow().get("rrun-script-hello").map(String::as_str),
        Some("echo hello c")
    );
}

#[test]
fn test_sync_and_logging_options() {
    let (_dir, config) = load_project();
    let probe = FixedProbe::ready();
    let sync = CountingSync::default();
    let tmux = FakeTmux::default();

    let options = RunOptions {
        session_name: Some("exp-1".to_string()),
        sync: true,
        logging: true,
        restart: false,
    };
    let report = run_pipeline(&config, &args("hello", &["name=x"], options), &probe, &sync, &tmux).unwrap();

    assert_eq!(sync.calls.get(), 1);
    assert_eq!(report.session_name, "exp-1");
    assert_eq!(report.log_path.as_deref(), Some("logs/exp-1.log"));
}

#[test]
fn test_validation_errors_never_reach_the_target() {
    let (_dir, config) = load_project();
    let cases: Vec<(RunArgs, i32)> = vec![
        (args("deploy", &[], RunOptions::default()), 12),
        (args("hello", &["name"], RunOptions::default()), 10),
        (args("hello", &["name=a", "name=b"], RunOptions::default()), 11),
        (
            args(
                "hello",
                &["name=a"],
                RunOptions {
                    session_name: Some("bad name".to_string()),
                    ..RunOptions::default()
                },
            ),
            13,
        ),
    ];

    for (run_args, code) in cases {
        let probe = FixedProbe::ready();
        let sync = CountingSync::default();
        let tmux = FakeTmux::default();

        let err = run_pipeline(&config, &run_args, &probe, &sync, &tmux).unwrap_err();
        assert_eq!(err.exit_code(), code, "unexpected error: {}", err);
        assert_eq!(probe.calls.get(), 0);
        assert_eq!(sync.calls.get(), 0);
        assert_eq!(tmux.launches.get(), 0);
    }
}

#[test]
fn test_strict_rendering_fails_before_probe() {
    let (_dir, config) = load_project();
    let probe = FixedProbe::ready();
    let sync = CountingSync::default();
    let tmux = FakeTmux::default();

    let run_args = RunArgs {
        strict: true,
        ..args("train", &["lr=0.1"], RunOptions::default())
    };
    let err = run_pipeline(&config, &run_args, &probe, &sync, &tmux).unwrap_err();

    assert!(matches!(err, RunError::MissingParameter { ref name, .. } if name == "epochs"));
    assert_eq!(probe.calls.get(), 0);
}

#[test]
fn test_target_down_reports_display_name() {
    let (_dir, config) = load_project();
    let probe = FixedProbe::down();
    let sync = CountingSync::default();
    let tmux = FakeTmux::default();

    let options = RunOptions {
        sync: true,
        ..RunOptions::default()
    };
    let err = run_pipeline(&config, &args("hello", &["name=a"], options), &probe, &sync, &tmux).unwrap_err();

    assert!(err.to_string().contains("gpu-box"));
    assert_eq!(sync.calls.get(), 0);
    assert_eq!(tmux.launches.get(), 0);
}

#[test]
fn test_render_from_loaded_file() {
    let (_dir, config) = load_project();
    let out = render_script(&config, "hello", &["name=world".to_string()], false).unwrap();
    assert_eq!(out, "echo hello world");
}

#[test]
fn test_save_and_reload_keeps_scripts() {
    let (dir, config) = load_project();
    let copy = dir.path().join("copy.json");
    config.save_to_file(&copy).unwrap();

    let reloaded = ProjectConfig::load_from_file(&copy).unwrap();
    assert_eq!(reloaded.scripts, config.scripts);
    assert_eq!(reloaded.target, config.target);
    assert_eq!(reloaded.session.log_dir, "logs");
    assert_eq!(reloaded.session.prefix, "rrun-script");
}
