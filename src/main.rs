//! rrun - main entry point

use rrun::cli::{Cli, Commands};
use rrun::config_file::ProjectConfig;
use rrun::error::RunError;
use rrun::process_guard;
use rrun::script_runner::{RunArgs, RunReport, ScriptRunner, render_script};
use rrun::{ScriptCatalog, SessionOutcome};
use std::path::Path;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Initialize tracing. `RUST_LOG` wins over the `-v` level when set.
fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(path: &Path) -> Result<ProjectConfig, RunError> {
    let config = ProjectConfig::load_from_file(path)
        .and_then(|config| config.validate().map(|_| config))
        .map_err(|e| RunError::config(format!("{:#}", e)))?;
    tracing::debug!(path = %path.display(), scripts = config.scripts.len(), "configuration loaded");
    Ok(config)
}

fn print_report(report: &RunReport) {
    match report.outcome {
        SessionOutcome::Created => println!(
            "✓ Script \"{}\" started in session \"{}\"",
            report.script_name, report.session_name
        ),
        SessionOutcome::Restarted => println!(
            "✓ Script \"{}\" restarted in session \"{}\"",
            report.script_name, report.session_name
        ),
        SessionOutcome::Attached => println!(
            "• Session \"{}\" is already running; use --restart to start the script again",
            report.session_name
        ),
    }
    if let Some(ref log_path) = report.log_path {
        println!("  Output is logged to {} on the target", log_path);
    }
}

fn run(cli: Cli) -> Result<(), RunError> {
    match cli.command {
        Commands::Run(cmd) => {
            let config = load_config(&cli.config)?;
            let args = RunArgs::from(cmd);
            tracing::info!(script = %args.script_name, "running script");

            let runner = ScriptRunner::new(config).with_dry_run(cli.dry_run);
            let report = runner.run(&args)?;
            print_report(&report);
        }
        Commands::Render {
            script_name,
            params,
        } => {
            let config = load_config(&cli.config)?;
            let rendered = render_script(&config, &script_name, &params.parameters, params.strict)?;
            print!("{}", rendered);
        }
        Commands::List => {
            let config = load_config(&cli.config)?;
            for name in config.script_names() {
                println!("{}", name);
            }
        }
        Commands::Validate => {
            let config = load_config(&cli.config)?;
            println!(
                "✓ Configuration file is valid: {} script(s), target {}",
                config.scripts.len(),
                config.target.display_name()
            );
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse_args();
    init_logging(cli.log_level());

    // Interrupting a sync must take rsync and its ssh down with us
    if let Err(e) = process_guard::init_signal_handlers() {
        tracing::warn!(error = %e, "failed to initialize signal handlers");
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("✗ {}", e);
            tracing::debug!(exit_code = e.exit_code(), "exiting after error");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}
