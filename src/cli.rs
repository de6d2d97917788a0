use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config_file::DEFAULT_CONFIG_FILE;
use crate::request::RunOptions;
use crate::script_runner::RunArgs;

/// rrun - run configured scripts in tmux sessions on a remote host
#[derive(Parser, Debug)]
#[command(name = "rrun")]
#[command(about = "Run script templates from the project configuration inside remote tmux sessions")]
#[command(version)]
pub struct Cli {
    /// Path to the project configuration file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Print the ssh/rsync commands instead of running them.
    ///
    /// The readiness probe still runs so the preview reflects whether the
    /// target is up.
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a script from the configuration file on the target
    Run(RunCommand),
    /// Print a rendered script without contacting the target
    Render {
        /// Script name
        script_name: String,
        #[command(flatten)]
        params: ParamArgs,
    },
    /// List the scripts defined in the configuration file
    List,
    /// Validate the configuration file
    Validate,
}

/// Script parameters shared by `run` and `render`
#[derive(Args, Debug, Clone, Default)]
pub struct ParamArgs {
    /// Script parameters
    #[arg(short, long = "parameters", value_name = "PARAMETER=VALUE", num_args = 0..)]
    pub parameters: Vec<String>,

    /// Fail when the template references a parameter that was not given
    #[arg(long)]
    pub strict: bool,
}

#[derive(Args, Debug, Clone)]
pub struct RunCommand {
    /// Script name
    pub script_name: String,

    #[command(flatten)]
    pub params: ParamArgs,

    /// tmux session name (default: <prefix>-<script name>)
    #[arg(short, long)]
    pub session_name: Option<String>,

    /// Sync the project before running the script
    #[arg(short = 'S', long)]
    pub sync: bool,

    /// Log the script output to a file on the target
    #[arg(short, long)]
    pub logging: bool,

    /// Restart the script (kills the previous session if it exists)
    #[arg(short, long)]
    pub restart: bool,

    /// Attach to the session after starting it
    #[arg(long)]
    pub attach: bool,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Default tracing filter for the requested verbosity
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

impl From<RunCommand> for RunArgs {
    fn from(cmd: RunCommand) -> Self {
        Self {
            script_name: cmd.script_name,
            params: cmd.params.parameters,
            options: RunOptions {
                session_name: cmd.session_name,
                sync: cmd.sync,
                logging: cmd.logging,
                restart: cmd.restart,
            },
            strict: cmd.params.strict,
            attach: cmd.attach,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_with_all_flags() {
        let cli = Cli::try_parse_from([
            "rrun", "run", "train", "-p", "lr=0.1", "epochs=3", "-s", "exp-1", "-S", "-l", "-r",
        ])
        .unwrap();

        let Commands::Run(cmd) = cli.command else {
            panic!("expected run command");
        };
        let args = RunArgs::from(cmd);
        assert_eq!(args.script_name, "train");
        assert_eq!(args.params, vec!["lr=0.1", "epochs=3"]);
        assert_eq!(args.options.session_name.as_deref(), Some("exp-1"));
        assert!(args.options.sync);
        assert!(args.options.logging);
        assert!(args.options.restart);
        assert!(!args.attach);
        assert!(!args.strict);
    }

    #[test]
    fn test_parse_run_defaults() {
        let cli = Cli::try_parse_from(["rrun", "run", "train"]).unwrap();
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_FILE));
        assert!(!cli.dry_run);
        assert_eq!(cli.log_level(), "warn");

        let Commands::Run(cmd) = cli.command else {
            panic!("expected run command");
        };
        assert!(cmd.params.parameters.is_empty());
        assert!(cmd.session_name.is_none());
        assert!(!cmd.sync && !cmd.logging && !cmd.restart);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["rrun", "list", "--config", "other.json", "-vv", "--dry-run"])
            .unwrap();
        assert_eq!(cli.config, PathBuf::from("other.json"));
        assert!(cli.dry_run);
        assert_eq!(cli.log_level(), "debug");
        assert!(matches!(cli.command, Commands::List));
    }

    #[test]
    fn test_parse_render_strict() {
        let cli = Cli::try_parse_from(["rrun", "render", "train", "--strict", "-p", "a=1"]).unwrap();
        match cli.command {
            Commands::Render { script_name, params } => {
                assert_eq!(script_name, "train");
                assert!(params.strict);
                assert_eq!(params.parameters, vec!["a=1"]);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_script_name_required() {
        assert!(Cli::try_parse_from(["rrun", "run"]).is_err());
    }
}
