//! CLI command definitions

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Output format for command results
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable, colored when the terminal allows it
    Text,
    /// JSON output
    Json,
}

/// CLI arguments for overmind
#[derive(Parser, Debug)]
#[command(name = "overmind")]
#[command(author, version, about = "Mission orchestration with a planning council")]
#[command(long_about = r#"
Overmind turns a free-text objective into a mission: a council plans it,
tasks run as tool invocations in dependency order, and failures are
re-planned within a bounded adaptation budget.

Objectives are read as short commands separated by "then", ";" or line
breaks. Commas separate tasks that may run side by side:

  overmind run "read Cargo.toml, list src then echo done"

Configuration files are loaded from (later wins):
1. ~/.config/overmind/config.toml   Global config
2. ./overmind.toml                  Project-level config
3. --config <path>                  Explicit config file
4. OVERMIND_* environment variables (e.g. OVERMIND_RUNNER__WORKERS=4)

The status, events and cancel commands read a shared store and need
storage.backend = "sqlite".
"#)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Verbosity level (-v = info, -vv = debug, -vvv = trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value = "text")]
    pub output: OutputFormat,

    /// Show configuration file locations and exit
    #[arg(long)]
    pub show_config: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Start a mission and follow its progress
    Run {
        /// The mission objective
        objective: String,

        /// Who started the mission
        #[arg(long, value_name = "ID", default_value_t = 0)]
        initiator: i64,

        /// Wait for the outcome without streaming progress
        #[arg(long)]
        no_follow: bool,
    },

    /// Show a mission's status and task counts
    Status {
        #[arg(value_name = "MISSION_ID")]
        mission_id: i64,
    },

    /// Print a mission's event log
    Events {
        #[arg(value_name = "MISSION_ID")]
        mission_id: i64,
    },

    /// Cancel a mission
    Cancel {
        #[arg(value_name = "MISSION_ID")]
        mission_id: i64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run() {
        let cli = Cli::parse_from(["overmind", "-vv", "run", "echo hi", "--initiator", "7"]);
        assert_eq!(cli.verbose, 2);
        assert_eq!(
            cli.command,
            Some(Command::Run {
                objective: "echo hi".to_string(),
                initiator: 7,
                no_follow: false,
            })
        );
        assert_eq!(cli.output, OutputFormat::Text);
    }

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["overmind", "status", "3", "--output", "json", "--config", "x.toml"]);
        assert_eq!(cli.command, Some(Command::Status { mission_id: 3 }));
        assert_eq!(cli.output, OutputFormat::Json);
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));
    }

    #[test]
    fn test_show_config_without_command() {
        let cli = Cli::parse_from(["overmind", "--show-config"]);
        assert!(cli.show_config);
        assert!(cli.command.is_none());
    }
}
