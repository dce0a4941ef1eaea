//! CLI command definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// CLI arguments for toolguard
#[derive(Parser, Debug)]
#[command(name = "toolguard")]
#[command(author, version, about = "Resilient remote tool invocation with local fallback")]
#[command(long_about = r#"
toolguard calls tools on a remote JSON-RPC tool service and keeps answering
when that service is down:

1. Calls go to the remote service with retries, caching and circuit breakers
2. After repeated failures, supported tools are served from the local store
3. The remote service is re-probed and traffic returns to it once it recovers

Configuration files are loaded from (in priority order):
1. TOOLGUARD_<SECTION>__<KEY>   Environment variables
2. --config <path>              Explicit config file
3. ./toolguard.toml             Project-level config
4. ~/.config/toolguard/config.toml   Global config

Example:
  toolguard call list_products
  toolguard call search_customers --params '{"name_pattern": "ann", "limit": 5}'
  toolguard batch calls.json --stop-on-error
  toolguard status
"#)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Verbosity level (-v = info, -vv = debug, -vvv = trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Disable loading of configuration files
    #[arg(long, global = true)]
    pub no_config: bool,

    /// Show configuration file locations and exit
    #[arg(long)]
    pub show_config: bool,

    /// Also write logs to this file
    #[arg(long, value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Execute one tool and print the result as JSON
    Call {
        /// Tool name (e.g. search_customers)
        tool: String,

        /// Tool parameters as a JSON object
        #[arg(short, long, value_name = "JSON")]
        params: Option<String>,
    },

    /// Execute the calls listed in a JSON file
    ///
    /// The file holds `[{"tool_name": "...", "parameters": {...}}, ...]`.
    Batch {
        file: PathBuf,

        /// Run calls one after another instead of concurrently
        #[arg(long)]
        sequential: bool,

        /// Skip the remaining calls after the first failure
        #[arg(long)]
        stop_on_error: bool,
    },

    /// Print mode, metrics, breakers and monitor state
    Status,

    /// Print the tools advertised by the remote service
    Tools,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_call() {
        let cli = Cli::parse_from([
            "toolguard",
            "-vv",
            "call",
            "search_customers",
            "--params",
            r#"{"limit": 5}"#,
        ]);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Some(Command::Call { tool, params }) => {
                assert_eq!(tool, "search_customers");
                assert_eq!(params.as_deref(), Some(r#"{"limit": 5}"#));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_batch_flags() {
        let cli = Cli::parse_from([
            "toolguard",
            "batch",
            "calls.json",
            "--sequential",
            "--stop-on-error",
            "--no-config",
        ]);
        assert!(cli.no_config);
        assert!(matches!(
            cli.command,
            Some(Command::Batch { sequential: true, stop_on_error: true, .. })
        ));
    }

    #[test]
    fn test_show_config_without_command() {
        let cli = Cli::parse_from(["toolguard", "--show-config"]);
        assert!(cli.show_config);
        assert!(cli.command.is_none());
    }
}
