//! CLI argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "minglog", version, about = "Inspect and repair the MingLog link graph")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Scan the link graph and print a consistency report.
    Check,
    /// Auto-fix issues from a fresh check (all auto-fixable ones when no ids are given).
    Fix {
        issue_ids: Vec<String>,
    },
    /// Print link statistics.
    Stats,
    /// Parse references in `text` as if authored in `module:id`.
    Parse {
        module: String,
        id: String,
        text: String,
        /// Only report references; do not create edges.
        #[arg(long)]
        dry_run: bool,
    },
    /// Run the sync orchestrator until Ctrl-C.
    Watch,
    /// Print the loaded configuration as TOML.
    Config {
        /// Write it to this file instead.
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::{Cli, Command};
    use clap::Parser;

    #[test]
    fn parses_fix_with_ids() {
        let cli = Cli::parse_from(["minglog", "fix", "broken-link:a", "missing-mirror:b"]);
        match cli.command {
            Command::Fix { issue_ids } => assert_eq!(issue_ids.len(), 2),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_parse_dry_run() {
        let cli = Cli::parse_from(["minglog", "parse", "notes", "n1", "[[task:1]]", "--dry-run"]);
        assert!(matches!(
            cli.command,
            Command::Parse { dry_run: true, ref module, .. } if module == "notes"
        ));
    }

    #[test]
    fn parses_config_output() {
        let cli = Cli::parse_from(["minglog", "config", "--output", "/tmp/minglog.toml"]);
        match cli.command {
            Command::Config { output } => {
                assert_eq!(output.as_deref(), Some(std::path::Path::new("/tmp/minglog.toml")));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
