// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Courier - multi-channel notification delivery engine.
//!
//! This is the binary entry point: `serve` runs the delivery workers, the
//! remaining subcommands inspect and administer individual requests.

mod admin;
mod providers;
mod serve;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Courier - multi-channel notification delivery engine.
#[derive(Parser, Debug)]
#[command(name = "courier", version, about, long_about = None)]
struct Cli {
    /// Explicit configuration file instead of the standard search path.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run delivery workers until SIGINT or SIGTERM.
    Serve,
    /// Print a request's status and attempt chain as JSON.
    Status {
        /// Request id.
        id: String,
    },
    /// Make a failed or pending request immediately claimable again.
    Requeue {
        /// Request id.
        id: String,
        #[arg(long)]
        reason: String,
        /// Actor recorded in the audit trail.
        #[arg(long, default_value = "cli")]
        actor: String,
    },
    /// Abort a pending request, or a failed one with retries remaining.
    Abort {
        /// Request id.
        id: String,
        #[arg(long)]
        reason: String,
        /// Actor recorded in the audit trail.
        #[arg(long, default_value = "cli")]
        actor: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => courier_config::load_and_validate_path(path),
        None => courier_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            courier_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Some(Commands::Serve) => serve::run_serve(config).await,
        Some(Commands::Status { id }) => admin::run_status(&config, &id).await,
        Some(Commands::Requeue { id, reason, actor }) => {
            admin::run_requeue(&config, &id, &reason, &actor).await
        }
        Some(Commands::Abort { id, reason, actor }) => {
            admin::run_abort(&config, &id, &reason, &actor).await
        }
        None => {
            println!("courier: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("courier: {e}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_admin_subcommands() {
        let cli = Cli::parse_from(["courier", "requeue", "r-1", "--reason", "vendor fixed"]);
        match cli.command {
            Some(Commands::Requeue { id, reason, actor }) => {
                assert_eq!(id, "r-1");
                assert_eq!(reason, "vendor fixed");
                assert_eq!(actor, "cli");
            }
            other => panic!("unexpected command: {other:?}"),
        }

        let cli = Cli::parse_from(["courier", "--config", "/tmp/c.toml", "status", "r-2"]);
        assert_eq!(cli.config.as_deref(), Some(std::path::Path::new("/tmp/c.toml")));
        assert!(matches!(cli.command, Some(Commands::Status { ref id }) if id == "r-2"));
    }

    #[test]
    fn abort_requires_reason() {
        assert!(Cli::try_parse_from(["courier", "abort", "r-1"]).is_err());
    }

    #[test]
    fn binary_loads_config_defaults() {
        let config = courier_config::load_and_validate_str("")
            .expect("default config should be valid");
        assert_eq!(config.engine.name, "courier");
    }
}
