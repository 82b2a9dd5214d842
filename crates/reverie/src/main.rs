// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reverie - long-term conversational memory.
//!
//! Operator CLI over a Reverie database.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod commands;
mod doctor;

use clap::{Parser, Subcommand};

/// Reverie - long-term conversational memory.
#[derive(Parser, Debug)]
#[command(name = "reverie", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Check configuration, database, and embedding model.
    Doctor {
        /// Disable colored output.
        #[arg(long)]
        plain: bool,
    },
    /// Print the context block retrieved for a query.
    Recall {
        /// Session the query belongs to; its own turns are not excerpted.
        #[arg(long)]
        session: String,
        /// The user turn to retrieve context for.
        query: String,
    },
    /// List stored memories, newest first.
    Memories {
        /// Only show memories formed in this session.
        #[arg(long)]
        session: Option<String>,
        /// Maximum number of memories to show.
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// List sessions, most recently active first.
    Sessions {
        /// Maximum number of sessions to show.
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match reverie_config::load_and_validate() {
        Ok(config) => config,
        Err(errors) => {
            reverie_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    init_tracing(&config.agent.log_level);

    let result = match cli.command {
        Some(Commands::Doctor { plain }) => doctor::run_doctor(&config, plain).await,
        Some(Commands::Recall { session, query }) => {
            commands::run_recall(&config, &session, &query).await
        }
        Some(Commands::Memories { session, limit }) => {
            commands::run_memories(&config, session.as_deref(), limit).await
        }
        Some(Commands::Sessions { limit }) => commands::run_sessions(&config, limit).await,
        None => {
            println!("reverie: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

/// Initializes the tracing subscriber with the given log level.
///
/// Logs go to stderr so command output on stdout stays clean.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("reverie={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    #[cfg(not(target_env = "msvc"))]
    fn jemalloc_is_active() {
        use tikv_jemalloc_ctl::{epoch, stats};
        epoch::advance().unwrap();
        let allocated = stats::allocated::read().unwrap();
        assert!(allocated > 0, "jemalloc should report non-zero allocation");
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn recall_requires_session() {
        assert!(Cli::try_parse_from(["reverie", "recall", "what do I like?"]).is_err());
        let cli = Cli::try_parse_from(["reverie", "recall", "--session", "s1", "what do I like?"])
            .unwrap();
        match cli.command {
            Some(Commands::Recall { session, query }) => {
                assert_eq!(session, "s1");
                assert_eq!(query, "what do I like?");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn memories_defaults() {
        let cli = Cli::try_parse_from(["reverie", "memories"]).unwrap();
        match cli.command {
            Some(Commands::Memories { session, limit }) => {
                assert!(session.is_none());
                assert_eq!(limit, 20);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
