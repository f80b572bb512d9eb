//! Process configuration and command line.
//!
//! Everything can come from the environment, which is how the service runs
//! in a container; every variable also has a flag for local use.
//!
//! | Variable | Flag | Meaning |
//! |---|---|---|
//! | `DATABASE_DRIVER` | `--driver` | `memory` or `sqlite3` (required) |
//! | `DATABASE_PATH` | `--database-path` | SQLite file, required for `sqlite3` |
//! | `OPERATOR_TOKEN` | `--operator-token` | bearer token for operator-only routes |
//! | `LISTEN_ADDR` | `--addr` | listen address, default `0.0.0.0:80` |

use std::net::SocketAddr;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use thiserror::Error;

use crate::store::{MemoryStore, SqliteStore, Store, StoreError};

#[derive(Debug, Parser)]
#[command(name = "moc", about = "A service that serves a RESTful message operation center")]
pub struct Cli {
    #[command(flatten)]
    pub config: Config,

    /// Migrate the database before serving.
    #[arg(short, long, global = true)]
    pub migrate: bool,

    /// Seed the database before serving.
    #[arg(short, long, global = true)]
    pub seed: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Serve the API (the default).
    Serve,
    /// Create or upgrade the schema, then exit.
    Migrate,
    /// Insert a test message, then exit.
    Seed,
}

impl Cli {
    pub fn command(&self) -> Command {
        self.command.unwrap_or(Command::Serve)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Driver {
    Memory,
    Sqlite3,
}

#[derive(Debug, Clone, Args)]
pub struct Config {
    #[arg(long, env = "DATABASE_DRIVER", value_enum)]
    pub driver: Driver,

    #[arg(long, env = "DATABASE_PATH")]
    pub database_path: Option<String>,

    #[arg(long, env = "OPERATOR_TOKEN", default_value = "", hide_env_values = true)]
    pub operator_token: String,

    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:80")]
    pub addr: SocketAddr,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("DATABASE_PATH is required for the {0:?} driver")]
    MissingPath(Driver),
}

impl Config {
    /// Cross-field checks clap cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match (self.driver, self.database_path.as_deref()) {
            (Driver::Sqlite3, None | Some("")) => Err(ConfigError::MissingPath(Driver::Sqlite3)),
            _ => Ok(()),
        }
    }

    /// Opens the configured store. Does not migrate.
    pub fn open_store(&self) -> Result<Arc<dyn Store>, StoreError> {
        match (self.driver, self.database_path.as_deref()) {
            (Driver::Sqlite3, Some(path)) => Ok(Arc::new(SqliteStore::open(path)?)),
            (Driver::Sqlite3, None) => Ok(Arc::new(SqliteStore::open_in_memory()?)),
            (Driver::Memory, _) => Ok(Arc::new(MemoryStore::new())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("moc").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn defaults_to_serve() {
        let cli = parse(&["--driver", "memory"]);
        assert_eq!(cli.command(), Command::Serve);
        assert!(!cli.migrate && !cli.seed);
        assert_eq!(cli.config.addr, "0.0.0.0:80".parse().unwrap());
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = parse(&["--driver", "sqlite3", "--database-path", "moc.db", "serve", "-m", "-s"]);
        assert_eq!(cli.command(), Command::Serve);
        assert!(cli.migrate && cli.seed);
        assert!(cli.config.validate().is_ok());
    }

    #[test]
    fn sqlite_needs_a_path() {
        let cli = parse(&["--driver", "sqlite3", "migrate"]);
        assert_eq!(cli.config.validate(), Err(ConfigError::MissingPath(Driver::Sqlite3)));
    }

    #[test]
    fn unknown_driver_is_rejected() {
        assert!(Cli::try_parse_from(["moc", "--driver", "mysql"]).is_err());
    }

    #[test]
    fn memory_store_opens() {
        let cli = parse(&["--driver", "memory"]);
        assert!(cli.config.open_store().is_ok());
    }
}
