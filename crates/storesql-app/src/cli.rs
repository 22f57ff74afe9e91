//! CLI argument definitions and chat-loop commands.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::Parser;
use std::path::PathBuf;

use storesql_core::config::StoreSqlConfig;
use storesql_core::types::Strategy;

/// storesql: ask questions about a store's data in plain language.
#[derive(Parser, Debug)]
#[command(name = "storesql", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// SQLite database file.
    #[arg(short = 'd', long = "db")]
    pub db: Option<PathBuf>,

    /// CSV file loaded into the table at startup (replaces the table).
    #[arg(long = "load-csv")]
    pub load_csv: Option<PathBuf>,

    /// Table holding the store data.
    #[arg(short = 't', long = "table")]
    pub table: Option<String>,

    /// Workflow strategy (reactive or pipeline).
    #[arg(short = 's', long = "strategy")]
    pub strategy: Option<Strategy>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    /// Write the effective configuration to the config path and exit.
    #[arg(long = "init-config")]
    pub init_config: bool,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > STORESQL_CONFIG env var > ~/.storesql/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("STORESQL_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Apply command-line overrides on top of the loaded configuration.
    pub fn apply_overrides(&self, config: &mut StoreSqlConfig) {
        if let Some(ref db) = self.db {
            config.database.path = db.to_string_lossy().to_string();
        }
        if let Some(ref csv) = self.load_csv {
            config.database.source_csv = Some(csv.to_string_lossy().to_string());
        }
        if let Some(ref table) = self.table {
            config.database.table = table.clone();
        }
        if let Some(strategy) = self.strategy {
            config.chat.strategy = strategy;
        }
        if let Some(ref level) = self.log_level {
            config.general.log_level = level.clone();
        }
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".storesql").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".storesql").join("config.toml");
    }
    PathBuf::from("config.toml")
}

/// One line typed into the chat loop.
#[derive(Debug, PartialEq, Eq)]
pub enum Command<'a> {
    Quit,
    NewSession,
    History,
    Empty,
    Question(&'a str),
}

impl<'a> Command<'a> {
    pub fn parse(line: &'a str) -> Self {
        match line.trim() {
            "" => Command::Empty,
            "/quit" | "/exit" => Command::Quit,
            "/new" => Command::NewSession,
            "/history" => Command::History,
            text => Command::Question(text),
        }
    }
}
