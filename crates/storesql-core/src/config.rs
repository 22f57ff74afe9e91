use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, StoreSqlError};
use crate::types::{StoreScope, Strategy};

/// Top-level configuration for storesql.
///
/// Loaded from `~/.storesql/config.toml` by default. Every section falls back
/// to its defaults when absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSqlConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub guard: GuardConfig,
}

impl StoreSqlConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: StoreSqlConfig = toml::from_str(&content)?;
        config.validate()?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Reject values the rest of the system cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.database.table.trim().is_empty() {
            return Err(StoreSqlError::Config("database.table must not be empty".into()));
        }
        if self.guard.store_column.trim().is_empty() {
            return Err(StoreSqlError::Config(
                "guard.store_column must not be empty".into(),
            ));
        }
        if self.guard.max_rows == 0 {
            return Err(StoreSqlError::Config("guard.max_rows must be > 0".into()));
        }
        if self.chat.max_tool_rounds == 0 {
            return Err(StoreSqlError::Config(
                "chat.max_tool_rounds must be > 0".into(),
            ));
        }
        if self.llm.sentinel.trim().is_empty() {
            return Err(StoreSqlError::Config("llm.sentinel must not be empty".into()));
        }
        Ok(())
    }

    /// The store every generated query is scoped to.
    pub fn store_scope(&self) -> StoreScope {
        StoreScope::new(self.guard.store_column.clone(), self.guard.store_id)
    }

    /// Tables queries may read. Defaults to the loaded table.
    pub fn allowed_tables(&self) -> Vec<String> {
        if self.guard.allowed_tables.is_empty() {
            vec![self.database.table.clone()]
        } else {
            self.guard.allowed_tables.clone()
        }
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Relational store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database file.
    pub path: String,
    /// Table the tabular source is loaded into.
    pub table: String,
    /// CSV file loaded at startup, replacing the table.
    pub source_csv: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "~/.storesql/store.db".to_string(),
            table: "summary_data".to_string(),
            source_csv: None,
        }
    }
}

/// Language model endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,
    pub base_url: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
    pub request_timeout_secs: u64,
    /// File overriding the built-in query instruction template.
    pub instruction_path: Option<String>,
    /// Exact text the model returns when the question has no matching data.
    pub sentinel: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "claude-3-5-sonnet-20241022".to_string(),
            base_url: "https://api.anthropic.com/v1".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            max_tokens: 1024,
            temperature: None,
            request_timeout_secs: 60,
            instruction_path: None,
            sentinel: "NO Data Available".to_string(),
        }
    }
}

/// Conversation workflow settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub strategy: Strategy,
    /// Prior history entries prepended to each question.
    pub history_window: usize,
    /// Maximum message length in characters.
    pub max_message_length: usize,
    /// Tool calls the controller may make in one turn.
    pub max_tool_rounds: usize,
    /// System prompt of the tool-calling controller.
    pub agent_prompt: String,
    /// Sample rows per table included in the schema snapshot.
    pub sample_rows: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::Reactive,
            history_window: 2,
            max_message_length: 2000,
            max_tool_rounds: 4,
            agent_prompt: "You are a helpful assistant that understands natural language \
                           and answers questions using a SQL database."
                .to_string(),
            sample_rows: 3,
        }
    }
}

/// Execution hardening for model-generated SQL.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Store identifier every query is scoped to.
    pub store_id: i64,
    /// Column holding the store identifier.
    pub store_column: String,
    /// Tables queries may read; empty means only `database.table`.
    pub allowed_tables: Vec<String>,
    /// Rows rendered per result.
    pub max_rows: usize,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            store_id: 1,
            store_column: "store_id".to_string(),
            allowed_tables: Vec::new(),
            max_rows: 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = StoreSqlConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.database.table, "summary_data");
        assert_eq!(config.llm.sentinel, "NO Data Available");
        assert_eq!(config.chat.history_window, 2);
        assert_eq!(config.chat.strategy, Strategy::Reactive);
        assert_eq!(config.guard.store_id, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_valid_config() {
        let content = r#"
[database]
path = "/tmp/orders.db"
table = "orders"

[chat]
strategy = "pipeline"
history_window = 4

[guard]
store_id = 7
allowed_tables = ["orders", "stores"]
"#;
        let file = create_temp_config(content);
        let config = StoreSqlConfig::load(file.path()).unwrap();
        assert_eq!(config.database.table, "orders");
        assert_eq!(config.chat.strategy, Strategy::Pipeline);
        assert_eq!(config.chat.history_window, 4);
        assert_eq!(config.store_scope(), StoreScope::new("store_id", 7));
        assert_eq!(config.allowed_tables(), vec!["orders", "stores"]);
        // Untouched sections keep their defaults.
        assert_eq!(config.llm.max_tokens, 1024);
    }

    #[test]
    fn test_allowed_tables_defaults_to_loaded_table() {
        let config = StoreSqlConfig::default();
        assert_eq!(config.allowed_tables(), vec!["summary_data"]);
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let file = create_temp_config("[guard]\nmax_rows = 0\n");
        let err = StoreSqlConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, StoreSqlError::Config(_)));
    }

    #[test]
    fn test_load_rejects_unknown_strategy() {
        let file = create_temp_config("[chat]\nstrategy = \"swarm\"\n");
        assert!(StoreSqlConfig::load(file.path()).is_err());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = StoreSqlConfig::load_or_default(Path::new("/nonexistent/config.toml"));
        assert_eq!(config.database.table, "summary_data");
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = StoreSqlConfig::default();
        config.guard.store_id = 42;
        config.llm.temperature = Some(0.0);
        config.save(&path).unwrap();

        let reloaded = StoreSqlConfig::load(&path).unwrap();
        assert_eq!(reloaded.guard.store_id, 42);
        assert_eq!(reloaded.llm.temperature, Some(0.0));
        assert_eq!(reloaded.chat.agent_prompt, config.chat.agent_prompt);
    }
}
