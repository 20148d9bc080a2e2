use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "ehr-workflows.toml";

/// Main configuration structure for the EHR workflow service
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct EhrConfig {
    /// HTTP listener settings
    pub server: ServerConfig,
    /// Database settings
    pub database: DatabaseConfig,
    /// Observability settings
    pub observability: ObservabilityConfig,
    /// Signing and unlock policy
    pub notes: NotesConfig,
    /// Waitlist offer policy
    pub waitlist: WaitlistConfig,
    /// TOML roster backing credential checks and supervision lookups
    pub staff_roster_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    /// Seconds to wait for in-flight requests on shutdown
    pub shutdown_grace_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".to_string(),
            shutdown_grace_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database URL (SQLite file path or connection string)
    pub url: String,
    /// Maximum connections in pool
    pub max_connections: u32,
    /// Run embedded migrations on startup
    pub auto_migrate: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://ehr-workflows.db".to_string(),
            max_connections: 10,
            auto_migrate: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level or EnvFilter directive
    pub log_level: String,
    /// Emit JSON log lines instead of human-readable output
    pub json_logs: bool,
    /// Enable metrics collection
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: true,
            metrics_enabled: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct NotesConfig {
    /// Days after the session a note is due when no due date is given
    pub documentation_due_days: i64,
    /// Refuse to sign when no attestation resolves for the signer
    pub require_attestation: bool,
    /// Note types that may be signed without a linked appointment
    pub standalone_note_types: Vec<String>,
    pub default_unlock_window_hours: u32,
    pub max_unlock_window_hours: u32,
}

impl Default for NotesConfig {
    fn default() -> Self {
        Self {
            documentation_due_days: 3,
            require_attestation: true,
            standalone_note_types: vec![
                "Contact Note".to_string(),
                "Miscellaneous Note".to_string(),
                "Consultation Note".to_string(),
            ],
            default_unlock_window_hours: 72,
            max_unlock_window_hours: 168,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct WaitlistConfig {
    /// How long a client has to accept an offered slot
    pub offer_ttl_hours: u32,
    /// Used when the entry does not name an appointment type
    pub default_appointment_type: String,
}

impl Default for WaitlistConfig {
    fn default() -> Self {
        Self {
            offer_ttl_hours: 48,
            default_appointment_type: "Individual Therapy".to_string(),
        }
    }
}

impl EhrConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration file (`ehr-workflows.toml` or the given path)
    /// 3. Environment variables (`EHR_WORKFLOWS_NOTES__MAX_UNLOCK_WINDOW_HOURS=24`)
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&EhrConfig::default())?);

        match path {
            Some(path) => {
                builder = builder.add_source(File::from(path));
            }
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                builder = builder.add_source(File::with_name(DEFAULT_CONFIG_FILE));
            }
            None => {}
        }

        builder = builder.add_source(
            Environment::with_prefix("EHR_WORKFLOWS")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("notes.standalone_note_types")
                .try_parsing(true),
        );

        let config: EhrConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let notes = &self.notes;
        if notes.max_unlock_window_hours == 0 {
            anyhow::bail!("notes.max_unlock_window_hours must be at least 1");
        }
        if notes.default_unlock_window_hours == 0
            || notes.default_unlock_window_hours > notes.max_unlock_window_hours
        {
            anyhow::bail!(
                "notes.default_unlock_window_hours must be between 1 and {}",
                notes.max_unlock_window_hours
            );
        }
        if self.waitlist.offer_ttl_hours == 0 {
            anyhow::bail!("waitlist.offer_ttl_hours must be at least 1");
        }
        Ok(())
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}
