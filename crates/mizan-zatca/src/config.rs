//! # Invoice Service Configuration
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     MIZAN_KEYS_DIR=/var/lib/mizan/keys                                 │
//! │     MIZAN_DB_PATH=/var/lib/mizan/mizan.db                              │
//! │     MIZAN_DB_MAX_CONNECTIONS=5                                         │
//! │     MIZAN_CURRENCY=SAR                                                 │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/mizan-pos/mizan.toml (Linux)                             │
//! │     ~/Library/Application Support/com.mizan.pos/mizan.toml (macOS)     │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [keys]
//! dir = "/var/lib/mizan/keys"
//! private_key_file = "ecc_private.pem"
//! public_key_file = "ecc_public.pem"
//! csr_file = "invoice_csr.pem"
//!
//! [database]
//! path = "/var/lib/mizan/mizan.db"
//! max_connections = 5
//!
//! [invoice]
//! currency = "SAR"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use mizan_core::DEFAULT_CURRENCY;
use mizan_db::DbConfig;

use crate::error::{ZatcaError, ZatcaResult};
use crate::keystore::KeyPaths;

// =============================================================================
// Key Settings
// =============================================================================

/// Where the signing key pair lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySettings {
    /// Directory holding the PEM files. Created on first start.
    #[serde(default = "default_keys_dir")]
    pub dir: PathBuf,

    #[serde(default = "default_private_key_file")]
    pub private_key_file: String,

    #[serde(default = "default_public_key_file")]
    pub public_key_file: String,

    /// Placeholder written next to the keys until onboarding replaces it.
    #[serde(default = "default_csr_file")]
    pub csr_file: String,
}

fn default_keys_dir() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.data_dir().join("keys"))
        .unwrap_or_else(|| PathBuf::from("./keys"))
}

fn default_private_key_file() -> String {
    "ecc_private.pem".to_string()
}

fn default_public_key_file() -> String {
    "ecc_public.pem".to_string()
}

fn default_csr_file() -> String {
    "invoice_csr.pem".to_string()
}

impl Default for KeySettings {
    fn default() -> Self {
        KeySettings {
            dir: default_keys_dir(),
            private_key_file: default_private_key_file(),
            public_key_file: default_public_key_file(),
            csr_file: default_csr_file(),
        }
    }
}

// =============================================================================
// Database Settings
// =============================================================================

/// SQLite location and pool size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    /// Default: 5
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_db_path() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.data_dir().join("mizan.db"))
        .unwrap_or_else(|| PathBuf::from("./mizan.db"))
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
            max_connections: default_max_connections(),
        }
    }
}

// =============================================================================
// Invoice Settings
// =============================================================================

/// Invoice rendering options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceSettings {
    /// ISO 4217 code written as `DocumentCurrencyCode` and `currencyID`.
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

impl Default for InvoiceSettings {
    fn default() -> Self {
        InvoiceSettings {
            currency: default_currency(),
        }
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete invoice service configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZatcaConfig {
    #[serde(default)]
    pub keys: KeySettings,

    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub invoice: InvoiceSettings,
}

impl ZatcaConfig {
    /// Creates a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (`mizan.toml`, or `config_path` when given)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> ZatcaResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading invoice config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    /// Loads configuration, falling back to defaults on any error.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!(error = %e, "Failed to load invoice config, using defaults");
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> ZatcaResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| ZatcaError::Config("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Invoice config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> ZatcaResult<()> {
        let currency = &self.invoice.currency;
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(ZatcaError::Config(format!(
                "currency must be a 3-letter ISO 4217 code, got: '{}'",
                currency
            )));
        }

        if self.database.max_connections == 0 {
            return Err(ZatcaError::Config(
                "database.max_connections must be greater than 0".into(),
            ));
        }

        let files = [
            &self.keys.private_key_file,
            &self.keys.public_key_file,
            &self.keys.csr_file,
        ];
        if files.iter().any(|f| f.trim().is_empty()) {
            return Err(ZatcaError::Config("key file names must not be empty".into()));
        }
        if files[0] == files[1] || files[0] == files[2] || files[1] == files[2] {
            return Err(ZatcaError::Config("key file names must be distinct".into()));
        }

        Ok(())
    }

    /// Applies `MIZAN_*` overrides using `lookup` to read variables.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup("MIZAN_KEYS_DIR") {
            debug!(dir = %dir, "Overriding key directory from environment");
            self.keys.dir = PathBuf::from(dir);
        }

        if let Some(path) = lookup("MIZAN_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Some(max) = lookup("MIZAN_DB_MAX_CONNECTIONS") {
            match max.parse::<u32>() {
                Ok(n) => self.database.max_connections = n,
                Err(_) => warn!(value = %max, "Ignoring invalid MIZAN_DB_MAX_CONNECTIONS"),
            }
        }

        if let Some(currency) = lookup("MIZAN_CURRENCY") {
            self.invoice.currency = currency.trim().to_uppercase();
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join("mizan.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Full paths of the key files.
    pub fn key_paths(&self) -> KeyPaths {
        KeyPaths {
            private_key: self.keys.dir.join(&self.keys.private_key_file),
            public_key: self.keys.dir.join(&self.keys.public_key_file),
            csr: self.keys.dir.join(&self.keys.csr_file),
        }
    }

    /// Pool configuration for [`mizan_db::Database::new`].
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(&self.database.path).max_connections(self.database.max_connections)
    }

    pub fn currency(&self) -> &str {
        &self.invoice.currency
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("com", "mizan", "pos")
}
