//! # Station Configuration
//!
//! Configuration management for a scan station.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     OPNAME_SCAN_MODE=barcode                                           │
//! │     OPNAME_DB_PATH=/data/opname.db                                     │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/opname/station.toml (Linux)                              │
//! │     ~/Library/Application Support/org.opname.opname/station.toml       │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     UHF single reads, 7 s timeout, factory access password             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # station.toml
//! [device]
//! id = "550e8400-e29b-41d4-a716-446655440000"
//! name = "Handheld 1"
//!
//! [reader]
//! default_mode = "uhf"          # uhf | barcode
//! single_read_timeout_secs = 7
//! continuous_inventory = false
//! access_password = "00000000"
//! verify_written_epc = true
//!
//! [session]
//! persist_sightings = true
//! location = "Reading Room"
//!
//! [storage]
//! database_path = "/var/lib/opname/opname.db"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use opname_core::validation::validate_access_password;
use opname_core::{ScanMethod, DEFAULT_ACCESS_PASSWORD, SINGLE_READ_TIMEOUT_SECS};

use crate::error::{ScanError, ScanResult};

// =============================================================================
// Device Configuration
// =============================================================================

/// Identity of this handheld.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Unique device identifier (UUID v4).
    /// Auto-generated on first run if not provided.
    pub id: String,

    /// Human-readable device name.
    #[serde(default = "default_device_name")]
    pub name: String,
}

fn default_device_name() -> String {
    "Handheld".to_string()
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            id: Uuid::new_v4().to_string(),
            name: default_device_name(),
        }
    }
}

// =============================================================================
// Reader Settings
// =============================================================================

/// Reader behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaderSettings {
    /// Modality selected at startup.
    #[serde(default = "default_mode")]
    pub default_mode: ScanMethod,

    /// Bound on single-shot UHF reads and TID reads (seconds).
    #[serde(default = "default_read_timeout")]
    pub single_read_timeout_secs: u64,

    /// UHF toggles run a continuous inventory instead of a single read.
    #[serde(default)]
    pub continuous_inventory: bool,

    /// Access password for EPC writes and locks (8 hex digits).
    #[serde(default = "default_access_password")]
    pub access_password: String,

    /// Compare the EPC reported with the TID against the written one.
    #[serde(default = "default_true")]
    pub verify_written_epc: bool,
}

fn default_mode() -> ScanMethod {
    ScanMethod::Uhf
}

fn default_read_timeout() -> u64 {
    SINGLE_READ_TIMEOUT_SECS
}

fn default_access_password() -> String {
    DEFAULT_ACCESS_PASSWORD.to_string()
}

fn default_true() -> bool {
    true
}

impl Default for ReaderSettings {
    fn default() -> Self {
        ReaderSettings {
            default_mode: default_mode(),
            single_read_timeout_secs: default_read_timeout(),
            continuous_inventory: false,
            access_password: default_access_password(),
            verify_written_epc: true,
        }
    }
}

impl ReaderSettings {
    pub fn single_read_timeout(&self) -> Duration {
        Duration::from_secs(self.single_read_timeout_secs)
    }
}

// =============================================================================
// Session Settings
// =============================================================================

/// Stock-take session behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Write each first sighting to the catalog immediately.
    #[serde(default = "default_true")]
    pub persist_sightings: bool,

    /// Location being audited when a session starts.
    #[serde(default)]
    pub location: Option<String>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        SessionSettings {
            persist_sightings: true,
            location: None,
        }
    }
}

// =============================================================================
// Storage Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    /// SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

fn default_database_path() -> PathBuf {
    directories::ProjectDirs::from("org", "opname", "opname")
        .map(|dirs| dirs.data_dir().join("opname.db"))
        .unwrap_or_else(|| PathBuf::from("opname.db"))
}

impl Default for StorageSettings {
    fn default() -> Self {
        StorageSettings {
            database_path: default_database_path(),
        }
    }
}

// =============================================================================
// Main Station Configuration
// =============================================================================

/// Complete station configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StationConfig {
    #[serde(default)]
    pub device: DeviceConfig,

    #[serde(default)]
    pub reader: ReaderSettings,

    #[serde(default)]
    pub session: SessionSettings,

    #[serde(default)]
    pub storage: StorageSettings,
}

impl StationConfig {
    /// Creates a new config with defaults and a generated device ID.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (station.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> ScanResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading station config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load station config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> ScanResult<PathBuf> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| ScanError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Station config saved");
        Ok(path)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> ScanResult<()> {
        if self.device.id.trim().is_empty() {
            return Err(ScanError::InvalidConfig("device.id must not be empty".into()));
        }

        if self.reader.single_read_timeout_secs == 0 {
            return Err(ScanError::InvalidConfig(
                "reader.single_read_timeout_secs must be greater than 0".into(),
            ));
        }

        validate_access_password(&self.reader.access_password)
            .map_err(|e| ScanError::InvalidConfig(format!("reader.access_password: {}", e)))?;

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(id) = std::env::var("OPNAME_DEVICE_ID") {
            debug!(device_id = %id, "Overriding device ID from environment");
            self.device.id = id;
        }

        if let Ok(mode) = std::env::var("OPNAME_SCAN_MODE") {
            match mode.parse::<ScanMethod>() {
                Ok(parsed) => {
                    debug!(mode = %parsed, "Overriding scan mode from environment");
                    self.reader.default_mode = parsed;
                }
                Err(_) => warn!(mode = %mode, "Unknown scan mode in environment"),
            }
        }

        if let Ok(secs) = std::env::var("OPNAME_READ_TIMEOUT_SECS") {
            if let Ok(s) = secs.parse::<u64>() {
                self.reader.single_read_timeout_secs = s;
            }
        }

        if let Ok(password) = std::env::var("OPNAME_ACCESS_PASSWORD") {
            self.reader.access_password = password;
        }

        if let Ok(path) = std::env::var("OPNAME_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.storage.database_path = PathBuf::from(path);
        }

        if let Ok(location) = std::env::var("OPNAME_LOCATION") {
            self.session.location = Some(location).filter(|l| !l.trim().is_empty());
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("org", "opname", "opname")
            .map(|dirs| dirs.config_dir().join("station.toml"))
    }

    /// Returns the device ID.
    pub fn device_id(&self) -> &str {
        &self.device.id
    }
}
