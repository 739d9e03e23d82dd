// ⚙️ Configuration - TOML file + environment overrides
//
// compliance.toml:
//   log_level = "info"
//   [database]   path = "compliance.db"
//   [server]     listen = "0.0.0.0:3001"
//   [compliance] target_intensity = 89.3368
//
// Precedence: defaults < file < FUEL_COMPLIANCE_* env vars < CLI flags

use crate::compliance::{ComplianceCalculator, DEFAULT_TARGET_INTENSITY};
use crate::error::{ComplianceError, ComplianceResult};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

pub const ENV_DATABASE_PATH: &str = "FUEL_COMPLIANCE_DB";
pub const ENV_LISTEN: &str = "FUEL_COMPLIANCE_LISTEN";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub compliance: ComplianceSettings,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen: SocketAddr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceSettings {
    /// gCO₂e/MJ used when a calculation names no target
    #[serde(default = "default_target_intensity")]
    pub target_intensity: f64,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_database_path() -> PathBuf {
    PathBuf::from("compliance.db")
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 3001))
}

fn default_target_intensity() -> f64 {
    DEFAULT_TARGET_INTENSITY
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen_addr(),
        }
    }
}

impl Default for ComplianceSettings {
    fn default() -> Self {
        Self {
            target_intensity: default_target_intensity(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            server: ServerConfig::default(),
            compliance: ComplianceSettings::default(),
            log_level: default_log_level(),
        }
    }
}

impl AppConfig {
    /// Load from a file that must exist
    pub fn load(path: &Path) -> ComplianceResult<Self> {
        if !path.exists() {
            return Err(ComplianceError::Config(format!(
                "config file not found: {}",
                path.display()
            )));
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ComplianceError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&content)
    }

    /// Load from `path` when given and present, defaults otherwise
    pub fn load_or_default(path: Option<&Path>) -> ComplianceResult<Self> {
        match path {
            Some(path) if path.exists() => Self::load(path),
            Some(path) => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                Ok(Self::default())
            }
            None => Ok(Self::default()),
        }
    }

    pub fn from_toml(content: &str) -> ComplianceResult<Self> {
        let config: AppConfig =
            toml::from_str(content).map_err(|e| ComplianceError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ComplianceResult<()> {
        let target = self.compliance.target_intensity;
        if !target.is_finite() || target <= 0.0 {
            return Err(ComplianceError::Config(format!(
                "compliance.target_intensity must be a positive number, got {}",
                target
            )));
        }

        if self.log_level.trim().is_empty() {
            return Err(ComplianceError::Config("log_level must not be empty".to_string()));
        }

        Ok(())
    }

    /// Apply FUEL_COMPLIANCE_DB / FUEL_COMPLIANCE_LISTEN from the process environment
    pub fn apply_env_overrides(&mut self) -> ComplianceResult<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> ComplianceResult<()> {
        if let Some(path) = lookup(ENV_DATABASE_PATH) {
            self.database.path = PathBuf::from(path);
        }

        if let Some(listen) = lookup(ENV_LISTEN) {
            self.server.listen = listen.parse().map_err(|_| {
                ComplianceError::Config(format!("{} is not a socket address: {}", ENV_LISTEN, listen))
            })?;
        }

        Ok(())
    }

    pub fn calculator(&self) -> ComplianceCalculator {
        ComplianceCalculator::with_target(self.compliance.target_intensity)
    }
}
