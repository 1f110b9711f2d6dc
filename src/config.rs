//! Service configuration: the TOML-backed settings tree and the discovery
//! hierarchy that locates it.
//!
//! Discovery order:
//! 1. Current directory: ./aegis.toml or ./.aegis/config.toml
//! 2. User config: ~/.aegis/config.toml
//! 3. System config: /etc/aegis/config.toml
//! 4. Built-in defaults

use crate::env;
use crate::provider::ProviderConfig;
use crate::service::types::{HealthConfig, PoolConfig, RateLimitConfig};
use crate::task::PoolKind;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env as std_env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Worker counts and default deadlines, one section per pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolsConfig {
    pub regex: PoolConfig,
    pub ai: PoolConfig,
    pub analysis: PoolConfig,
}

impl Default for PoolsConfig {
    fn default() -> Self {
        Self {
            regex: PoolConfig::default(),
            ai: PoolConfig {
                workers: 3,
                ..PoolConfig::default()
            },
            analysis: PoolConfig::default(),
        }
    }
}

impl PoolsConfig {
    pub fn for_kind(&self, kind: PoolKind) -> &PoolConfig {
        match kind {
            PoolKind::Regex => &self.regex,
            PoolKind::Ai => &self.ai,
            PoolKind::Analysis => &self.analysis,
        }
    }
}

/// Everything the service needs to come up: provider endpoint and
/// credentials, rate limits, breaker thresholds, pool sizes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub provider: ProviderConfig,
    pub rate_limit: RateLimitConfig,
    pub health: HealthConfig,
    pub pools: PoolsConfig,
}

impl ServiceConfig {
    /// Load configuration from a TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path).context("Failed to read config file")?;
        Self::from_toml_str(&content)
    }

    /// Load configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse TOML configuration")
    }

    /// Save configuration to a TOML file
    pub fn to_toml_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = self.to_toml_string()?;
        fs::write(path, content).context("Failed to write config file")
    }

    /// Convert configuration to a TOML string
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }
}

/// Configuration discovery system
pub struct ConfigDiscovery;

impl ConfigDiscovery {
    /// Discover and load configuration using the hierarchy
    pub fn discover_config() -> Result<ServiceConfig> {
        if let Some(config_path) = Self::find_config_file() {
            info!("Loading configuration from: {:?}", config_path);
            return ServiceConfig::from_toml_file(config_path);
        }

        info!("No configuration file found, using defaults");
        Ok(ServiceConfig::default())
    }

    /// Find configuration file using discovery hierarchy
    pub fn find_config_file() -> Option<PathBuf> {
        let candidates = Self::get_config_candidates();

        for candidate in candidates {
            debug!("Checking for config file: {:?}", candidate);
            if candidate.exists() && candidate.is_file() {
                debug!("Found config file: {:?}", candidate);
                return Some(candidate);
            }
        }

        debug!("No config file found in discovery hierarchy");
        None
    }

    /// Get list of configuration file candidates in priority order
    pub fn get_config_candidates() -> Vec<PathBuf> {
        Self::config_candidates_for(std_env::current_dir().ok(), Self::get_home_dir())
    }

    fn config_candidates_for(
        current_dir: Option<PathBuf>,
        home_dir: Option<PathBuf>,
    ) -> Vec<PathBuf> {
        let mut candidates = Vec::new();

        // 1. Current directory: ./aegis.toml, then ./.aegis/config.toml
        if let Some(current_dir) = current_dir {
            candidates.push(env::project_config_file_path(&current_dir));
            candidates.push(env::local_config_file_path(&current_dir));
        }

        // 2. User config: ~/.aegis/config.toml
        if let Some(home_dir) = home_dir {
            candidates.push(env::user_config_file_path(&home_dir));
        }

        // 3. System config: /etc/aegis/config.toml (Unix-like systems)
        #[cfg(unix)]
        candidates.push(PathBuf::from("/etc/aegis/config.toml"));

        // Windows system config: C:\ProgramData\aegis\config.toml
        #[cfg(windows)]
        if let Ok(program_data) = std_env::var("PROGRAMDATA") {
            candidates.push(
                PathBuf::from(program_data)
                    .join("aegis")
                    .join("config.toml"),
            );
        }

        candidates
    }

    /// Get home directory path
    fn get_home_dir() -> Option<PathBuf> {
        std_env::var("HOME")
            .ok()
            .or_else(|| std_env::var("USERPROFILE").ok())
            .map(PathBuf::from)
    }

    /// Create a default config file in the user's home directory
    pub fn create_default_user_config() -> Result<PathBuf> {
        let home_dir = Self::get_home_dir().context("Could not determine home directory")?;

        let config_dir = env::user_config_dir_path(&home_dir);
        let config_path = env::user_config_file_path(&home_dir);

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir).context("Failed to create configuration directory")?;
            info!("Created configuration directory: {:?}", config_dir);
        }

        if !config_path.exists() {
            let mut content = String::from(
                "# aegis configuration\n\
                 # A project-local ./aegis.toml takes precedence over this file.\n\
                 # Durations are written as { secs = ..., nanos = ... } tables.\n\
                 # Set api_key under [provider] (or export OPENAI_API_KEY).\n\n",
            );
            content.push_str(&ServiceConfig::default().to_toml_string()?);
            fs::write(&config_path, content).context("Failed to write default config file")?;
            info!("Created default configuration file: {:?}", config_path);
        } else {
            warn!("Configuration file already exists: {:?}", config_path);
        }

        Ok(config_path)
    }

    /// Show configuration discovery information for debugging
    pub fn show_discovery_info() {
        println!("Configuration Discovery Hierarchy:");
        println!();

        let candidates = Self::get_config_candidates();
        for (i, candidate) in candidates.iter().enumerate() {
            let status = if candidate.exists() {
                if candidate.is_file() {
                    "✓ EXISTS"
                } else {
                    "✗ NOT A FILE"
                }
            } else {
                "✗ NOT FOUND"
            };

            println!("  {}. {:?} - {}", i + 1, candidate, status);
        }

        println!();
        if let Some(found) = Self::find_config_file() {
            println!("Active configuration: {:?}", found);
        } else {
            println!("Active configuration: Built-in defaults");
        }
    }
}
