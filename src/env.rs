//! Environment constants and path utilities.
//!
//! This module centralizes the file and directory names used by
//! configuration discovery, making them easier to maintain and modify.

/// Main application directory name (hidden directory like .git, .vscode)
pub const AEGIS_DIR_NAME: &str = ".aegis";

/// Configuration file name
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Project-local configuration file name, checked first during discovery
pub const LOCAL_CONFIG_FILE_NAME: &str = "aegis.toml";

/// Environment variable consulted for the API key when the configuration
/// does not set one
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

use std::path::{Path, PathBuf};

/// Build config directory path in user's home directory
pub fn user_config_dir_path(home_dir: &Path) -> PathBuf {
    home_dir.join(AEGIS_DIR_NAME)
}

/// Build config file path in user's home directory
pub fn user_config_file_path(home_dir: &Path) -> PathBuf {
    user_config_dir_path(home_dir).join(CONFIG_FILE_NAME)
}

/// Build hidden config file path in a project directory
pub fn local_config_file_path(current_dir: &Path) -> PathBuf {
    current_dir.join(AEGIS_DIR_NAME).join(CONFIG_FILE_NAME)
}

/// Build plain config file path in a project directory
pub fn project_config_file_path(current_dir: &Path) -> PathBuf {
    current_dir.join(LOCAL_CONFIG_FILE_NAME)
}
