//! Configuration file and data folder resolution

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const APP_DIR: &str = "lectern";
const CONFIG_FILE: &str = "config.toml";

/// Locate the TOML configuration file
///
/// Priority order:
/// 1. Command-line argument (returned even if missing, so loading reports it)
/// 2. Environment variable
/// 3. `<user config dir>/lectern/config.toml` if present
/// 4. `/etc/lectern/config.toml` on Linux if present
///
/// Returns `None` when no file applies; callers then run on defaults.
pub fn resolve_config_path(cli_arg: Option<&Path>, env_var_name: &str) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        info!("Config file from command line: {}", path.display());
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            info!("Config file from {}: {}", env_var_name, path);
            return Some(PathBuf::from(path));
        }
    }

    if let Some(user_config) = dirs::config_dir().map(|d| d.join(APP_DIR).join(CONFIG_FILE)) {
        if user_config.exists() {
            info!("Config file from user config dir: {}", user_config.display());
            return Some(user_config);
        }
        debug!("No config file at {}", user_config.display());
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc").join(APP_DIR).join(CONFIG_FILE);
        if system_config.exists() {
            info!("Config file from system config dir: {}", system_config.display());
            return Some(system_config);
        }
        debug!("No config file at {}", system_config.display());
    }

    info!("No config file found, using defaults");
    None
}

/// Read and deserialize a TOML file; absent keys take the type's serde defaults
pub fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
        path: path.to_path_buf(),
        source,
    })?;
    let parsed = toml::from_str(&content).map_err(|source| Error::ConfigParse {
        path: path.to_path_buf(),
        source,
    })?;
    debug!("Loaded {} ({} bytes)", path.display(), content.len());
    Ok(parsed)
}

/// OS-dependent default data folder
pub fn default_data_dir() -> PathBuf {
    if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join(APP_DIR))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\lectern"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join(APP_DIR))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/lectern"))
    } else {
        dirs::data_local_dir()
            .map(|d| d.join(APP_DIR))
            .unwrap_or_else(|| PathBuf::from("./lectern_data"))
    }
}

/// Default SQLite database location
pub fn default_database_path() -> PathBuf {
    let path = default_data_dir().join("lectern.db");
    debug!("Default database path: {}", path.display());
    path
}
