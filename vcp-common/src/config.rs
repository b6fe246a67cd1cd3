//! Configuration loading and root folder resolution

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};

/// Environment variable naming the root folder
pub const ROOT_FOLDER_ENV: &str = "VCP_ROOT_FOLDER";

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Root folder resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file value
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    toml_value: Option<&Path>,
) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: TOML config file
    if let Some(path) = toml_value {
        return path.to_path_buf();
    }

    // Priority 4: OS-dependent compiled default
    default_root_folder()
}

/// Get OS-dependent default root folder path
pub fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/vcp (or /var/lib/vcp for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("vcp"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/vcp"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("vcp"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/vcp"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("vcp"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\vcp"))
    } else {
        PathBuf::from("./vcp_data")
    }
}

/// Default TOML config path for a module: `<config dir>/vcp/<module>.toml`
pub fn default_config_path(module_name: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("vcp").join(format!("{}.toml", module_name)))
}

/// Directory layout beneath the root folder
#[derive(Debug, Clone)]
pub struct RootFolderLayout {
    root: PathBuf,
}

impl RootFolderLayout {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// One JSON record per job
    pub fn jobs_dir(&self) -> PathBuf {
        self.root.join("state").join("jobs")
    }

    /// Content-addressed synthesized audio
    pub fn cache_dir(&self) -> PathBuf {
        self.root.join("cache").join("tts")
    }

    /// Per-job scratch space (cleaned reference audio)
    pub fn work_dir(&self) -> PathBuf {
        self.root.join("work")
    }

    /// Create all directories if missing
    pub fn ensure_directories_exist(&self) -> Result<()> {
        for dir in [self.jobs_dir(), self.cache_dir(), self.work_dir()] {
            if !dir.exists() {
                std::fs::create_dir_all(&dir).map_err(|e| {
                    Error::Config(format!("Failed to create {}: {}", dir.display(), e))
                })?;
                info!("Created directory: {}", dir.display());
            }
        }
        Ok(())
    }
}

/// Load a TOML config file, falling back to defaults when the file is missing
///
/// A missing file is not an error (warning + defaults). A file that exists
/// but cannot be read or parsed is a configuration error.
pub fn load_toml_or_default<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        warn!(
            "Config file not found at {}; using compiled defaults",
            path.display()
        );
        return Ok(T::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed: {}", e)))?;
    let config = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML failed ({}): {}", path.display(), e)))?;

    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Serialize `config` and write it atomically to `path`
pub fn write_toml_config<T: Serialize>(config: &T, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    crate::fs::write_atomic_sync(path, content.as_bytes())
}

/// Read an environment override, ignoring (with a warning) values that do not parse
pub fn env_override<T: FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring unparsable value for {}: {:?}", name, raw);
            None
        }
    }
}
