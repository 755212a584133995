//! Application settings from an optional `config.toml` under the user config
//! directory. Missing or unparsable files degrade to defaults so the
//! application always starts.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

const CONFIG_DIR: &str = "recoilctl";
const CONFIG_FILE: &str = "config.toml";
const PROFILES_FILE: &str = "profiles.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Port the control surface listens on, bound on all interfaces.
    pub listen_port: u16,
    /// Control loop tick period.
    pub tick_interval_ms: u64,
    /// Serial path override; when unset the makcu port is discovered by
    /// USB VID/PID.
    pub serial_port: Option<String>,
    /// Override for the persisted profile collection.
    pub profiles_file: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listen_port: 8000,
            tick_interval_ms: 10,
            serial_port: None,
            profiles_file: None,
        }
    }
}

impl Settings {
    pub fn load() -> Self {
        let Some(path) = config_path() else {
            warn!("No user config directory available, using default settings");
            return Self::default();
        };
        match fs::read_to_string(&path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(settings) => {
                    info!("Loaded settings from {}", path.display());
                    settings
                }
                Err(e) => {
                    warn!("Ignoring unparsable {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No settings file at {}, using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                warn!("Cannot read {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn profiles_path(&self) -> PathBuf {
        self.profiles_file.clone().unwrap_or_else(|| {
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(CONFIG_DIR)
                .join(PROFILES_FILE)
        })
    }
}

fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
}
