//! Driver configuration
//!
//! Read once at startup from a TOML file and never written back:
//!
//! ```toml
//! pads = [1, "custom2"]
//! custom_pins_2 = [11, 5, 6, 13, 19, 26, 21, 20, 16, 12, 7, 8, -1]
//! poll_interval_ms = 10
//!
//! [registers]
//! source = "gpiomem"
//! ```

use color_eyre::eyre::{eyre, Result, WrapErr};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::controller::poller::DEFAULT_POLL_INTERVAL;
use crate::gpio::{BoardModel, MappingSource};
use crate::pad::{PadKind, PadSpec};

const CONFIG_DIR_NAME: &str = "mk-arcade-joystick";
const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct DriverConfig {
    /// Pad identity per slot; only the first two entries are used
    pub pads: Vec<PadSpec>,
    /// Pins for `custom1`, 13 entries, -1 for unused slots
    pub custom_pins_1: Option<Vec<i64>>,
    /// Pins for `custom2`
    pub custom_pins_2: Option<Vec<i64>>,
    pub poll_interval_ms: u64,
    pub registers: RegisterConfig,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            pads: Vec::new(),
            custom_pins_1: None,
            custom_pins_2: None,
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            registers: RegisterConfig::default(),
        }
    }
}

/// How the GPIO controller is reached
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RegisterConfig {
    pub source: MappingSource,
    /// Device node override for `mem`/`gpiomem`
    pub device: Option<PathBuf>,
    /// Skips CPU detection when set
    pub board: Option<BoardModel>,
}

impl DriverConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| eyre!("Failed to parse driver config: {}", e))
    }

    pub async fn load(path: &Path) -> Result<Self> {
        info!("Loading driver config from {}", path.display());
        let content = tokio::fs::read_to_string(path)
            .await
            .wrap_err_with(|| format!("Failed to read config file {}", path.display()))?;
        let config = Self::from_toml_str(&content)?;
        debug!("Loaded config: {:?}", config);
        Ok(config)
    }

    /// `<config dir>/mk-arcade-joystick/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Pin list configured for a custom pad
    pub fn custom_pins(&self, kind: PadKind) -> Option<&[i64]> {
        match kind {
            PadKind::Custom1 => self.custom_pins_1.as_deref(),
            PadKind::Custom2 => self.custom_pins_2.as_deref(),
            PadKind::BuiltinP1 | PadKind::BuiltinP2 => None,
        }
    }
}
