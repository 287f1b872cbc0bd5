// Persistent settings stored as config.json in the app data directory

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::automation::AutomationSettings;
use crate::bindings::{BindingProfiles, ChampionBindingSettings};
use crate::error::{PilotError, Result};
use crate::lcu::ConnectionOptions;
use crate::retry::RetryPolicy;
use crate::runes::RunePage;
use crate::watcher::{AcquisitionStrategyKind, SelectorConfig};

pub const APP_IDENTIFIER: &str = "com.osspilot.app";
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BindingsConfig {
  pub profiles: BindingProfiles,
  pub champions: ChampionBindingSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PilotConfig {
  #[serde(default)]
  pub league_path: Option<PathBuf>,
  #[serde(default)]
  pub acquisition_method: AcquisitionStrategyKind,
  #[serde(default)]
  pub selector: SelectorConfig,
  #[serde(default = "default_polling_interval_ms")]
  pub polling_interval_ms: u64,
  #[serde(default = "default_ui_poll_interval_ms")]
  pub ui_poll_interval_ms: u64,
  #[serde(default = "default_discovery_interval_ms")]
  pub discovery_interval_ms: u64,
  #[serde(default = "default_reconnect_debounce_ms")]
  pub reconnect_debounce_ms: u64,
  #[serde(default = "default_request_timeout_ms")]
  pub request_timeout_ms: u64,
  #[serde(default = "default_transport_retries")]
  pub transport_retries: u32,
  /// PEM file of the client's root certificate.
  #[serde(default)]
  pub riot_root_cert: Option<PathBuf>,
  #[serde(default)]
  pub retry: RetryPolicy,
  /// Used when the client does not report how many pages the account owns.
  #[serde(default = "default_max_rune_pages")]
  pub max_rune_pages: usize,
  #[serde(default)]
  pub automation: AutomationSettings,
  #[serde(default)]
  pub rune_pages: HashMap<u32, RunePage>,
  #[serde(default)]
  pub bindings: BindingsConfig,
  #[serde(default)]
  pub verbose_logging: bool,
}

fn default_polling_interval_ms() -> u64 {
  250
}

fn default_ui_poll_interval_ms() -> u64 {
  1000
}

fn default_discovery_interval_ms() -> u64 {
  1500
}

fn default_reconnect_debounce_ms() -> u64 {
  750
}

fn default_request_timeout_ms() -> u64 {
  5000
}

fn default_transport_retries() -> u32 {
  2
}

fn default_max_rune_pages() -> usize {
  2
}

impl Default for PilotConfig {
  fn default() -> Self {
    Self {
      league_path: None,
      acquisition_method: AcquisitionStrategyKind::default(),
      selector: SelectorConfig::default(),
      polling_interval_ms: default_polling_interval_ms(),
      ui_poll_interval_ms: default_ui_poll_interval_ms(),
      discovery_interval_ms: default_discovery_interval_ms(),
      reconnect_debounce_ms: default_reconnect_debounce_ms(),
      request_timeout_ms: default_request_timeout_ms(),
      transport_retries: default_transport_retries(),
      riot_root_cert: None,
      retry: RetryPolicy::default(),
      max_rune_pages: default_max_rune_pages(),
      automation: AutomationSettings::default(),
      rune_pages: HashMap::new(),
      bindings: BindingsConfig::default(),
      verbose_logging: false,
    }
  }
}

/// `%APPDATA%/com.osspilot.app`, else `$HOME/.config/osspilot`, else `.`.
pub fn app_data_dir() -> PathBuf {
  if let Ok(appdata) = std::env::var("APPDATA") {
    return PathBuf::from(appdata).join(APP_IDENTIFIER);
  }
  if let Ok(home) = std::env::var("HOME") {
    return PathBuf::from(home).join(".config").join("osspilot");
  }
  PathBuf::from(".")
}

pub fn default_config_path() -> PathBuf {
  app_data_dir().join("config").join(CONFIG_FILE)
}

impl PilotConfig {
  /// A missing file yields the defaults.
  pub fn load(path: &Path) -> Result<Self> {
    let text = match fs::read_to_string(path) {
      Ok(text) => text,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        tracing::info!("[Config] No config at {}, using defaults", path.display());
        return Ok(Self::default());
      }
      Err(e) => return Err(e.into()),
    };
    let config: Self = serde_json::from_str(&text)
      .map_err(|e| PilotError::Config(format!("Failed to parse {}: {}", path.display(), e)))?;
    config.check()?;
    Ok(config)
  }

  pub fn save(&self, path: &Path) -> Result<()> {
    let dir = path
      .parent()
      .ok_or_else(|| PilotError::Config(format!("No parent directory for {}", path.display())))?;
    fs::create_dir_all(dir)?;
    let json = serde_json::to_string_pretty(self)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(json.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp
      .persist(path)
      .map_err(|e| PilotError::Io(e.error))?;
    tracing::info!("[Config] Saved {}", path.display());
    Ok(())
  }

  fn check(&self) -> Result<()> {
    for (champion, page) in &self.rune_pages {
      page
        .check_shape()
        .map_err(|reason| PilotError::Config(format!("Rune page for champion {}: {}", champion, reason)))?;
    }
    if let Some(group) = &self.bindings.champions.default_group {
      if !self.bindings.profiles.contains_key(group) {
        tracing::warn!("[Config] Default binding group '{}' is not defined", group);
      }
    }
    Ok(())
  }

  pub fn polling_interval(&self) -> Duration {
    Duration::from_millis(self.polling_interval_ms)
  }

  pub fn ui_poll_interval(&self) -> Duration {
    Duration::from_millis(self.ui_poll_interval_ms)
  }

  pub fn discovery_interval(&self) -> Duration {
    Duration::from_millis(self.discovery_interval_ms.max(100))
  }

  pub fn reconnect_debounce(&self) -> Duration {
    Duration::from_millis(self.reconnect_debounce_ms)
  }

  pub fn connection_options(&self) -> ConnectionOptions {
    let defaults = ConnectionOptions::default();
    ConnectionOptions {
      request_timeout: Duration::from_millis(self.request_timeout_ms.max(100)),
      transport_retry: RetryPolicy::new(
        self.transport_retries + 1,
        Duration::from_millis(200),
        Duration::from_secs(2),
      ),
      root_cert: self.riot_root_cert.clone(),
      ..defaults
    }
  }
}
