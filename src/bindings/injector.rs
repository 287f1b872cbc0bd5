// Applies a champion's binding group through the client or input.ini

use reqwest::Method;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::ini::{patch_ini, write_atomically};
use super::profile::{by_section, BindingProfiles, ChampionBindingSettings};
use crate::error::{PilotError, Result};
use crate::lcu::{send_json, LcuApi};

pub const INPUT_SETTINGS_PATH: &str = "/lol-game-settings/v1/input-settings";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InjectVia {
  Api,
  ConfigFile,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum InjectOutcome {
  Applied { via: InjectVia, bindings: usize },
  Skipped(String),
}

pub fn input_ini_path(install_dir: &Path) -> PathBuf {
  install_dir.join("Config").join("input.ini")
}

pub struct BindingInjector {
  api: Arc<dyn LcuApi>,
  profiles: BindingProfiles,
  settings: ChampionBindingSettings,
}

impl BindingInjector {
  pub fn new(api: Arc<dyn LcuApi>, profiles: BindingProfiles, settings: ChampionBindingSettings) -> Self {
    Self {
      api,
      profiles,
      settings,
    }
  }

  pub async fn apply(&self, champion_id: u32) -> Result<InjectOutcome> {
    let group = match self.settings.group_for(champion_id) {
      Some(group) => group,
      None => {
        return Ok(InjectOutcome::Skipped(format!(
          "no binding group for champion {}",
          champion_id
        )))
      }
    };
    let items = match self.profiles.get(group) {
      Some(items) if !items.is_empty() => items,
      _ => return Ok(InjectOutcome::Skipped(format!("binding group '{}' is empty", group))),
    };
    let sections = by_section(items);

    if self.has_settings_endpoint().await? {
      let mut body = Map::new();
      for (section, keys) in &sections {
        let keys: Map<String, Value> = keys
          .iter()
          .map(|(action, key)| (action.clone(), Value::String(key.clone())))
          .collect();
        body.insert(section.clone(), Value::Object(keys));
      }
      send_json(self.api.as_ref(), Method::PATCH, INPUT_SETTINGS_PATH, Value::Object(body)).await?;
      tracing::info!(
        "[Bindings] Applied group '{}' ({} keys) for champion {} through the client",
        group,
        items.len(),
        champion_id
      );
      return Ok(InjectOutcome::Applied {
        via: InjectVia::Api,
        bindings: items.len(),
      });
    }

    let install_dir = match self.api.install_dir() {
      Some(dir) => dir,
      None => {
        return Ok(InjectOutcome::Skipped(
          "install directory unknown and no bindings endpoint".into(),
        ))
      }
    };
    let path = input_ini_path(&install_dir);
    let written = tokio::task::spawn_blocking(move || -> Result<PathBuf> {
      let current = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e.into()),
      };
      if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
      }
      write_atomically(&path, &patch_ini(&current, &sections))?;
      Ok(path)
    })
    .await
    .map_err(|e| PilotError::Aborted(format!("input.ini write task: {}", e)))??;

    tracing::info!(
      "[Bindings] Wrote group '{}' for champion {} to {}",
      group,
      champion_id,
      written.display()
    );
    Ok(InjectOutcome::Applied {
      via: InjectVia::ConfigFile,
      bindings: items.len(),
    })
  }

  async fn has_settings_endpoint(&self) -> Result<bool> {
    if !self.api.has_endpoint() {
      return Ok(false);
    }
    match self.api.request(Method::GET, INPUT_SETTINGS_PATH, None).await {
      Ok(_) => Ok(true),
      Err(PilotError::Api { status: 404 | 405, .. }) => {
        tracing::debug!("[Bindings] No input-settings endpoint, using input.ini");
        Ok(false)
      }
      Err(e) => Err(e),
    }
  }
}
