// Champion catalog: id <-> name/alias lookups

use std::collections::HashMap;

use crate::error::Result;
use crate::lcu::types::LcuChampionSummary;
use crate::lcu::{get_json, LcuApi};

pub const CHAMPION_SUMMARY_PATH: &str = "/lol-game-data/assets/v1/champion-summary.json";

/// Lower-cased, alphanumeric only: "Kai'Sa", "kaisa" and "KAI SA" all match.
fn lookup_key(raw: &str) -> String {
  raw
    .chars()
    .filter(|c| c.is_alphanumeric())
    .flat_map(|c| c.to_lowercase())
    .collect()
}

#[derive(Debug, Clone, Default)]
pub struct ChampionCatalog {
  names: HashMap<u32, String>,
  keys: HashMap<String, u32>,
}

impl ChampionCatalog {
  pub fn from_summaries(summaries: impl IntoIterator<Item = LcuChampionSummary>) -> Self {
    let mut catalog = Self::default();
    for summary in summaries {
      // The summary list carries a placeholder entry with id -1
      let id = match u32::try_from(summary.id) {
        Ok(id) if id > 0 => id,
        _ => continue,
      };
      catalog.keys.insert(lookup_key(&summary.name), id);
      if !summary.alias.is_empty() {
        catalog.keys.insert(lookup_key(&summary.alias), id);
      }
      catalog.names.insert(id, summary.name);
    }
    catalog
  }

  pub async fn load_from_client(api: &dyn LcuApi) -> Result<Self> {
    let summaries: Vec<LcuChampionSummary> = get_json(api, CHAMPION_SUMMARY_PATH).await?;
    let catalog = Self::from_summaries(summaries);
    tracing::info!("[Catalog] Loaded {} champions from the client", catalog.len());
    Ok(catalog)
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  /// Accepts a numeric id, a display name or an alias.
  pub fn resolve(&self, query: &str) -> Option<u32> {
    let query = query.trim();
    if let Ok(id) = query.parse::<u32>() {
      return (self.names.is_empty() || self.names.contains_key(&id)).then_some(id);
    }
    self.keys.get(&lookup_key(query)).copied()
  }

  pub fn name(&self, id: u32) -> Option<&str> {
    self.names.get(&id).map(String::as_str)
  }
}
