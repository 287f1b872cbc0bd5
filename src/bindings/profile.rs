// Binding groups and the champion -> group mapping

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

pub const DEFAULT_SECTION: &str = "GameEvents";

fn default_section() -> String {
  DEFAULT_SECTION.to_string()
}

/// One key assignment, e.g. `evtCastSpell1 = [q]` in `GameEvents`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindingItem {
  #[serde(default = "default_section")]
  pub section: String,
  pub action: String,
  pub key: String,
}

impl BindingItem {
  pub fn new(action: impl Into<String>, key: impl Into<String>) -> Self {
    Self {
      section: default_section(),
      action: action.into(),
      key: key.into(),
    }
  }
}

/// Named binding groups.
pub type BindingProfiles = HashMap<String, Vec<BindingItem>>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChampionBindingSettings {
  pub champion_groups: HashMap<u32, String>,
  pub default_group: Option<String>,
}

impl ChampionBindingSettings {
  /// Group for `champion_id`, falling back to the default group.
  pub fn group_for(&self, champion_id: u32) -> Option<&str> {
    self
      .champion_groups
      .get(&champion_id)
      .or(self.default_group.as_ref())
      .map(String::as_str)
  }
}

/// Items grouped by section, in a stable order. Later items for the same
/// action win.
pub fn by_section(items: &[BindingItem]) -> BTreeMap<String, BTreeMap<String, String>> {
  let mut sections: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
  for item in items {
    sections
      .entry(item.section.clone())
      .or_default()
      .insert(item.action.clone(), item.key.clone());
  }
  sections
}
