use serde::{Deserialize, Serialize};

// User choices the automation acts on

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomationSettings {
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Champion name, alias or numeric id.
  #[serde(default)]
  pub champion_to_pick: Option<String>,
  #[serde(default)]
  pub champion_to_ban: Option<String>,
  #[serde(default)]
  pub spell1_id: Option<u32>,
  #[serde(default)]
  pub spell2_id: Option<u32>,
  #[serde(default = "default_true")]
  pub auto_accept: bool,
  /// Complete the pick action; when false the champion is only hovered.
  #[serde(default = "default_true")]
  pub lock_in: bool,
}

fn default_true() -> bool {
  true
}

impl Default for AutomationSettings {
  fn default() -> Self {
    Self {
      enabled: true,
      champion_to_pick: None,
      champion_to_ban: None,
      spell1_id: None,
      spell2_id: None,
      auto_accept: true,
      lock_in: true,
    }
  }
}

impl AutomationSettings {
  pub fn spells(&self) -> Option<(u32, u32)> {
    match (self.spell1_id, self.spell2_id) {
      (Some(a), Some(b)) if a != b => Some((a, b)),
      _ => None,
    }
  }
}
