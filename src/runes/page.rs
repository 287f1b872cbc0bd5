// Desired rune page and the rune catalog it is validated against

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::error::Result;
use crate::lcu::types::LcuPerkStyle;
use crate::lcu::{get_json, LcuApi};

pub const STYLES_PATH: &str = "/lol-perks/v1/styles";

/// Keystone + 3 primary minors, 2 secondary minors, 3 stat shards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunePage {
  pub name: String,
  pub primary_style_id: i64,
  pub keystone_id: i64,
  pub primary_minor_ids: [i64; 3],
  pub secondary_style_id: i64,
  pub secondary_minor_ids: [i64; 2],
  pub stat_mod_ids: [i64; 3],
}

impl RunePage {
  /// Ids in the order the client stores them.
  pub fn perk_ids(&self) -> Vec<i64> {
    let mut ids = Vec::with_capacity(9);
    ids.push(self.keystone_id);
    ids.extend_from_slice(&self.primary_minor_ids);
    ids.extend_from_slice(&self.secondary_minor_ids);
    ids.extend_from_slice(&self.stat_mod_ids);
    ids
  }

  /// Checks that need no catalog.
  pub fn check_shape(&self) -> std::result::Result<(), String> {
    if self.name.trim().is_empty() {
      return Err("rune page name is empty".into());
    }
    if self.secondary_style_id == self.primary_style_id {
      return Err(format!(
        "secondary path {} is the same as the primary path",
        self.secondary_style_id
      ));
    }
    let mut seen = HashSet::new();
    let runes = std::iter::once(&self.keystone_id)
      .chain(self.primary_minor_ids.iter())
      .chain(self.secondary_minor_ids.iter());
    for id in runes {
      if !seen.insert(*id) {
        return Err(format!("rune {} is selected twice", id));
      }
    }
    Ok(())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
  Keystone,
  Minor,
  StatMod,
}

impl SlotKind {
  fn from_lcu(raw: &str) -> Option<Self> {
    match raw {
      "kKeyStone" => Some(Self::Keystone),
      "kMixedRegularSplashable" | "kRegular" => Some(Self::Minor),
      "kStatMod" => Some(Self::StatMod),
      _ => None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuneSlot {
  pub kind: SlotKind,
  pub runes: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunePath {
  pub id: i64,
  pub name: String,
  pub slots: Vec<RuneSlot>,
}

impl RunePath {
  fn slots_of(&self, kind: SlotKind) -> Vec<&RuneSlot> {
    self.slots.iter().filter(|s| s.kind == kind).collect()
  }
}

/// Legal runes per path and slot.
#[derive(Debug, Clone, Default)]
pub struct RuneCatalog {
  paths: HashMap<i64, RunePath>,
}

impl RuneCatalog {
  pub fn new(paths: impl IntoIterator<Item = RunePath>) -> Self {
    Self {
      paths: paths.into_iter().map(|p| (p.id, p)).collect(),
    }
  }

  pub fn from_styles(styles: Vec<LcuPerkStyle>) -> Self {
    Self::new(styles.into_iter().map(|style| RunePath {
      id: style.id,
      name: style.name,
      slots: style
        .slots
        .into_iter()
        .filter_map(|slot| {
          SlotKind::from_lcu(&slot.kind).map(|kind| RuneSlot {
            kind,
            runes: slot.perks,
          })
        })
        .collect(),
    }))
  }

  pub async fn load_from_client(api: &dyn LcuApi) -> Result<Self> {
    let styles: Vec<LcuPerkStyle> = get_json(api, STYLES_PATH).await?;
    tracing::info!("[Runes] Loaded {} rune paths from the client", styles.len());
    Ok(Self::from_styles(styles))
  }

  pub fn path(&self, id: i64) -> Option<&RunePath> {
    self.paths.get(&id)
  }

  pub fn is_empty(&self) -> bool {
    self.paths.is_empty()
  }

  pub fn validate(&self, page: &RunePage) -> std::result::Result<(), String> {
    page.check_shape()?;
    let primary = self
      .path(page.primary_style_id)
      .ok_or_else(|| format!("unknown primary path {}", page.primary_style_id))?;
    let secondary = self
      .path(page.secondary_style_id)
      .ok_or_else(|| format!("unknown secondary path {}", page.secondary_style_id))?;

    let keystones = primary.slots_of(SlotKind::Keystone);
    let keystone_ok = keystones.len() == 1 && keystones[0].runes.contains(&page.keystone_id);
    if !keystone_ok {
      return Err(format!(
        "{} is not a keystone of {}",
        page.keystone_id, primary.name
      ));
    }

    let minors = primary.slots_of(SlotKind::Minor);
    if minors.len() < page.primary_minor_ids.len() {
      return Err(format!("{} has too few rune slots", primary.name));
    }
    for (slot, id) in minors.iter().zip(page.primary_minor_ids.iter()) {
      if !slot.runes.contains(id) {
        return Err(format!("rune {} does not fit its slot in {}", id, primary.name));
      }
    }

    let secondary_minors = secondary.slots_of(SlotKind::Minor);
    let mut used_slots = HashSet::new();
    for id in &page.secondary_minor_ids {
      let slot = secondary_minors
        .iter()
        .position(|s| s.runes.contains(id))
        .ok_or_else(|| format!("rune {} is not a minor rune of {}", id, secondary.name))?;
      if !used_slots.insert(slot) {
        return Err(format!(
          "secondary runes must come from two different rows of {}",
          secondary.name
        ));
      }
    }

    let stat_slots = primary.slots_of(SlotKind::StatMod);
    if !stat_slots.is_empty() {
      if stat_slots.len() != page.stat_mod_ids.len() {
        return Err("unexpected stat shard layout".into());
      }
      for (slot, id) in stat_slots.iter().zip(page.stat_mod_ids.iter()) {
        if !slot.runes.contains(id) {
          return Err(format!("stat shard {} does not fit its row", id));
        }
      }
    }
    Ok(())
  }
}
