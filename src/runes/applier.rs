// Writes a desired rune page into the client's page list

use reqwest::Method;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;

use super::page::{RuneCatalog, RunePage};
use crate::error::{PilotError, Result};
use crate::lcu::types::{LcuPerkInventory, LcuRunePage, LcuSummoner};
use crate::lcu::{get_json, send_json, LcuApi};

pub const PAGES_PATH: &str = "/lol-perks/v1/pages";
pub const INVENTORY_PATH: &str = "/lol-perks/v1/inventory";
pub const CURRENT_SUMMONER_PATH: &str = "/lol-summoner/v1/current-summoner";

pub fn page_path(id: i64) -> String {
  format!("{}/{}", PAGES_PATH, id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ApplyMode {
  /// An editable page already held exactly this selection.
  Unchanged,
  ReusedExisting,
  OverwroteCurrent,
  Created,
  OverwroteOldest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ApplyOutcome {
  Applied { page_id: Option<i64>, mode: ApplyMode },
  Rejected(String),
}

enum Target {
  Overwrite(LcuRunePage, ApplyMode),
  Create,
}

fn same_selection(existing: &LcuRunePage, page: &RunePage) -> bool {
  existing.name == page.name
    && existing.primary_style_id == page.primary_style_id
    && existing.sub_style_id == page.secondary_style_id
    && existing.selected_perk_ids == page.perk_ids()
}

/// Rune page body for a write. Fields the client added that are not modelled
/// here survive through `extra`.
fn page_body(base: Option<&LcuRunePage>, page: &RunePage) -> LcuRunePage {
  let mut body = base.cloned().unwrap_or_default();
  body.name = page.name.clone();
  body.primary_style_id = page.primary_style_id;
  body.sub_style_id = page.secondary_style_id;
  body.selected_perk_ids = page.perk_ids();
  body.current = true;
  if base.is_none() {
    body.id = None;
    body.last_modified = None;
    body.is_editable = true;
  }
  body
}

/// Applies rune pages with at most one apply in flight per account.
pub struct RunePageApplier {
  api: Arc<dyn LcuApi>,
  catalog: OnceCell<RuneCatalog>,
  fallback_max_pages: usize,
  locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl RunePageApplier {
  pub fn new(api: Arc<dyn LcuApi>, fallback_max_pages: usize) -> Self {
    Self {
      api,
      catalog: OnceCell::new(),
      fallback_max_pages: fallback_max_pages.max(1),
      locks: Mutex::new(HashMap::new()),
    }
  }

  /// Use a supplied catalog instead of loading it from the client.
  pub fn with_catalog(mut self, catalog: RuneCatalog) -> Self {
    self.catalog = OnceCell::new_with(Some(catalog));
    self
  }

  async fn catalog(&self) -> Result<&RuneCatalog> {
    self
      .catalog
      .get_or_try_init(|| RuneCatalog::load_from_client(self.api.as_ref()))
      .await
  }

  fn account_lock(&self, account: &str) -> Arc<tokio::sync::Mutex<()>> {
    let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
    locks
      .entry(account.to_string())
      .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
      .clone()
  }

  async fn max_pages(&self) -> usize {
    match get_json::<LcuPerkInventory>(self.api.as_ref(), INVENTORY_PATH).await {
      Ok(LcuPerkInventory {
        owned_page_count: Some(count),
      }) if count > 0 => count,
      Ok(_) => self.fallback_max_pages,
      Err(e) => {
        tracing::debug!("[Runes] Page inventory unavailable ({}), using {}", e, self.fallback_max_pages);
        self.fallback_max_pages
      }
    }
  }

  pub async fn apply(&self, page: &RunePage) -> Result<ApplyOutcome> {
    if let Err(reason) = page.check_shape() {
      tracing::warn!("[Runes] Rejected '{}': {}", page.name, reason);
      return Ok(ApplyOutcome::Rejected(reason));
    }
    if let Err(reason) = self.catalog().await?.validate(page) {
      tracing::warn!("[Runes] Rejected '{}': {}", page.name, reason);
      return Ok(ApplyOutcome::Rejected(reason));
    }

    let summoner: LcuSummoner = get_json(self.api.as_ref(), CURRENT_SUMMONER_PATH).await?;
    let lock = self.account_lock(&summoner.account_key());
    let _guard = lock.lock().await;

    let max_pages = self.max_pages().await;
    for attempt in 1..=2 {
      match self.write_once(page, max_pages).await {
        Err(PilotError::Conflict(reason)) => {
          tracing::warn!("[Runes] Conflict on attempt {}: {}", attempt, reason);
          if attempt == 2 {
            return Ok(ApplyOutcome::Rejected(format!("concurrent edit: {}", reason)));
          }
        }
        other => return other,
      }
    }
    Ok(ApplyOutcome::Rejected("concurrent edit".into()))
  }

  fn choose_target(
    &self,
    pages: &[LcuRunePage],
    page: &RunePage,
    max_pages: usize,
  ) -> std::result::Result<Option<Target>, String> {
    let editable: Vec<&LcuRunePage> = pages.iter().filter(|p| p.is_editable && p.id.is_some()).collect();

    if let Some(existing) = editable.iter().find(|p| same_selection(p, page)) {
      if existing.current {
        return Ok(None);
      }
      return Ok(Some(Target::Overwrite((*existing).clone(), ApplyMode::ReusedExisting)));
    }
    if let Some(current) = editable.iter().find(|p| p.current) {
      return Ok(Some(Target::Overwrite((*current).clone(), ApplyMode::OverwroteCurrent)));
    }
    if editable.len() < max_pages {
      return Ok(Some(Target::Create));
    }
    editable
      .iter()
      .filter(|p| !p.current)
      .min_by_key(|p| p.last_modified.unwrap_or(i64::MIN))
      .map(|oldest| Some(Target::Overwrite((*oldest).clone(), ApplyMode::OverwroteOldest)))
      .ok_or_else(|| "no editable rune page available".to_string())
  }

  async fn write_once(&self, page: &RunePage, max_pages: usize) -> Result<ApplyOutcome> {
    let api = self.api.as_ref();
    let pages: Vec<LcuRunePage> = get_json(api, PAGES_PATH).await?;

    let target = match self.choose_target(&pages, page, max_pages) {
      Ok(Some(target)) => target,
      Ok(None) => {
        tracing::info!("[Runes] '{}' is already the current page", page.name);
        let id = pages.iter().find(|p| p.current).and_then(|p| p.id);
        return Ok(ApplyOutcome::Applied {
          page_id: id,
          mode: ApplyMode::Unchanged,
        });
      }
      Err(reason) => return Ok(ApplyOutcome::Rejected(reason)),
    };

    match target {
      Target::Create => {
        let body = serde_json::to_value(page_body(None, page))?;
        let response = send_json(api, Method::POST, PAGES_PATH, body)
          .await
          .map_err(conflict_on_409)?;
        let created = response.json::<LcuRunePage>().ok().and_then(|p| p.id);
        tracing::info!("[Runes] Created page '{}' ({:?})", page.name, created);
        Ok(ApplyOutcome::Applied {
          page_id: created,
          mode: ApplyMode::Created,
        })
      }
      Target::Overwrite(existing, mode) => {
        let id = existing.id.ok_or_else(|| PilotError::Conflict("page without id".into()))?;
        let path = page_path(id);
        // Version check: the page must not have changed since it was listed
        let fresh: LcuRunePage = match get_json(api, &path).await {
          Ok(fresh) => fresh,
          Err(PilotError::Api { status: 404, .. }) => {
            return Err(PilotError::Conflict(format!("page {} disappeared", id)))
          }
          Err(e) => return Err(e),
        };
        if fresh.last_modified != existing.last_modified {
          return Err(PilotError::Conflict(format!("page {} was modified", id)));
        }
        let body = serde_json::to_value(page_body(Some(&fresh), page))?;
        send_json(api, Method::PUT, &path, body)
          .await
          .map_err(conflict_on_409)?;
        tracing::info!("[Runes] Wrote '{}' into page {} ({:?})", page.name, id, mode);
        Ok(ApplyOutcome::Applied {
          page_id: Some(id),
          mode,
        })
      }
    }
  }
}

fn conflict_on_409(err: PilotError) -> PilotError {
  match err {
    PilotError::Api {
      status: 409,
      path,
      body,
    } => PilotError::Conflict(format!("{}: {}", path, body)),
    other => other,
  }
}
