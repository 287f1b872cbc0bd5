// Executes automation actions against the client with bounded retries

use reqwest::Method;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

use super::state_machine::{Action, ActionOutcome};
use crate::bindings::{BindingInjector, InjectOutcome};
use crate::error::Result;
use crate::lcu::{send_json, LcuApi};
use crate::retry::RetryPolicy;
use crate::runes::{ApplyOutcome, RunePage, RunePageApplier};
use crate::watcher::WindowSurface;

pub const READY_CHECK_ACCEPT_PATH: &str = "/lol-matchmaking/v1/ready-check/accept";
pub const MY_SELECTION_PATH: &str = "/lol-champ-select/v1/session/my-selection";
const ACCEPT_BUTTON: &str = "Accept";

pub fn champ_select_action_path(action_id: i64) -> String {
  format!("/lol-champ-select/v1/session/actions/{}", action_id)
}

enum Step {
  Done,
  Skip(String),
  Reject(String),
}

pub struct ActionDispatcher {
  api: Arc<dyn LcuApi>,
  retry: RetryPolicy,
  surface: Option<Arc<dyn WindowSurface>>,
  runes: Option<Arc<RunePageApplier>>,
  rune_pages: HashMap<u32, RunePage>,
  bindings: Option<Arc<BindingInjector>>,
}

impl ActionDispatcher {
  pub fn new(api: Arc<dyn LcuApi>, retry: RetryPolicy) -> Self {
    Self {
      api,
      retry,
      surface: None,
      runes: None,
      rune_pages: HashMap::new(),
      bindings: None,
    }
  }

  pub fn with_surface(mut self, surface: Arc<dyn WindowSurface>) -> Self {
    self.surface = Some(surface);
    self
  }

  pub fn with_runes(mut self, applier: Arc<RunePageApplier>, pages: HashMap<u32, RunePage>) -> Self {
    self.runes = Some(applier);
    self.rune_pages = pages;
    self
  }

  pub fn with_bindings(mut self, injector: Arc<BindingInjector>) -> Self {
    self.bindings = Some(injector);
    self
  }

  /// Run `action` until it completes, is skipped, fails fatally or the retry
  /// ceiling is reached. `via_ui` marks actions derived from screen
  /// observations, where the API may not be usable.
  pub async fn dispatch(&self, action: &Action, via_ui: bool) -> ActionOutcome {
    let max_attempts = self.retry.attempts();
    let mut attempt = 0;
    loop {
      attempt += 1;
      match self.execute_once(action, via_ui).await {
        Ok(Step::Done) => {
          tracing::info!("[Dispatcher] {} completed (attempt {})", action, attempt);
          return ActionOutcome::Completed;
        }
        Ok(Step::Skip(reason)) => return ActionOutcome::Skipped(reason),
        Ok(Step::Reject(reason)) => return ActionOutcome::Rejected(reason),
        Err(e) if e.is_fatal() => {
          return ActionOutcome::Failed {
            attempts: attempt,
            error: e.to_string(),
            fatal: true,
          }
        }
        Err(e) if attempt < max_attempts => {
          let delay = self.retry.delay_after(attempt);
          tracing::warn!(
            "[Dispatcher] {} attempt {}/{} failed: {}; retrying in {:?}",
            action,
            attempt,
            max_attempts,
            e,
            delay
          );
          tokio::time::sleep(delay).await;
        }
        Err(e) => {
          return ActionOutcome::Failed {
            attempts: attempt,
            error: e.to_string(),
            fatal: false,
          }
        }
      }
    }
  }

  async fn execute_once(&self, action: &Action, via_ui: bool) -> Result<Step> {
    let api = self.api.as_ref();
    match action {
      Action::AcceptReadyCheck { .. } => {
        if via_ui || !api.has_endpoint() {
          if let Some(surface) = &self.surface {
            surface.click(ACCEPT_BUTTON).await?;
            return Ok(Step::Done);
          }
        }
        api
          .request(Method::POST, READY_CHECK_ACCEPT_PATH, None)
          .await?;
        Ok(Step::Done)
      }
      Action::PickChampion {
        action_id,
        champion_id,
        complete,
        ..
      } => {
        if via_ui {
          return Ok(Step::Skip("champion pick needs the client API".into()));
        }
        let body = json!({ "championId": champion_id, "completed": complete });
        send_json(api, Method::PATCH, &champ_select_action_path(*action_id), body).await?;
        Ok(Step::Done)
      }
      Action::BanChampion {
        action_id,
        champion_id,
        ..
      } => {
        if via_ui {
          return Ok(Step::Skip("champion ban needs the client API".into()));
        }
        let body = json!({ "championId": champion_id, "completed": true });
        send_json(api, Method::PATCH, &champ_select_action_path(*action_id), body).await?;
        Ok(Step::Done)
      }
      Action::SetSummonerSpells {
        spell1_id,
        spell2_id,
        ..
      } => {
        if via_ui {
          return Ok(Step::Skip("summoner spells need the client API".into()));
        }
        let body = json!({ "spell1Id": spell1_id, "spell2Id": spell2_id });
        send_json(api, Method::PATCH, MY_SELECTION_PATH, body).await?;
        Ok(Step::Done)
      }
      Action::ApplyRunePage { champion_id, .. } => {
        let applier = match &self.runes {
          Some(applier) => applier,
          None => return Ok(Step::Skip("rune automation not configured".into())),
        };
        let page = match self.rune_pages.get(champion_id) {
          Some(page) => page,
          None => {
            return Ok(Step::Skip(format!(
              "no rune page saved for champion {}",
              champion_id
            )))
          }
        };
        match applier.apply(page).await? {
          ApplyOutcome::Applied { .. } => Ok(Step::Done),
          ApplyOutcome::Rejected(reason) => Ok(Step::Reject(reason)),
        }
      }
      Action::InjectBindings { champion_id, .. } => {
        let injector = match &self.bindings {
          Some(injector) => injector,
          None => return Ok(Step::Skip("binding injection not configured".into())),
        };
        match injector.apply(*champion_id).await? {
          InjectOutcome::Applied { .. } => Ok(Step::Done),
          InjectOutcome::Skipped(reason) => Ok(Step::Skip(reason)),
        }
      }
    }
  }
}
