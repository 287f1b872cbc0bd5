// Automation state machine: normalized events in, keyed actions out

use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::fmt;

use super::settings::AutomationSettings;
use crate::catalog::ChampionCatalog;
use crate::events::{ChampSelectActionKind, GameEvent};

const REMEMBERED_READY_CHECKS: usize = 8;
const REMEMBERED_SESSIONS: usize = 16;

fn resolve_champion(catalog: &ChampionCatalog, label: &str, query: &Option<String>) -> Option<u32> {
  let query = query.as_deref()?.trim();
  if query.is_empty() {
    return None;
  }
  let id = catalog.resolve(query);
  if id.is_none() {
    tracing::warn!("[Automation] Unknown champion to {}: '{}'", label, query);
  }
  id
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ErrorScope {
  /// Retry ceiling exceeded for one session or ready check.
  Session(String),
  /// Authentication rejected; only a manual reset leaves this.
  Fatal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum AutomationState {
  Idle,
  ReadyCheckPending { ready_check_id: String, accepted: bool },
  ChampSelectActive { session_id: String },
  Done { session_id: String },
  Error { scope: ErrorScope, reason: String },
}

impl AutomationState {
  pub fn name(&self) -> &'static str {
    match self {
      Self::Idle => "Idle",
      Self::ReadyCheckPending { .. } => "ReadyCheckPending",
      Self::ChampSelectActive { .. } => "ChampSelectActive",
      Self::Done { .. } => "Done",
      Self::Error { .. } => "Error",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Action {
  AcceptReadyCheck {
    ready_check_id: String,
  },
  PickChampion {
    session_id: String,
    action_id: i64,
    champion_id: u32,
    /// Lock the pick in instead of hovering.
    complete: bool,
  },
  BanChampion {
    session_id: String,
    action_id: i64,
    champion_id: u32,
  },
  SetSummonerSpells {
    session_id: String,
    spell1_id: u32,
    spell2_id: u32,
  },
  ApplyRunePage {
    session_id: String,
    champion_id: u32,
  },
  InjectBindings {
    session_id: String,
    champion_id: u32,
  },
}

/// Identity an action is deduplicated by.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ActionKey {
  ReadyCheck(String),
  ChampSelect(String, i64),
  Once(String, &'static str),
}

impl Action {
  pub fn key(&self) -> ActionKey {
    match self {
      Self::AcceptReadyCheck { ready_check_id } => ActionKey::ReadyCheck(ready_check_id.clone()),
      Self::PickChampion {
        session_id,
        action_id,
        ..
      }
      | Self::BanChampion {
        session_id,
        action_id,
        ..
      } => ActionKey::ChampSelect(session_id.clone(), *action_id),
      Self::SetSummonerSpells { session_id, .. } => ActionKey::Once(session_id.clone(), "spells"),
      Self::ApplyRunePage { session_id, .. } => ActionKey::Once(session_id.clone(), "runes"),
      Self::InjectBindings { session_id, .. } => ActionKey::Once(session_id.clone(), "bindings"),
    }
  }

  /// Session id, or the ready check id for an accept.
  pub fn scope_id(&self) -> &str {
    match self {
      Self::AcceptReadyCheck { ready_check_id } => ready_check_id,
      Self::PickChampion { session_id, .. }
      | Self::BanChampion { session_id, .. }
      | Self::SetSummonerSpells { session_id, .. }
      | Self::ApplyRunePage { session_id, .. }
      | Self::InjectBindings { session_id, .. } => session_id,
    }
  }

  pub fn name(&self) -> &'static str {
    match self {
      Self::AcceptReadyCheck { .. } => "AcceptReadyCheck",
      Self::PickChampion { .. } => "PickChampion",
      Self::BanChampion { .. } => "BanChampion",
      Self::SetSummonerSpells { .. } => "SetSummonerSpells",
      Self::ApplyRunePage { .. } => "ApplyRunePage",
      Self::InjectBindings { .. } => "InjectBindings",
    }
  }
}

impl fmt::Display for Action {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}({})", self.name(), self.scope_id())
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ActionOutcome {
  Completed,
  Skipped(String),
  /// The executor refused the input; not retried and not an error state.
  Rejected(String),
  Failed {
    attempts: u32,
    error: String,
    fatal: bool,
  },
}

/// A failed or rejected action, named with its session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionFailure {
  pub action: Action,
  pub session: String,
  pub attempts: u32,
  pub error: String,
}

impl fmt::Display for ActionFailure {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "{} failed for {} after {} attempt(s): {}",
      self.action.name(),
      self.session,
      self.attempts,
      self.error
    )
  }
}

/// Strictly sequential: every event and every action outcome goes through
/// `&mut self` in arrival order.
#[derive(Debug)]
pub struct AutomationStateMachine {
  settings: AutomationSettings,
  pick_id: Option<u32>,
  ban_id: Option<u32>,
  state: AutomationState,
  issued: HashSet<ActionKey>,
  ready_checks: VecDeque<String>,
  locked_sessions: HashSet<String>,
  ended_sessions: VecDeque<String>,
}

impl AutomationStateMachine {
  pub fn new(settings: AutomationSettings, catalog: &ChampionCatalog) -> Self {
    let pick_id = resolve_champion(catalog, "pick", &settings.champion_to_pick);
    let ban_id = resolve_champion(catalog, "ban", &settings.champion_to_ban);

    Self {
      settings,
      pick_id,
      ban_id,
      state: AutomationState::Idle,
      issued: HashSet::new(),
      ready_checks: VecDeque::new(),
      locked_sessions: HashSet::new(),
      ended_sessions: VecDeque::new(),
    }
  }

  /// Re-resolve the configured champions, e.g. once the client's catalog
  /// has been loaded. Session state is kept.
  pub fn update_catalog(&mut self, catalog: &ChampionCatalog) {
    self.pick_id = resolve_champion(catalog, "pick", &self.settings.champion_to_pick);
    self.ban_id = resolve_champion(catalog, "ban", &self.settings.champion_to_ban);
  }

  pub fn state(&self) -> &AutomationState {
    &self.state
  }

  pub fn settings(&self) -> &AutomationSettings {
    &self.settings
  }

  /// True once credentials were rejected; only `reset` leaves this state.
  pub fn in_fatal_error(&self) -> bool {
    matches!(
      self.state,
      AutomationState::Error {
        scope: ErrorScope::Fatal,
        ..
      }
    )
  }

  /// Leave any state, including a fatal error.
  pub fn reset(&mut self) {
    tracing::info!("[Automation] Reset from {}", self.state.name());
    self.state = AutomationState::Idle;
    self.issued.clear();
    self.ready_checks.clear();
    self.locked_sessions.clear();
    self.ended_sessions.clear();
  }

  fn issue(&mut self, action: Action, out: &mut Vec<Action>) {
    if self.issued.insert(action.key()) {
      tracing::info!("[Automation] Issuing {}", action);
      out.push(action);
    }
  }

  fn set_state(&mut self, next: AutomationState) {
    if self.state != next {
      tracing::debug!("[Automation] {} -> {}", self.state.name(), next.name());
      self.state = next;
    }
  }

  fn session_error(&self) -> Option<&str> {
    match &self.state {
      AutomationState::Error {
        scope: ErrorScope::Session(id),
        ..
      } => Some(id),
      _ => None,
    }
  }

  pub fn handle(&mut self, event: &GameEvent) -> Vec<Action> {
    let mut actions = Vec::new();
    if self.in_fatal_error() {
      tracing::debug!("[Automation] Ignoring {} while in fatal error", event.name());
      return actions;
    }

    match event {
      GameEvent::ReadyCheckReceived { ready_check_id } => {
        self.ready_check_received(ready_check_id, &mut actions)
      }
      GameEvent::ReadyCheckAccepted { ready_check_id } => {
        if let AutomationState::ReadyCheckPending {
          ready_check_id: pending,
          accepted,
        } = &mut self.state
        {
          if pending == ready_check_id {
            *accepted = true;
          }
        }
      }
      GameEvent::ReadyCheckDeclined { ready_check_id }
      | GameEvent::ReadyCheckExpired { ready_check_id } => {
        let pending = matches!(
          &self.state,
          AutomationState::ReadyCheckPending { ready_check_id: id, .. } if id == ready_check_id
        );
        if pending {
          self.set_state(AutomationState::Idle);
        }
      }
      GameEvent::ChampSelectPhaseEntered { session_id } => {
        self.enter_session(session_id, &mut actions);
      }
      GameEvent::ChampSelectActionAvailable {
        session_id,
        action_id,
        kind,
        ..
      } => {
        if self.enter_session(session_id, &mut actions) {
          self.action_available(session_id, *action_id, *kind, &mut actions);
        }
      }
      GameEvent::ChampionLocked {
        session_id,
        champion_id,
      } => {
        if self.enter_session(session_id, &mut actions) {
          self.locked_sessions.insert(session_id.clone());
          if self.settings.enabled {
            self.issue(
              Action::ApplyRunePage {
                session_id: session_id.clone(),
                champion_id: *champion_id,
              },
              &mut actions,
            );
            self.issue(
              Action::InjectBindings {
                session_id: session_id.clone(),
                champion_id: *champion_id,
              },
              &mut actions,
            );
          }
        }
      }
      GameEvent::TimerTick { .. } => {}
      GameEvent::SessionEnded { session_id } => self.session_ended(session_id.as_deref()),
    }
    actions
  }

  fn ready_check_received(&mut self, ready_check_id: &str, actions: &mut Vec<Action>) {
    if self.session_error().is_some() {
      tracing::info!("[Automation] New ready check clears the session error");
    }
    let already_pending = matches!(
      &self.state,
      AutomationState::ReadyCheckPending { ready_check_id: id, .. } if id == ready_check_id
    );
    if !already_pending {
      if self.ready_checks.iter().any(|id| id == ready_check_id) {
        // A late re-delivery of a check that has already been resolved
        return;
      }
      self.ready_checks.push_back(ready_check_id.to_string());
      while self.ready_checks.len() > REMEMBERED_READY_CHECKS {
        if let Some(old) = self.ready_checks.pop_front() {
          self.issued.remove(&ActionKey::ReadyCheck(old));
        }
      }
      self.set_state(AutomationState::ReadyCheckPending {
        ready_check_id: ready_check_id.to_string(),
        accepted: false,
      });
    }

    if self.settings.enabled && self.settings.auto_accept {
      self.issue(
        Action::AcceptReadyCheck {
          ready_check_id: ready_check_id.to_string(),
        },
        actions,
      );
    }
  }

  /// Make `session_id` the active session. Returns false when events for it
  /// must be ignored.
  fn enter_session(&mut self, session_id: &str, actions: &mut Vec<Action>) -> bool {
    if self.ended_sessions.iter().any(|id| id == session_id) {
      return false;
    }
    if self.session_error() == Some(session_id) {
      return false;
    }
    if let AutomationState::ChampSelectActive { session_id: active } = &self.state {
      if active == session_id {
        return true;
      }
    }

    tracing::info!("[Automation] Champ select session {}", session_id);
    self.set_state(AutomationState::ChampSelectActive {
      session_id: session_id.to_string(),
    });
    if self.settings.enabled {
      if let Some((spell1_id, spell2_id)) = self.settings.spells() {
        self.issue(
          Action::SetSummonerSpells {
            session_id: session_id.to_string(),
            spell1_id,
            spell2_id,
          },
          actions,
        );
      }
    }
    true
  }

  fn action_available(
    &mut self,
    session_id: &str,
    action_id: i64,
    kind: ChampSelectActionKind,
    actions: &mut Vec<Action>,
  ) {
    if !self.settings.enabled {
      return;
    }
    match kind {
      ChampSelectActionKind::Pick => {
        let champion_id = match self.pick_id {
          Some(id) => id,
          None => return,
        };
        if self.locked_sessions.contains(session_id) {
          return;
        }
        self.issue(
          Action::PickChampion {
            session_id: session_id.to_string(),
            action_id,
            champion_id,
            complete: self.settings.lock_in,
          },
          actions,
        );
      }
      ChampSelectActionKind::Ban => {
        if let Some(champion_id) = self.ban_id {
          self.issue(
            Action::BanChampion {
              session_id: session_id.to_string(),
              action_id,
              champion_id,
            },
            actions,
          );
        }
      }
    }
  }

  fn session_ended(&mut self, session_id: Option<&str>) {
    let active = match &self.state {
      AutomationState::ChampSelectActive { session_id: active } => Some(active.clone()),
      _ => None,
    };
    let ended = match (session_id, active) {
      (Some(id), _) => id.to_string(),
      (None, Some(active)) => active,
      (None, None) => return,
    };

    if let AutomationState::ChampSelectActive { session_id: active } = &self.state {
      if *active == ended {
        tracing::info!("[Automation] Session {} done", ended);
        self.set_state(AutomationState::Done {
          session_id: ended.clone(),
        });
        self.set_state(AutomationState::Idle);
      }
    }

    self.issued.retain(|key| match key {
      ActionKey::ChampSelect(id, _) | ActionKey::Once(id, _) => *id != ended,
      ActionKey::ReadyCheck(_) => true,
    });
    self.locked_sessions.remove(&ended);
    if !self.ended_sessions.contains(&ended) {
      self.ended_sessions.push_back(ended);
      while self.ended_sessions.len() > REMEMBERED_SESSIONS {
        self.ended_sessions.pop_front();
      }
    }
  }

  /// Feed back the result of a dispatched action. Returns the failure to
  /// surface, if any.
  pub fn record_outcome(&mut self, action: &Action, outcome: &ActionOutcome) -> Option<ActionFailure> {
    match outcome {
      ActionOutcome::Completed => {
        match action {
          Action::PickChampion {
            session_id,
            complete: true,
            ..
          } => {
            self.locked_sessions.insert(session_id.clone());
          }
          Action::AcceptReadyCheck { ready_check_id } => {
            if let AutomationState::ReadyCheckPending {
              ready_check_id: pending,
              accepted,
            } = &mut self.state
            {
              if pending == ready_check_id {
                *accepted = true;
              }
            }
          }
          _ => {}
        }
        None
      }
      ActionOutcome::Skipped(reason) => {
        tracing::info!("[Automation] {} skipped: {}", action, reason);
        None
      }
      ActionOutcome::Rejected(reason) => {
        tracing::warn!("[Automation] {} rejected: {}", action, reason);
        Some(ActionFailure {
          action: action.clone(),
          session: action.scope_id().to_string(),
          attempts: 1,
          error: reason.clone(),
        })
      }
      ActionOutcome::Failed {
        attempts,
        error,
        fatal,
      } => {
        let failure = ActionFailure {
          action: action.clone(),
          session: action.scope_id().to_string(),
          attempts: *attempts,
          error: error.clone(),
        };
        tracing::error!("[Automation] {}", failure);
        if *fatal {
          self.set_state(AutomationState::Error {
            scope: ErrorScope::Fatal,
            reason: failure.to_string(),
          });
        } else if self.concerns_current(action) {
          self.set_state(AutomationState::Error {
            scope: ErrorScope::Session(action.scope_id().to_string()),
            reason: failure.to_string(),
          });
        }
        Some(failure)
      }
    }
  }

  /// Whether a failed action belongs to what the machine is doing now.
  fn concerns_current(&self, action: &Action) -> bool {
    match (&self.state, action) {
      (
        AutomationState::ReadyCheckPending { ready_check_id, .. },
        Action::AcceptReadyCheck {
          ready_check_id: failed,
        },
      ) => ready_check_id == failed,
      (AutomationState::ChampSelectActive { session_id }, action) => {
        !matches!(action, Action::AcceptReadyCheck { .. }) && session_id == action.scope_id()
      }
      _ => false,
    }
  }
}
