// Event normalizer: raw payloads from any strategy -> GameEvent

use serde_json::Value;

use super::polling::{CHAMP_SELECT_SESSION_PATH, READY_CHECK_PATH};
use super::push::parse_wamp_event;
use super::{ConcreteStrategy, RawEvent, ScreenObservation};
use crate::events::{ChampSelectActionKind, GameEvent};
use crate::lcu::status::PHASE_PATH;
use crate::lcu::types::{LcuChampSelectSession, LcuReadyCheck};
use crate::lcu::{LcuEventEnvelope, LcuEventType};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedEvent {
  pub event: GameEvent,
  pub source: ConcreteStrategy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadyCheckOutcome {
  Pending,
  Accepted,
  Declined,
  Expired,
}

#[derive(Debug)]
struct ReadyCheckTrack {
  id: String,
  timer: f64,
  outcome: ReadyCheckOutcome,
  /// The resource disappeared; the next InProgress observation is a new check.
  closed: bool,
}

#[derive(Debug)]
struct SessionTrack {
  id: String,
  locked: Option<u32>,
  timer: Option<(String, i64)>,
}

/// Stateful translation of raw payloads. Ready-check ids are synthesized
/// because the client does not expose one; session ids come from the
/// champ-select chat room, then the game id.
#[derive(Debug, Default)]
pub struct EventNormalizer {
  phase: String,
  ready_check: Option<ReadyCheckTrack>,
  session: Option<SessionTrack>,
  ready_check_counter: u64,
  session_counter: u64,
}

impl EventNormalizer {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn normalize(&mut self, raw: RawEvent) -> Vec<NormalizedEvent> {
    let source = raw.source();
    let events = match raw {
      RawEvent::Frame(text) => match parse_wamp_event(&text) {
        Some(envelope) => self.envelope(&envelope),
        None => {
          if !is_control_frame(&text) {
            tracing::warn!("[Normalizer] Dropping malformed push frame ({} bytes)", text.len());
          }
          Vec::new()
        }
      },
      RawEvent::Envelope(envelope) => self.envelope(&envelope),
      RawEvent::Screen(observation) => self.screen(&observation),
    };
    events
      .into_iter()
      .map(|event| NormalizedEvent { event, source })
      .collect()
  }

  /// The client went away: close whatever was open.
  pub fn client_lost(&mut self) -> Vec<GameEvent> {
    let mut events = Vec::new();
    self.expire_ready_check(&mut events);
    self.end_session(&mut events);
    self.phase.clear();
    events
  }

  fn envelope(&mut self, envelope: &LcuEventEnvelope) -> Vec<GameEvent> {
    let mut events = Vec::new();
    let deleted = envelope.event_type == LcuEventType::Delete;
    match envelope.uri.as_str() {
      PHASE_PATH => {
        let phase = if deleted {
          "None"
        } else {
          envelope.data.as_str().unwrap_or("None")
        };
        self.phase_changed(phase, &mut events);
      }
      READY_CHECK_PATH => {
        if deleted || envelope.data.is_null() {
          self.expire_ready_check(&mut events);
        } else {
          match serde_json::from_value::<LcuReadyCheck>(envelope.data.clone()) {
            Ok(check) => self.ready_check_update(&check, &mut events),
            Err(e) => tracing::warn!("[Normalizer] Dropping malformed ready-check payload: {}", e),
          }
        }
      }
      CHAMP_SELECT_SESSION_PATH => {
        if deleted || envelope.data.is_null() {
          self.end_session(&mut events);
        } else {
          match serde_json::from_value::<LcuChampSelectSession>(envelope.data.clone()) {
            Ok(session) => self.session_update(&session, &mut events),
            Err(e) => tracing::warn!("[Normalizer] Dropping malformed session payload: {}", e),
          }
        }
      }
      _ => {}
    }
    events
  }

  fn phase_changed(&mut self, phase: &str, events: &mut Vec<GameEvent>) {
    if self.phase == phase {
      return;
    }
    tracing::info!(
      "[Normalizer] Phase {} -> {}",
      if self.phase.is_empty() { "None" } else { &self.phase },
      phase
    );
    let left_champ_select = self.phase == "ChampSelect";
    self.phase = phase.to_string();
    if left_champ_select {
      self.end_session(events);
    }
    if !matches!(phase, "ReadyCheck" | "Matchmaking" | "ChampSelect") {
      self.expire_ready_check(events);
    }
  }

  fn ready_check_update(&mut self, check: &LcuReadyCheck, events: &mut Vec<GameEvent>) {
    let fresh = match &self.ready_check {
      None => true,
      Some(track) => {
        // The client timer counts up; a smaller value means a new ready check
        track.closed || check.timer < track.timer
      }
    };

    if check.state == "InProgress" && fresh {
      self.ready_check_counter += 1;
      self.ready_check = Some(ReadyCheckTrack {
        id: format!("rc-{}", self.ready_check_counter),
        timer: check.timer,
        outcome: ReadyCheckOutcome::Pending,
        closed: false,
      });
    }

    let track = match self.ready_check.as_mut() {
      Some(track) => track,
      None => return,
    };
    track.timer = check.timer;
    if track.outcome != ReadyCheckOutcome::Pending {
      return;
    }

    let outcome = match (check.state.as_str(), check.player_response.as_str()) {
      (_, "Declined") => ReadyCheckOutcome::Declined,
      ("InProgress", "Accepted") | ("EveryoneReady", _) => ReadyCheckOutcome::Accepted,
      ("InProgress", _) => ReadyCheckOutcome::Pending,
      _ => ReadyCheckOutcome::Expired,
    };
    let ready_check_id = track.id.clone();
    track.outcome = outcome;
    events.push(match outcome {
      ReadyCheckOutcome::Pending => GameEvent::ReadyCheckReceived { ready_check_id },
      ReadyCheckOutcome::Accepted => GameEvent::ReadyCheckAccepted { ready_check_id },
      ReadyCheckOutcome::Declined => GameEvent::ReadyCheckDeclined { ready_check_id },
      ReadyCheckOutcome::Expired => GameEvent::ReadyCheckExpired { ready_check_id },
    });
  }

  fn expire_ready_check(&mut self, events: &mut Vec<GameEvent>) {
    if let Some(track) = self.ready_check.as_mut() {
      if track.outcome == ReadyCheckOutcome::Pending {
        track.outcome = ReadyCheckOutcome::Expired;
        events.push(GameEvent::ReadyCheckExpired {
          ready_check_id: track.id.clone(),
        });
      }
      track.closed = true;
    }
  }

  fn session_id_of(&mut self, session: &LcuChampSelectSession) -> String {
    let chat = session
      .chat_details
      .as_ref()
      .and_then(|c| c.multi_user_chat_id.clone())
      .filter(|id| !id.is_empty());
    if let Some(id) = chat {
      return id;
    }
    if session.game_id != 0 {
      return session.game_id.to_string();
    }
    if let Some(open) = &self.session {
      return open.id.clone();
    }
    self.session_counter += 1;
    format!("cs-{}", self.session_counter)
  }

  fn open_session(&mut self, id: String, events: &mut Vec<GameEvent>) {
    let current = self.session.as_ref().map(|s| s.id.as_str());
    if current == Some(id.as_str()) {
      return;
    }
    if current.is_some() {
      self.end_session(events);
    }
    tracing::info!("[Normalizer] Champ select session {} started", id);
    events.push(GameEvent::ChampSelectPhaseEntered {
      session_id: id.clone(),
    });
    self.session = Some(SessionTrack {
      id,
      locked: None,
      timer: None,
    });
  }

  fn session_update(&mut self, session: &LcuChampSelectSession, events: &mut Vec<GameEvent>) {
    let id = self.session_id_of(session);
    self.open_session(id.clone(), events);
    let track = match self.session.as_mut() {
      Some(track) => track,
      None => return,
    };

    for action in session.actions.iter().flatten() {
      if action.actor_cell_id != session.local_player_cell_id {
        continue;
      }
      let kind = match ChampSelectActionKind::from_lcu(&action.kind) {
        Some(kind) => kind,
        None => continue,
      };
      let champion_id = u32::try_from(action.champion_id).ok().filter(|c| *c > 0);

      if action.is_in_progress && !action.completed {
        events.push(GameEvent::ChampSelectActionAvailable {
          session_id: id.clone(),
          action_id: action.id,
          kind,
          champion_id,
        });
      }

      if kind == ChampSelectActionKind::Pick && action.completed {
        if let Some(champion_id) = champion_id {
          if track.locked != Some(champion_id) {
            track.locked = Some(champion_id);
            events.push(GameEvent::ChampionLocked {
              session_id: id.clone(),
              champion_id,
            });
          }
        }
      }
    }

    if let Some(timer) = &session.timer {
      // One tick per phase change or elapsed second
      let current = (timer.phase.clone(), timer.adjusted_time_left_in_phase / 1000);
      if track.timer.as_ref() != Some(&current) {
        track.timer = Some(current);
        events.push(GameEvent::TimerTick {
          session_id: id,
          phase: timer.phase.clone(),
          remaining_ms: timer.adjusted_time_left_in_phase,
        });
      }
    }
  }

  fn end_session(&mut self, events: &mut Vec<GameEvent>) {
    if let Some(track) = self.session.take() {
      tracing::info!("[Normalizer] Champ select session {} ended", track.id);
      events.push(GameEvent::SessionEnded {
        session_id: Some(track.id),
      });
    }
  }

  fn screen(&mut self, observation: &ScreenObservation) -> Vec<GameEvent> {
    let mut events = Vec::new();
    let ready_check_visible = observation.has_button("Accept")
      && (observation.has_button("Decline") || observation.has_text("match found"));
    let champ_select_visible = observation.has_button("Lock In")
      || observation.has_text("choose your champion")
      || observation.has_text("ban a champion");

    if ready_check_visible {
      let pending = self
        .ready_check
        .as_ref()
        .map(|t| t.outcome == ReadyCheckOutcome::Pending)
        .unwrap_or(false);
      if !pending {
        self.ready_check_counter += 1;
        self.ready_check = Some(ReadyCheckTrack {
          id: format!("ui-rc-{}", self.ready_check_counter),
          timer: 0.0,
          outcome: ReadyCheckOutcome::Pending,
          closed: false,
        });
      }
      if let Some(track) = &self.ready_check {
        events.push(GameEvent::ReadyCheckReceived {
          ready_check_id: track.id.clone(),
        });
      }
    } else if let Some(track) = self.ready_check.as_mut() {
      if track.outcome == ReadyCheckOutcome::Pending {
        let accepted = champ_select_visible;
        track.outcome = if accepted {
          ReadyCheckOutcome::Accepted
        } else {
          ReadyCheckOutcome::Expired
        };
        let ready_check_id = track.id.clone();
        events.push(if accepted {
          GameEvent::ReadyCheckAccepted { ready_check_id }
        } else {
          GameEvent::ReadyCheckExpired { ready_check_id }
        });
      }
    }

    if champ_select_visible {
      if self.session.is_none() {
        self.session_counter += 1;
        let id = format!("ui-cs-{}", self.session_counter);
        self.open_session(id, &mut events);
      }
    } else {
      self.end_session(&mut events);
    }
    events
  }
}

/// WAMP welcome/subscribe acknowledgements carry no event.
fn is_control_frame(text: &str) -> bool {
  serde_json::from_str::<Value>(text)
    .ok()
    .and_then(|v| v.as_array().and_then(|a| a.first().and_then(|op| op.as_u64())))
    .map(|op| op != 8)
    .unwrap_or(text.trim().is_empty())
}
