// Normalized client events shared by every acquisition strategy

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ChampSelectActionKind {
  Pick,
  Ban,
}

impl ChampSelectActionKind {
  pub fn from_lcu(raw: &str) -> Option<Self> {
    match raw {
      "pick" => Some(Self::Pick),
      "ban" => Some(Self::Ban),
      _ => None,
    }
  }
}

impl fmt::Display for ChampSelectActionKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Pick => write!(f, "pick"),
      Self::Ban => write!(f, "ban"),
    }
  }
}

/// Every variant carries the ids consumers need to stay idempotent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum GameEvent {
  ReadyCheckReceived {
    ready_check_id: String,
  },
  ReadyCheckAccepted {
    ready_check_id: String,
  },
  ReadyCheckDeclined {
    ready_check_id: String,
  },
  ReadyCheckExpired {
    ready_check_id: String,
  },
  ChampSelectPhaseEntered {
    session_id: String,
  },
  ChampSelectActionAvailable {
    session_id: String,
    action_id: i64,
    kind: ChampSelectActionKind,
    champion_id: Option<u32>,
  },
  /// The client confirmed the local player's pick.
  ChampionLocked {
    session_id: String,
    champion_id: u32,
  },
  TimerTick {
    session_id: String,
    phase: String,
    remaining_ms: i64,
  },
  SessionEnded {
    session_id: Option<String>,
  },
}

impl GameEvent {
  pub fn session_id(&self) -> Option<&str> {
    match self {
      Self::ChampSelectPhaseEntered { session_id }
      | Self::ChampSelectActionAvailable { session_id, .. }
      | Self::ChampionLocked { session_id, .. }
      | Self::TimerTick { session_id, .. } => Some(session_id),
      Self::SessionEnded { session_id } => session_id.as_deref(),
      _ => None,
    }
  }

  pub fn name(&self) -> &'static str {
    match self {
      Self::ReadyCheckReceived { .. } => "ReadyCheckReceived",
      Self::ReadyCheckAccepted { .. } => "ReadyCheckAccepted",
      Self::ReadyCheckDeclined { .. } => "ReadyCheckDeclined",
      Self::ReadyCheckExpired { .. } => "ReadyCheckExpired",
      Self::ChampSelectPhaseEntered { .. } => "ChampSelectPhaseEntered",
      Self::ChampSelectActionAvailable { .. } => "ChampSelectActionAvailable",
      Self::ChampionLocked { .. } => "ChampionLocked",
      Self::TimerTick { .. } => "TimerTick",
      Self::SessionEnded { .. } => "SessionEnded",
    }
  }
}
