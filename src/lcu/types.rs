// Types for the local client connection and partial mirrors of LCU payloads.
//
// The LCU schema drifts between patches, so every wire struct only names the
// fields the engine reads and defaults the rest.

use base64::{engine::general_purpose, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;

pub const LCU_USERNAME: &str = "riot";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
  Http,
  Https,
}

impl Protocol {
  pub fn parse(raw: &str) -> Option<Self> {
    match raw.trim() {
      "https" => Some(Self::Https),
      "http" => Some(Self::Http),
      _ => None,
    }
  }

  fn ws_scheme(&self) -> &'static str {
    match self {
      Self::Https => "wss",
      Self::Http => "ws",
    }
  }

  fn http_scheme(&self) -> &'static str {
    match self {
      Self::Https => "https",
      Self::Http => "http",
    }
  }
}

/// Fields of a lockfile in their fixed order: `name:pid:port:password:protocol`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockfileData {
  pub process_name: String,
  pub pid: u32,
  pub port: u16,
  pub password: String,
  pub protocol: Protocol,
}

/// Parse lockfile content. Anything that is not exactly five well-formed
/// fields yields `None`.
pub fn parse_lockfile(content: &str) -> Option<LockfileData> {
  let line = content.trim_end_matches(&['\r', '\n', '\0', ' '][..]);
  if line.is_empty() || line.contains('\n') {
    return None;
  }

  let parts: Vec<&str> = line.split(':').collect();
  if parts.len() != 5 {
    return None;
  }

  let process_name = parts[0].trim();
  let password = parts[3];
  if process_name.is_empty() || password.is_empty() {
    return None;
  }

  let pid = parts[1].trim().parse::<u32>().ok()?;
  let port = parts[2].trim().parse::<u16>().ok()?;
  if port == 0 {
    return None;
  }
  let protocol = Protocol::parse(parts[4])?;

  Some(LockfileData {
    process_name: process_name.to_string(),
    pid,
    port,
    password: password.to_string(),
    protocol,
  })
}

/// A discovered client instance. Superseded, never mutated, on rediscovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientEndpoint {
  pub install_dir: PathBuf,
  pub lockfile_path: PathBuf,
  pub process_name: String,
  pub pid: u32,
  pub port: u16,
  pub password: String,
  pub protocol: Protocol,
  pub updated_at: DateTime<Utc>,
}

impl ClientEndpoint {
  pub fn from_lockfile(data: LockfileData, lockfile_path: PathBuf) -> Self {
    let install_dir = lockfile_path
      .parent()
      .map(|p| p.to_path_buf())
      .unwrap_or_default();
    Self {
      install_dir,
      lockfile_path,
      process_name: data.process_name,
      pid: data.pid,
      port: data.port,
      password: data.password,
      protocol: data.protocol,
      updated_at: Utc::now(),
    }
  }

  pub fn base_url(&self) -> String {
    format!("{}://127.0.0.1:{}", self.protocol.http_scheme(), self.port)
  }

  pub fn ws_url(&self) -> String {
    format!("{}://127.0.0.1:{}/", self.protocol.ws_scheme(), self.port)
  }

  pub fn auth_header(&self) -> String {
    let token = general_purpose::STANDARD.encode(format!("{}:{}", LCU_USERNAME, self.password));
    format!("Basic {}", token)
  }

  /// Two endpoints talk to the same client instance with the same secret.
  pub fn same_connection(&self, other: &ClientEndpoint) -> bool {
    self.port == other.port
      && self.password == other.password
      && self.protocol == other.protocol
      && self.pid == other.pid
  }
}

/// Snapshot of what is currently observable about the client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConnectivityStatus {
  pub launcher_running: bool,
  pub client_running: bool,
  pub lockfiles_present: bool,
  pub api_reachable: bool,
  pub credentials_rejected: bool,
  pub port: Option<u16>,
  pub checked_at: Option<DateTime<Utc>>,
}

/// Push channel envelope: `{uri, eventType, data}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LcuEventEnvelope {
  pub uri: String,
  #[serde(default)]
  pub event_type: LcuEventType,
  #[serde(default)]
  pub data: Value,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LcuEventType {
  Create,
  #[default]
  Update,
  Delete,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LcuReadyCheck {
  pub state: String,
  pub player_response: String,
  pub timer: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LcuChampSelectSession {
  pub game_id: u64,
  pub local_player_cell_id: i64,
  pub actions: Vec<Vec<LcuChampSelectAction>>,
  pub timer: Option<LcuChampSelectTimer>,
  pub chat_details: Option<LcuChatDetails>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LcuChatDetails {
  pub multi_user_chat_id: Option<String>,
  pub chat_room_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LcuChampSelectAction {
  pub id: i64,
  pub actor_cell_id: i64,
  pub champion_id: i64,
  pub completed: bool,
  pub is_in_progress: bool,
  #[serde(rename = "type")]
  pub kind: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LcuChampSelectTimer {
  pub phase: String,
  pub adjusted_time_left_in_phase: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LcuSummoner {
  pub summoner_id: u64,
  pub puuid: String,
  pub display_name: String,
  pub game_name: String,
}

impl LcuSummoner {
  /// Stable key for per-account exclusion.
  pub fn account_key(&self) -> String {
    if !self.puuid.is_empty() {
      self.puuid.clone()
    } else {
      self.summoner_id.to_string()
    }
  }
}

/// Rune page as the client returns it. Unknown fields are kept in `extra` and
/// written back untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LcuRunePage {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub id: Option<i64>,
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub primary_style_id: i64,
  #[serde(default)]
  pub sub_style_id: i64,
  #[serde(default)]
  pub selected_perk_ids: Vec<i64>,
  #[serde(default)]
  pub current: bool,
  #[serde(default)]
  pub is_editable: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub last_modified: Option<i64>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LcuPerkInventory {
  pub owned_page_count: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LcuPerkStyle {
  pub id: i64,
  pub name: String,
  pub slots: Vec<LcuPerkSlot>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LcuPerkSlot {
  pub perks: Vec<i64>,
  #[serde(rename = "type")]
  pub kind: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LcuChampionSummary {
  pub id: i64,
  pub name: String,
  pub alias: String,
}
