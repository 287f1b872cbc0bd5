// Connectivity snapshot: what is running, what is on disk, what answers

use chrono::Utc;
use reqwest::Method;

use super::connection::{ConnectionManager, LcuApi};
use super::locator::{launcher_lockfile, ClientLocator};
use super::process::{is_process_running, CLIENT_UX_PROCESS, LAUNCHER_PROCESS};
use super::types::ConnectivityStatus;
use crate::error::PilotError;

pub const PHASE_PATH: &str = "/lol-gameflow/v1/gameflow-phase";

/// Any answer from the API, even an error status, proves it is reachable.
pub async fn api_reachable(api: &dyn LcuApi) -> bool {
  match api.request(Method::GET, PHASE_PATH, None).await {
    Ok(_) => true,
    Err(PilotError::Api { .. }) => true,
    Err(_) => false,
  }
}

pub async fn check_connectivity(
  locator: &ClientLocator,
  connection: &ConnectionManager,
) -> ConnectivityStatus {
  let probe = locator.clone();
  let (launcher_running, client_running, lockfiles_present) = tokio::task::spawn_blocking(move || {
    let launcher_lock = launcher_lockfile().map(|p| p.exists()).unwrap_or(false);
    (
      launcher_lock || is_process_running(LAUNCHER_PROCESS),
      is_process_running(CLIENT_UX_PROCESS),
      probe.lockfiles_present(),
    )
  })
  .await
  .unwrap_or((false, false, false));

  let endpoint = connection.endpoint();
  let reachable = match &endpoint {
    Some(_) => api_reachable(connection).await,
    None => false,
  };

  ConnectivityStatus {
    launcher_running,
    // A reachable API implies a running client even when the process probe is unavailable
    client_running: client_running || reachable,
    lockfiles_present,
    api_reachable: reachable,
    credentials_rejected: connection.credentials_rejected(),
    port: endpoint.map(|e| e.port),
    checked_at: Some(Utc::now()),
  }
}
