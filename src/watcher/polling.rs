// Polling strategy: periodic reads of the client state, edge-triggered

use reqwest::Method;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::{ConcreteStrategy, HealthSignal, RawEvent, StrategySink};
use crate::error::{PilotError, Result};
use crate::lcu::status::PHASE_PATH;
use crate::lcu::{LcuApi, LcuEventEnvelope, LcuEventType};

pub const READY_CHECK_PATH: &str = "/lol-matchmaking/v1/ready-check";
pub const CHAMP_SELECT_SESSION_PATH: &str = "/lol-champ-select/v1/session";

/// Everything the polling strategy may read, in emission order.
pub const POLLED_RESOURCES: [&str; 3] = [PHASE_PATH, READY_CHECK_PATH, CHAMP_SELECT_SESSION_PATH];

/// Last observed value per resource. Only differences become envelopes.
#[derive(Debug, Default)]
pub struct PollState {
  last: HashMap<String, Value>,
}

impl PollState {
  pub fn new() -> Self {
    Self::default()
  }

  /// `None` means the resource does not exist right now.
  pub fn observe(&mut self, uri: &str, current: Option<Value>) -> Option<LcuEventEnvelope> {
    match current {
      Some(value) => {
        let event_type = match self.last.get(uri) {
          None => LcuEventType::Create,
          Some(previous) if *previous == value => return None,
          Some(_) => LcuEventType::Update,
        };
        self.last.insert(uri.to_string(), value.clone());
        Some(LcuEventEnvelope {
          uri: uri.to_string(),
          event_type,
          data: value,
        })
      }
      None => self.last.remove(uri).map(|_| LcuEventEnvelope {
        uri: uri.to_string(),
        event_type: LcuEventType::Delete,
        data: Value::Null,
      }),
    }
  }

  pub fn clear(&mut self) {
    self.last.clear();
  }
}

/// Phase dependent resources worth reading in the given gameflow phase.
fn resource_wanted(uri: &str, phase: &str) -> bool {
  match uri {
    READY_CHECK_PATH => matches!(phase, "Matchmaking" | "ReadyCheck"),
    CHAMP_SELECT_SESSION_PATH => phase == "ChampSelect",
    _ => true,
  }
}

async fn read_resource(api: &dyn LcuApi, uri: &str) -> Result<Option<Value>> {
  match api.request(Method::GET, uri, None).await {
    Ok(response) => Ok(Some(response.body)),
    Err(PilotError::Api { status: 404, .. }) => Ok(None),
    Err(e) => Err(e),
  }
}

pub struct PollingStrategy {
  api: Arc<dyn LcuApi>,
  interval: Duration,
}

impl PollingStrategy {
  pub fn new(api: Arc<dyn LcuApi>, interval: Duration) -> Self {
    Self {
      api,
      interval: interval.max(Duration::from_millis(50)),
    }
  }

  /// One polling pass. Returns the envelopes that changed since the last pass.
  ///
  /// `state` only moves when every read of the pass succeeded, so a pass that
  /// fails partway is observed again in full on the next one.
  pub async fn poll_once(&self, state: &mut PollState) -> Result<Vec<LcuEventEnvelope>> {
    let phase_value = read_resource(self.api.as_ref(), PHASE_PATH).await?;
    let phase = phase_value
      .as_ref()
      .and_then(|v| v.as_str())
      .unwrap_or("None")
      .to_string();

    let mut reads = vec![(PHASE_PATH, phase_value)];
    for uri in POLLED_RESOURCES.iter().skip(1) {
      let current = if resource_wanted(uri, &phase) {
        read_resource(self.api.as_ref(), uri).await?
      } else {
        None
      };
      reads.push((*uri, current));
    }

    Ok(
      reads
        .into_iter()
        .filter_map(|(uri, current)| state.observe(uri, current))
        .collect(),
    )
  }

  pub async fn run(self, sink: StrategySink, cancel: CancellationToken) {
    let kind = ConcreteStrategy::Polling;
    let mut state = PollState::new();
    let mut generation = self.api.generation();
    let mut healthy: Option<bool> = None;
    let mut ticker = tokio::time::interval(self.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
      tokio::select! {
        _ = cancel.cancelled() => break,
        _ = ticker.tick() => {}
      }

      if !self.api.has_endpoint() {
        continue;
      }
      let current_generation = self.api.generation();
      if current_generation != generation {
        // A different client instance; start from a clean observation
        generation = current_generation;
        state.clear();
      }

      // An in-flight pass runs to completion; the token is checked between passes
      let pass = self.poll_once(&mut state).await;

      match pass {
        Ok(changed) => {
          if healthy != Some(true) {
            healthy = Some(true);
            sink.report(kind, HealthSignal::Connected);
          }
          for envelope in changed {
            tracing::debug!(
              "[Polling] {:?} {}",
              envelope.event_type,
              envelope.uri
            );
            if sink.events.send(RawEvent::Envelope(envelope)).await.is_err() {
              return;
            }
          }
        }
        Err(e) if e.is_fatal() => {
          tracing::warn!("[Polling] Credentials rejected, waiting for a new client");
        }
        Err(e) => {
          if healthy != Some(false) {
            tracing::warn!("[Polling] Client API unreachable: {}", e);
          }
          healthy = Some(false);
          sink.report(kind, HealthSignal::RequestFailed);
        }
      }
    }
  }
}
