// Push strategy: WAMP event frames from the client's WebSocket

use futures_util::StreamExt;
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::{ConcreteStrategy, HealthSignal, RawEvent, StrategySink};
use crate::error::PilotError;
use crate::lcu::{LcuApi, LcuEventEnvelope};
use crate::retry::RetryPolicy;

/// Resource prefixes the push strategy subscribes to.
pub const PUSH_PREFIXES: &[&str] = &[
  "/lol-gameflow/v1/gameflow-phase",
  "/lol-matchmaking/v1/ready-check",
  "/lol-champ-select/v1/session",
];

const WAMP_EVENT: u64 = 8;
const IDLE_WAIT: Duration = Duration::from_millis(500);
const UNAVAILABLE_WAIT: Duration = Duration::from_secs(5);

/// Decode a WAMP event frame `[8, topic, envelope]`. Other opcodes and
/// malformed frames yield `None`.
pub fn parse_wamp_event(text: &str) -> Option<LcuEventEnvelope> {
  let value: Value = serde_json::from_str(text).ok()?;
  let frame = value.as_array()?;
  if frame.len() < 3 || frame[0].as_u64() != Some(WAMP_EVENT) {
    return None;
  }
  serde_json::from_value(frame[2].clone()).ok()
}

fn wamp_frame(envelope: &LcuEventEnvelope) -> String {
  json!([WAMP_EVENT, "OnJsonApiEvent", envelope]).to_string()
}

pub struct PushEvents {
  api: Arc<dyn LcuApi>,
  prefixes: Vec<String>,
  backoff: RetryPolicy,
}

impl PushEvents {
  pub fn new(api: Arc<dyn LcuApi>) -> Self {
    Self {
      api,
      prefixes: PUSH_PREFIXES.iter().map(|p| p.to_string()).collect(),
      backoff: RetryPolicy::new(u32::MAX, Duration::from_millis(500), Duration::from_secs(8)),
    }
  }

  pub fn with_backoff(mut self, backoff: RetryPolicy) -> Self {
    self.backoff = backoff;
    self
  }

  /// Current state of every subscribed resource, wrapped as event frames so a
  /// late start inside a phase is not missed.
  async fn bootstrap(&self, sink: &StrategySink) -> bool {
    for prefix in &self.prefixes {
      let data = match self.api.request(Method::GET, prefix, None).await {
        Ok(response) => response.body,
        Err(PilotError::Api { status: 404, .. }) => continue,
        Err(e) => {
          tracing::debug!("[Push] Bootstrap read of {} failed: {}", prefix, e);
          continue;
        }
      };
      let envelope = LcuEventEnvelope {
        uri: prefix.clone(),
        event_type: Default::default(),
        data,
      };
      if sink.events.send(RawEvent::Frame(wamp_frame(&envelope))).await.is_err() {
        return false;
      }
    }
    true
  }

  pub async fn run(self, sink: StrategySink, cancel: CancellationToken) {
    let kind = ConcreteStrategy::PushEvents;
    let mut failures: u32 = 0;

    while !cancel.is_cancelled() {
      if !self.api.has_endpoint() {
        if sleep_or_cancel(&cancel, IDLE_WAIT).await {
          break;
        }
        continue;
      }

      let mut subscription = match self.api.subscribe(&self.prefixes).await {
        Ok(subscription) => subscription,
        Err(PilotError::PushUnavailable(reason)) => {
          tracing::warn!("[Push] Push channel unavailable: {}", reason);
          sink.report(kind, HealthSignal::Unavailable);
          if sleep_or_cancel(&cancel, UNAVAILABLE_WAIT).await {
            break;
          }
          continue;
        }
        Err(e) if e.is_fatal() || matches!(e, PilotError::NoEndpoint) => {
          // The connection manager drops the endpoint; wait for a new one
          if sleep_or_cancel(&cancel, IDLE_WAIT).await {
            break;
          }
          continue;
        }
        Err(e) => {
          failures += 1;
          tracing::warn!("[Push] Subscribe failed (attempt {}): {}", failures, e);
          sink.report(kind, HealthSignal::StreamClosed);
          if sleep_or_cancel(&cancel, self.backoff.delay_after(failures)).await {
            break;
          }
          continue;
        }
      };

      failures = 0;
      sink.report(kind, HealthSignal::Connected);
      if !self.bootstrap(&sink).await {
        return;
      }

      let mut stream_error = None;
      loop {
        tokio::select! {
          _ = cancel.cancelled() => return,
          frame = subscription.frames.next() => {
            match frame {
              Some(Ok(text)) => {
                if sink.events.send(RawEvent::Frame(text)).await.is_err() {
                  return;
                }
              }
              Some(Err(e)) => {
                stream_error = Some(e);
                break;
              }
              None => break,
            }
          }
        }
      }

      if self.api.generation() != subscription.generation {
        tracing::info!("[Push] Endpoint changed, resubscribing");
        continue;
      }

      failures += 1;
      match stream_error {
        Some(e) => tracing::warn!("[Push] Event stream failed: {}", e),
        None => tracing::warn!("[Push] Event stream closed unexpectedly"),
      }
      sink.report(kind, HealthSignal::StreamClosed);
      if sleep_or_cancel(&cancel, self.backoff.delay_after(failures)).await {
        break;
      }
    }
  }
}

/// Returns true when cancelled before the delay elapsed.
pub(super) async fn sleep_or_cancel(cancel: &CancellationToken, delay: Duration) -> bool {
  tokio::select! {
    _ = cancel.cancelled() => true,
    _ = tokio::time::sleep(delay) => false,
  }
}
