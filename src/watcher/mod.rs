// Watcher module - acquisition strategies that turn the client's state into raw events

mod normalizer;
mod polling;
mod push;
mod selector;
mod supervisor;
mod ui_automation;

#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::lcu::{LcuApi, LcuEventEnvelope};

pub use normalizer::{EventNormalizer, NormalizedEvent};
pub use polling::{PollState, PollingStrategy, POLLED_RESOURCES};
pub use push::{parse_wamp_event, PushEvents, PUSH_PREFIXES};
pub use selector::{SelectorConfig, SelectorDecision, StrategySelector};
pub use supervisor::{StrategyFactory, Supervisor, SupervisorStatus};
pub use ui_automation::{PowerShellSurface, ScreenObservation, UiAutomationStrategy, WindowSurface};

/// Strategy as configured by the user. `Auto` is resolved by the selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AcquisitionStrategyKind {
  PushEvents,
  Polling,
  UiAutomation,
  #[default]
  Auto,
}

impl AcquisitionStrategyKind {
  /// The concrete strategy to pin, or `None` for `Auto`.
  pub fn pinned(self) -> Option<ConcreteStrategy> {
    match self {
      Self::PushEvents => Some(ConcreteStrategy::PushEvents),
      Self::Polling => Some(ConcreteStrategy::Polling),
      Self::UiAutomation => Some(ConcreteStrategy::UiAutomation),
      Self::Auto => None,
    }
  }
}

impl FromStr for AcquisitionStrategyKind {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_lowercase().replace(['-', '_'], "").as_str() {
      "push" | "pushevents" | "websocket" => Ok(Self::PushEvents),
      "poll" | "polling" => Ok(Self::Polling),
      "ui" | "uiautomation" => Ok(Self::UiAutomation),
      "auto" => Ok(Self::Auto),
      other => Err(format!("unknown acquisition method '{}'", other)),
    }
  }
}

impl fmt::Display for AcquisitionStrategyKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::PushEvents => write!(f, "push"),
      Self::Polling => write!(f, "polling"),
      Self::UiAutomation => write!(f, "ui-automation"),
      Self::Auto => write!(f, "auto"),
    }
  }
}

/// Executable strategies, ordered from the preferred tier down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ConcreteStrategy {
  PushEvents,
  Polling,
  UiAutomation,
}

impl ConcreteStrategy {
  pub fn lower(self) -> Option<Self> {
    match self {
      Self::PushEvents => Some(Self::Polling),
      Self::Polling => Some(Self::UiAutomation),
      Self::UiAutomation => None,
    }
  }

  pub fn higher(self) -> Option<Self> {
    match self {
      Self::PushEvents => None,
      Self::Polling => Some(Self::PushEvents),
      Self::UiAutomation => Some(Self::Polling),
    }
  }
}

impl fmt::Display for ConcreteStrategy {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::PushEvents => write!(f, "PushEvents"),
      Self::Polling => write!(f, "Polling"),
      Self::UiAutomation => write!(f, "UIAutomation"),
    }
  }
}

/// Unnormalized payloads, one shape per strategy.
#[derive(Debug, Clone, PartialEq)]
pub enum RawEvent {
  /// A text frame from the push channel, untouched.
  Frame(String),
  /// A synthesized envelope from polling.
  Envelope(LcuEventEnvelope),
  /// A snapshot of the client window.
  Screen(ScreenObservation),
}

impl RawEvent {
  pub fn source(&self) -> ConcreteStrategy {
    match self {
      Self::Frame(_) => ConcreteStrategy::PushEvents,
      Self::Envelope(_) => ConcreteStrategy::Polling,
      Self::Screen(_) => ConcreteStrategy::UiAutomation,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthSignal {
  Connected,
  /// The push stream ended while its endpoint was still current.
  StreamClosed,
  /// The client build has no push channel.
  Unavailable,
  RequestFailed,
  ObservationFailed,
  ObservationOk,
  /// Best-effort observation gave up after repeated failures.
  Degraded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthReport {
  pub strategy: ConcreteStrategy,
  pub signal: HealthSignal,
  pub at: Instant,
}

/// Channels a running strategy writes into.
#[derive(Clone)]
pub struct StrategySink {
  pub events: mpsc::Sender<RawEvent>,
  pub health: mpsc::UnboundedSender<HealthReport>,
}

impl StrategySink {
  pub fn report(&self, strategy: ConcreteStrategy, signal: HealthSignal) {
    let _ = self.health.send(HealthReport {
      strategy,
      signal,
      at: Instant::now(),
    });
  }
}

/// One of the three interchangeable acquisition strategies.
pub enum Strategy {
  Push(PushEvents),
  Polling(PollingStrategy),
  UiAutomation(UiAutomationStrategy),
}

impl Strategy {
  pub fn kind(&self) -> ConcreteStrategy {
    match self {
      Self::Push(_) => ConcreteStrategy::PushEvents,
      Self::Polling(_) => ConcreteStrategy::Polling,
      Self::UiAutomation(_) => ConcreteStrategy::UiAutomation,
    }
  }

  /// Spawn the strategy's background loop. Events arrive on `sink.events`.
  pub fn start(self, sink: StrategySink) -> StrategyHandle {
    let kind = self.kind();
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let task = match self {
      Self::Push(strategy) => tokio::spawn(strategy.run(sink, token)),
      Self::Polling(strategy) => tokio::spawn(strategy.run(sink, token)),
      Self::UiAutomation(strategy) => tokio::spawn(strategy.run(sink, token)),
    };
    tracing::info!("[Watcher] Started {} strategy", kind);
    StrategyHandle { kind, cancel, task }
  }
}

pub struct StrategyHandle {
  kind: ConcreteStrategy,
  cancel: CancellationToken,
  task: JoinHandle<()>,
}

impl StrategyHandle {
  pub fn kind(&self) -> ConcreteStrategy {
    self.kind
  }

  pub fn is_finished(&self) -> bool {
    self.task.is_finished()
  }

  /// Cancel and wait for the loop to exit. In-flight calls get `grace` to
  /// finish before the task is aborted.
  pub async fn stop(self, grace: Duration) {
    self.cancel.cancel();
    let abort = self.task.abort_handle();
    if tokio::time::timeout(grace, self.task).await.is_err() {
      tracing::warn!(
        "[Watcher] {} strategy did not stop within {:?}; aborting",
        self.kind,
        grace
      );
      abort.abort();
    }
    tracing::info!("[Watcher] Stopped {} strategy", self.kind);
  }
}

/// Shared dependencies strategies are built from.
#[derive(Clone)]
pub struct StrategyDeps {
  pub api: Arc<dyn LcuApi>,
  pub surface: Arc<dyn WindowSurface>,
  pub polling_interval: Duration,
  pub ui_interval: Duration,
  pub ui_degraded_after: u32,
}
