// Supervisor: runs exactly one strategy and swaps it on the selector's decision

use futures_util::future::BoxFuture;
use reqwest::Method;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use super::{
  AcquisitionStrategyKind, ConcreteStrategy, HealthReport, PollingStrategy, PushEvents, RawEvent,
  SelectorConfig, SelectorDecision, Strategy, StrategyDeps, StrategyHandle, StrategySelector,
  StrategySink, UiAutomationStrategy, PUSH_PREFIXES,
};
use crate::error::PilotError;
use crate::lcu::status::PHASE_PATH;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Builds strategies and checks whether a tier is usable.
pub trait StrategyFactory: Send + Sync {
  fn build(&self, kind: ConcreteStrategy) -> Strategy;

  fn probe(&self, kind: ConcreteStrategy) -> BoxFuture<'_, bool>;
}

impl StrategyFactory for StrategyDeps {
  fn build(&self, kind: ConcreteStrategy) -> Strategy {
    match kind {
      ConcreteStrategy::PushEvents => Strategy::Push(PushEvents::new(self.api.clone())),
      ConcreteStrategy::Polling => {
        Strategy::Polling(PollingStrategy::new(self.api.clone(), self.polling_interval))
      }
      ConcreteStrategy::UiAutomation => Strategy::UiAutomation(UiAutomationStrategy::new(
        self.surface.clone(),
        self.ui_interval,
        self.ui_degraded_after,
      )),
    }
  }

  fn probe(&self, kind: ConcreteStrategy) -> BoxFuture<'_, bool> {
    Box::pin(async move {
      match kind {
        ConcreteStrategy::PushEvents => {
          let prefixes: Vec<String> = PUSH_PREFIXES.iter().map(|p| p.to_string()).collect();
          // The probe subscription is dropped right away, which closes its socket
          self.api.subscribe(&prefixes).await.is_ok()
        }
        ConcreteStrategy::Polling => match self.api.request(Method::GET, PHASE_PATH, None).await {
          Ok(_) | Err(PilotError::Api { .. }) => true,
          Err(_) => false,
        },
        ConcreteStrategy::UiAutomation => self
          .surface
          .observe()
          .await
          .map(|o| o.window_found)
          .unwrap_or(false),
      }
    })
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SupervisorStatus {
  pub active: Option<ConcreteStrategy>,
  pub degraded: bool,
  pub switches: u32,
}

pub struct Supervisor {
  selector: StrategySelector,
  factory: Arc<dyn StrategyFactory>,
  sink: StrategySink,
  health_rx: mpsc::UnboundedReceiver<HealthReport>,
  handle: Option<StrategyHandle>,
  running: Arc<AtomicUsize>,
  stop_grace: Duration,
  status: watch::Sender<SupervisorStatus>,
}

impl Supervisor {
  pub fn new(
    configured: AcquisitionStrategyKind,
    config: SelectorConfig,
    factory: Arc<dyn StrategyFactory>,
    events: mpsc::Sender<RawEvent>,
  ) -> Self {
    let (health, health_rx) = mpsc::unbounded_channel();
    let (status, _) = watch::channel(SupervisorStatus::default());
    Self {
      selector: StrategySelector::new(configured, config, Instant::now()),
      factory,
      sink: StrategySink { events, health },
      health_rx,
      handle: None,
      running: Arc::new(AtomicUsize::new(0)),
      stop_grace: Duration::from_secs(2),
      status,
    }
  }

  pub fn with_stop_grace(mut self, grace: Duration) -> Self {
    self.stop_grace = grace;
    self
  }

  pub fn subscribe_status(&self) -> watch::Receiver<SupervisorStatus> {
    self.status.subscribe()
  }

  pub fn active(&self) -> ConcreteStrategy {
    self.selector.active()
  }

  /// Strategies currently started and not yet stopped.
  pub fn running_strategies(&self) -> usize {
    self.running.load(Ordering::SeqCst)
  }

  fn publish(&self) {
    let active = self.handle.as_ref().map(|h| h.kind());
    let degraded = self.selector.is_degraded();
    self.status.send_if_modified(|status| {
      let changed = status.active != active || status.degraded != degraded;
      status.active = active;
      status.degraded = degraded;
      changed
    });
  }

  /// Start the selector's current strategy if nothing is running.
  pub fn start(&mut self) {
    if self.handle.is_none() {
      let kind = self.selector.active();
      self.running.fetch_add(1, Ordering::SeqCst);
      self.handle = Some(self.factory.build(kind).start(self.sink.clone()));
    }
    self.publish();
  }

  /// Stops the running strategy before the next one is started.
  async fn switch_to(&mut self, kind: ConcreteStrategy) {
    if let Some(handle) = self.handle.take() {
      handle.stop(self.stop_grace).await;
      self.running.fetch_sub(1, Ordering::SeqCst);
    }
    // Reports queued by the old strategy are no longer relevant
    while self.health_rx.try_recv().is_ok() {}
    self.running.fetch_add(1, Ordering::SeqCst);
    self.handle = Some(self.factory.build(kind).start(self.sink.clone()));
    self.status.send_modify(|s| s.switches += 1);
  }

  /// Drain health reports, run a due promotion probe and apply the
  /// selector's decision.
  pub async fn evaluate_once(&mut self) -> SelectorDecision {
    while let Ok(report) = self.health_rx.try_recv() {
      self.selector.record(&report);
    }

    if let Some(target) = self.selector.wants_probe(Instant::now()) {
      let ok = tokio::time::timeout(PROBE_TIMEOUT, self.factory.probe(target))
        .await
        .unwrap_or(false);
      self.selector.record_probe(target, ok, Instant::now());
    }

    let decision = self.selector.evaluate(Instant::now());
    if let Some(target) = decision.target() {
      self.switch_to(target).await;
    } else if self.handle.as_ref().map(|h| h.is_finished()).unwrap_or(false) {
      let kind = self.selector.active();
      tracing::warn!("[Supervisor] {} strategy exited, restarting it", kind);
      self.switch_to(kind).await;
    }
    self.publish();
    decision
  }

  pub async fn shutdown(&mut self) {
    if let Some(handle) = self.handle.take() {
      handle.stop(self.stop_grace).await;
      self.running.fetch_sub(1, Ordering::SeqCst);
    }
    self.publish();
  }

  pub async fn run(mut self, cancel: CancellationToken) {
    self.start();
    let mut ticker = tokio::time::interval(self.selector.config().evaluation_interval());
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
      tokio::select! {
        _ = cancel.cancelled() => break,
        _ = ticker.tick() => {
          self.evaluate_once().await;
        }
      }
    }
    self.shutdown().await;
    tracing::info!("[Supervisor] Stopped");
  }
}
