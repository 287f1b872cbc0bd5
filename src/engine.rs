// Engine: discovery, acquisition, normalization and automation wired together

use chrono::{DateTime, Utc};
use notify::{RecursiveMode, Watcher};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::automation::{
  Action, ActionDispatcher, ActionFailure, ActionOutcome, AutomationState, AutomationStateMachine,
};
use crate::bindings::BindingInjector;
use crate::catalog::ChampionCatalog;
use crate::config::PilotConfig;
use crate::error::Result;
use crate::lcu::{
  check_connectivity, ClientLocator, ConnectionManager, ConnectivityStatus, EndpointChange, EndpointDebouncer,
  LcuApi,
};
use crate::retry::RetryPolicy;
use crate::runes::RunePageApplier;
use crate::watcher::{
  ConcreteStrategy, EventNormalizer, NormalizedEvent, PowerShellSurface, RawEvent, StrategyDeps, Supervisor,
  SupervisorStatus, WindowSurface,
};

const QUEUE_CAPACITY: usize = 256;
/// Upper bound for the final in-flight actions on shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything observable about the engine at one point in time.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EngineStatus {
  pub connectivity: ConnectivityStatus,
  pub active_strategy: Option<ConcreteStrategy>,
  pub strategy_degraded: bool,
  pub strategy_switches: u32,
  pub automation_state: String,
  pub last_failure: Option<ActionFailure>,
  pub updated_at: Option<DateTime<Utc>>,
}

/// Input of the automation loop. Events and action outcomes share one queue so
/// the state machine sees them in arrival order.
enum AutomationInput {
  Event(NormalizedEvent),
  Outcome(Action, ActionOutcome),
  Catalog(ChampionCatalog),
  /// A new client endpoint was adopted. Clears a fatal error left by the
  /// previous, rejected one.
  ClientAdopted,
  Reset,
}

/// Requests a manual reset of the automation while the engine runs.
#[derive(Clone)]
pub struct ResetHandle {
  input: mpsc::Sender<AutomationInput>,
}

impl ResetHandle {
  /// Returns false once the engine has stopped.
  pub async fn reset(&self) -> bool {
    self.input.send(AutomationInput::Reset).await.is_ok()
  }
}

pub struct Engine {
  config: PilotConfig,
  locator: ClientLocator,
  connection: Arc<ConnectionManager>,
  surface: Arc<dyn WindowSurface>,
  status: watch::Sender<EngineStatus>,
  input_tx: mpsc::Sender<AutomationInput>,
  input_rx: mpsc::Receiver<AutomationInput>,
}

impl Engine {
  pub fn new(config: PilotConfig) -> Result<Self> {
    let connection = Arc::new(ConnectionManager::new(config.connection_options())?);
    let locator = ClientLocator::new(config.league_path.clone());
    let (status, _) = watch::channel(EngineStatus {
      automation_state: AutomationState::Idle.name().to_string(),
      ..Default::default()
    });
    let (input_tx, input_rx) = mpsc::channel(QUEUE_CAPACITY);
    Ok(Self {
      config,
      locator,
      connection,
      surface: Arc::new(PowerShellSurface::default()),
      status,
      input_tx,
      input_rx,
    })
  }

  pub fn with_surface(mut self, surface: Arc<dyn WindowSurface>) -> Self {
    self.surface = surface;
    self
  }

  pub fn with_locator(mut self, locator: ClientLocator) -> Self {
    self.locator = locator;
    self
  }

  pub fn connection(&self) -> Arc<ConnectionManager> {
    self.connection.clone()
  }

  pub fn subscribe_status(&self) -> watch::Receiver<EngineStatus> {
    self.status.subscribe()
  }

  pub fn reset_handle(&self) -> ResetHandle {
    ResetHandle {
      input: self.input_tx.clone(),
    }
  }

  fn dispatcher(&self) -> ActionDispatcher {
    let api: Arc<dyn LcuApi> = self.connection.clone();
    let mut dispatcher =
      ActionDispatcher::new(api.clone(), self.config.retry.clone()).with_surface(self.surface.clone());
    if !self.config.rune_pages.is_empty() {
      let applier = RunePageApplier::new(api.clone(), self.config.max_rune_pages);
      dispatcher = dispatcher.with_runes(Arc::new(applier), self.config.rune_pages.clone());
    }
    if !self.config.bindings.profiles.is_empty() {
      let injector = BindingInjector::new(
        api,
        self.config.bindings.profiles.clone(),
        self.config.bindings.champions.clone(),
      );
      dispatcher = dispatcher.with_bindings(Arc::new(injector));
    }
    dispatcher
  }

  /// Run until `cancel` fires. Each loop observes the token and finishes its
  /// current step before returning.
  pub async fn run(self, cancel: CancellationToken) -> Result<()> {
    tracing::info!(
      "[Engine] Starting (acquisition: {}, automation: {})",
      self.config.acquisition_method,
      if self.config.automation.enabled { "on" } else { "off" }
    );
    let (raw_tx, raw_rx) = mpsc::channel::<RawEvent>(QUEUE_CAPACITY);
    let dispatcher = Arc::new(self.dispatcher());
    let Self {
      config,
      locator,
      connection,
      surface,
      status,
      input_tx,
      input_rx,
    } = self;
    let (lost_tx, lost_rx) = mpsc::unbounded_channel::<()>();

    let deps = StrategyDeps {
      api: connection.clone(),
      surface: surface.clone(),
      polling_interval: config.polling_interval(),
      ui_interval: config.ui_poll_interval(),
      ui_degraded_after: config.selector.ui_degraded_after,
    };
    let supervisor = Supervisor::new(
      config.acquisition_method,
      config.selector.clone(),
      Arc::new(deps),
      raw_tx,
    );
    let supervisor_status = supervisor.subscribe_status();

    let discovery = tokio::spawn(discovery_loop(
      locator.clone(),
      connection.clone(),
      config.discovery_interval(),
      config.reconnect_debounce(),
      config.retry.clone(),
      lost_tx,
      input_tx.clone(),
      status.clone(),
      cancel.clone(),
    ));
    let supervisor_task = tokio::spawn(supervisor.run(cancel.clone()));
    let pump = tokio::spawn(event_pump(raw_rx, lost_rx, input_tx.clone(), cancel.clone()));
    let status_task = tokio::spawn(forward_supervisor_status(
      supervisor_status,
      status.clone(),
      cancel.clone(),
    ));

    let machine = AutomationStateMachine::new(config.automation.clone(), &ChampionCatalog::default());
    automation_loop(
      machine,
      dispatcher,
      input_rx,
      input_tx,
      status.clone(),
      cancel.clone(),
    )
    .await;

    for (name, task) in [
      ("discovery", discovery),
      ("supervisor", supervisor_task),
      ("event pump", pump),
      ("status", status_task),
    ] {
      if let Err(e) = task.await {
        tracing::warn!("[Engine] {} task ended abnormally: {}", name, e);
      }
    }
    tracing::info!("[Engine] Stopped");
    Ok(())
  }
}

/// Watch the lockfile directories and feed debounced endpoint changes into the
/// connection manager.
#[allow(clippy::too_many_arguments)]
async fn discovery_loop(
  locator: ClientLocator,
  connection: Arc<ConnectionManager>,
  interval: Duration,
  debounce: Duration,
  retry: RetryPolicy,
  lost: mpsc::UnboundedSender<()>,
  input: mpsc::Sender<AutomationInput>,
  status: watch::Sender<EngineStatus>,
  cancel: CancellationToken,
) {
  let (fs_tx, mut fs_rx) = mpsc::unbounded_channel::<()>();
  // Kept alive for the duration of the loop
  let _watcher = match notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
    if res.is_ok() {
      let _ = fs_tx.send(());
    }
  }) {
    Ok(mut watcher) => {
      for dir in locator.lockfile_watch_dirs() {
        if let Err(e) = watcher.watch(&dir, RecursiveMode::NonRecursive) {
          tracing::debug!("[Discovery] Cannot watch {}: {}", dir.display(), e);
        }
      }
      Some(watcher)
    }
    Err(e) => {
      tracing::warn!("[Discovery] File watching unavailable ({}), polling only", e);
      None
    }
  };

  let mut debouncer = EndpointDebouncer::new(debounce);
  let mut ticker = tokio::time::interval(interval);
  ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

  loop {
    tokio::select! {
      _ = cancel.cancelled() => break,
      _ = ticker.tick() => {}
      Some(()) = fs_rx.recv() => {
        // Coalesce bursts of file events
        while fs_rx.try_recv().is_ok() {}
      }
    }

    let probe = locator.clone();
    let candidate = tokio::task::spawn_blocking(move || probe.locate()).await.unwrap_or(None);
    let current = connection.endpoint();
    if let Some(next) = debouncer.offer(candidate, current.as_deref(), Instant::now()) {
      match connection.set_endpoint(next) {
        EndpointChange::Adopted(_) => {
          if input.send(AutomationInput::ClientAdopted).await.is_err() {
            break;
          }
          tokio::spawn(load_catalog(
            connection.clone(),
            retry.clone(),
            input.clone(),
            cancel.clone(),
          ));
        }
        EndpointChange::Cleared => {
          let _ = lost.send(());
        }
        EndpointChange::Unchanged | EndpointChange::IgnoredRejected => {}
      }
    }

    let connectivity = check_connectivity(&locator, &connection).await;
    status.send_if_modified(|s| {
      let mut changed = false;
      if s.connectivity.api_reachable != connectivity.api_reachable
        || s.connectivity.port != connectivity.port
        || s.connectivity.client_running != connectivity.client_running
        || s.connectivity.credentials_rejected != connectivity.credentials_rejected
      {
        changed = true;
      }
      s.connectivity = connectivity;
      s.updated_at = Some(Utc::now());
      changed
    });
  }
  tracing::info!("[Discovery] Stopped");
}

/// Load the champion catalog for the current client, retrying with backoff
/// while the client's game data is not served yet. Gives up when the endpoint
/// changes, since the next adoption starts its own load.
async fn load_catalog(
  api: Arc<dyn LcuApi>,
  retry: RetryPolicy,
  input: mpsc::Sender<AutomationInput>,
  cancel: CancellationToken,
) {
  let generation = api.generation();
  let mut attempt: u32 = 0;
  loop {
    attempt += 1;
    let error = match ChampionCatalog::load_from_client(api.as_ref()).await {
      Ok(catalog) => {
        let _ = input.send(AutomationInput::Catalog(catalog)).await;
        return;
      }
      Err(e) => e,
    };
    if error.is_fatal() {
      tracing::warn!("[Discovery] Champion catalog unavailable: {}", error);
      return;
    }
    let delay = retry.delay_after(attempt);
    if attempt == 1 {
      tracing::info!("[Discovery] Champion catalog not ready ({}), retrying", error);
    } else {
      tracing::debug!("[Discovery] Champion catalog attempt {} failed: {}", attempt, error);
    }
    tokio::select! {
      _ = cancel.cancelled() => return,
      _ = tokio::time::sleep(delay) => {}
    }
    if api.generation() != generation {
      tracing::debug!("[Discovery] Endpoint changed, dropping catalog load");
      return;
    }
  }
}

/// Normalize raw events in arrival order. A lost client closes whatever the
/// normalizer still has open.
async fn event_pump(
  mut raw: mpsc::Receiver<RawEvent>,
  mut lost: mpsc::UnboundedReceiver<()>,
  input: mpsc::Sender<AutomationInput>,
  cancel: CancellationToken,
) {
  let mut normalizer = EventNormalizer::new();
  loop {
    let events: Vec<NormalizedEvent> = tokio::select! {
      _ = cancel.cancelled() => break,
      Some(()) = lost.recv() => {
        // Closing events are not screen-derived, so they never take the UI path
        normalizer
          .client_lost()
          .into_iter()
          .map(|event| NormalizedEvent { event, source: ConcreteStrategy::Polling })
          .collect()
      }
      event = raw.recv() => match event {
        Some(event) => normalizer.normalize(event),
        None => break,
      },
    };
    for event in events {
      tracing::debug!("[Engine] {} from {}", event.event.name(), event.source);
      if input.send(AutomationInput::Event(event)).await.is_err() {
        return;
      }
    }
  }
}

async fn forward_supervisor_status(
  mut rx: watch::Receiver<SupervisorStatus>,
  status: watch::Sender<EngineStatus>,
  cancel: CancellationToken,
) {
  loop {
    let current = *rx.borrow_and_update();
    status.send_modify(|s| {
      s.active_strategy = current.active;
      s.strategy_degraded = current.degraded;
      s.strategy_switches = current.switches;
      s.updated_at = Some(Utc::now());
    });
    tokio::select! {
      _ = cancel.cancelled() => break,
      changed = rx.changed() => if changed.is_err() { break },
    }
  }
}

/// The state machine runs here and nowhere else. Actions execute on their own
/// tasks and report back through the same queue.
async fn automation_loop(
  mut machine: AutomationStateMachine,
  dispatcher: Arc<ActionDispatcher>,
  mut input: mpsc::Receiver<AutomationInput>,
  feedback: mpsc::Sender<AutomationInput>,
  status: watch::Sender<EngineStatus>,
  cancel: CancellationToken,
) {
  let mut in_flight = tokio::task::JoinSet::new();
  loop {
    let next = tokio::select! {
      _ = cancel.cancelled() => break,
      next = input.recv() => next,
    };
    let mut failure = None;
    match next {
      None => break,
      Some(AutomationInput::Catalog(catalog)) => {
        tracing::info!("[Engine] Champion catalog ready ({} champions)", catalog.len());
        machine.update_catalog(&catalog);
      }
      Some(AutomationInput::ClientAdopted) => {
        if machine.in_fatal_error() {
          tracing::info!("[Engine] New client credentials, leaving fatal error");
          machine.reset();
        }
      }
      Some(AutomationInput::Reset) => machine.reset(),
      Some(AutomationInput::Event(normalized)) => {
        let via_ui = normalized.source == ConcreteStrategy::UiAutomation;
        for action in machine.handle(&normalized.event) {
          let dispatcher = dispatcher.clone();
          let feedback = feedback.clone();
          in_flight.spawn(async move {
            let outcome = dispatcher.dispatch(&action, via_ui).await;
            let _ = feedback.send(AutomationInput::Outcome(action, outcome)).await;
          });
        }
      }
      Some(AutomationInput::Outcome(action, outcome)) => {
        failure = machine.record_outcome(&action, &outcome);
      }
    }
    // Reap finished dispatch tasks
    while in_flight.try_join_next().is_some() {}

    let state = machine.state().name().to_string();
    status.send_if_modified(|s| {
      let changed = s.automation_state != state || failure.is_some();
      s.automation_state = state;
      if let Some(failure) = failure.take() {
        s.last_failure = Some(failure);
      }
      changed
    });
  }

  if !in_flight.is_empty() {
    tracing::info!("[Engine] Waiting for {} in-flight action(s)", in_flight.len());
    let drain = async { while in_flight.join_next().await.is_some() {} };
    if tokio::time::timeout(DRAIN_TIMEOUT, drain).await.is_err() {
      tracing::warn!("[Engine] In-flight actions did not finish in time");
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::automation::{AutomationSettings, READY_CHECK_ACCEPT_PATH};
  use crate::events::GameEvent;
  use crate::catalog::CHAMPION_SUMMARY_PATH;
  use crate::error::PilotError;
  use crate::lcu::LcuResponse;
  use crate::test_helpers::{api_error, MockLcu};
  use reqwest::Method;
  use serde_json::json;
  use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

  fn quick_retry() -> RetryPolicy {
    RetryPolicy::new(1, Duration::from_millis(1), Duration::from_millis(1))
  }

  fn ready_check(id: &str) -> AutomationInput {
    AutomationInput::Event(NormalizedEvent {
      event: GameEvent::ReadyCheckReceived {
        ready_check_id: id.into(),
      },
      source: ConcreteStrategy::PushEvents,
    })
  }

  async fn wait_for_state(status: &mut watch::Receiver<EngineStatus>, state: &str) {
    tokio::time::timeout(Duration::from_secs(2), async {
      while status.borrow_and_update().automation_state != state {
        status.changed().await.unwrap();
      }
    })
    .await
    .unwrap();
  }

  async fn wait_for_accepts(mock: &MockLcu, count: usize) {
    tokio::time::timeout(Duration::from_secs(2), async {
      while mock.count(Method::POST, READY_CHECK_ACCEPT_PATH) < count {
        tokio::time::sleep(Duration::from_millis(5)).await;
      }
    })
    .await
    .unwrap();
  }

  /// Client that rejects credentials until `rejecting` is cleared.
  fn rejecting_client(rejecting: Arc<AtomicBool>) -> MockLcu {
    MockLcu::new(move |_, _, _| {
      if rejecting.load(Ordering::SeqCst) {
        Err(PilotError::Unauthorized { port: 54321 })
      } else {
        Ok(LcuResponse::no_content())
      }
    })
  }

  fn spawn_loop(
    mock: Arc<MockLcu>,
  ) -> (
    mpsc::Sender<AutomationInput>,
    watch::Receiver<EngineStatus>,
    CancellationToken,
    tokio::task::JoinHandle<()>,
  ) {
    let api: Arc<dyn LcuApi> = mock;
    let dispatcher = Arc::new(ActionDispatcher::new(api, quick_retry()));
    let machine = AutomationStateMachine::new(AutomationSettings::default(), &ChampionCatalog::default());
    let (tx, rx) = mpsc::channel(16);
    let (status, status_rx) = watch::channel(EngineStatus::default());
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(automation_loop(machine, dispatcher, rx, tx.clone(), status, cancel.clone()));
    (tx, status_rx, cancel, handle)
  }

  /// Test: Automation loop end to end
  ///
  /// Scenario: The same ready check is queued twice, then the loop is cancelled.
  /// Expected: One accept request and the status shows the pending check.
  #[tokio::test]
  async fn test_automation_loop_accepts_once() {
    let mock = Arc::new(MockLcu::accepting());
    let (tx, mut status_rx, cancel, handle) = spawn_loop(mock.clone());
    for _ in 0..2 {
      tx.send(ready_check("rc-1")).await.unwrap();
    }

    wait_for_accepts(&mock, 1).await;
    wait_for_state(&mut status_rx, "ReadyCheckPending").await;

    cancel.cancel();
    handle.await.unwrap();
    assert_eq!(mock.count(Method::POST, READY_CHECK_ACCEPT_PATH), 1);
  }

  /// Test: Recovery after rejected credentials
  ///
  /// Scenario: The accept for rc-1 is rejected as unauthorized, then a client
  /// with fresh credentials is adopted and raises rc-2.
  /// Expected: The machine leaves the fatal error and accepts rc-2.
  #[tokio::test]
  async fn test_new_client_clears_fatal_error() {
    let rejecting = Arc::new(AtomicBool::new(true));
    let mock = Arc::new(rejecting_client(rejecting.clone()));
    let (tx, mut status_rx, cancel, handle) = spawn_loop(mock.clone());

    tx.send(ready_check("rc-1")).await.unwrap();
    wait_for_state(&mut status_rx, "Error").await;

    rejecting.store(false, Ordering::SeqCst);
    tx.send(AutomationInput::ClientAdopted).await.unwrap();
    tx.send(ready_check("rc-2")).await.unwrap();

    wait_for_accepts(&mock, 2).await;
    wait_for_state(&mut status_rx, "ReadyCheckPending").await;

    cancel.cancel();
    handle.await.unwrap();
    assert_eq!(mock.count(Method::POST, READY_CHECK_ACCEPT_PATH), 2);
  }

  /// Test: Manual reset
  ///
  /// Scenario: The machine is in a fatal error and a reset is requested through the handle.
  /// Expected: The state returns to Idle and the next ready check is accepted.
  #[tokio::test]
  async fn test_reset_handle_leaves_fatal_error() {
    let rejecting = Arc::new(AtomicBool::new(true));
    let mock = Arc::new(rejecting_client(rejecting.clone()));
    let (tx, mut status_rx, cancel, handle) = spawn_loop(mock.clone());
    let reset = ResetHandle { input: tx.clone() };

    tx.send(ready_check("rc-1")).await.unwrap();
    wait_for_state(&mut status_rx, "Error").await;

    rejecting.store(false, Ordering::SeqCst);
    assert!(reset.reset().await);
    wait_for_state(&mut status_rx, "Idle").await;
    tx.send(ready_check("rc-2")).await.unwrap();
    wait_for_accepts(&mock, 2).await;

    cancel.cancel();
    handle.await.unwrap();
  }

  /// Test: Adopting a client while healthy
  ///
  /// Scenario: A client is adopted while a ready check is pending.
  /// Expected: The pending state is kept and the same check is not accepted again.
  #[tokio::test]
  async fn test_client_adopted_keeps_healthy_state() {
    let mock = Arc::new(MockLcu::accepting());
    let (tx, mut status_rx, cancel, handle) = spawn_loop(mock.clone());

    tx.send(ready_check("rc-1")).await.unwrap();
    wait_for_accepts(&mock, 1).await;
    tx.send(AutomationInput::ClientAdopted).await.unwrap();
    tx.send(ready_check("rc-1")).await.unwrap();
    wait_for_state(&mut status_rx, "ReadyCheckPending").await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    cancel.cancel();
    handle.await.unwrap();
    assert_eq!(mock.count(Method::POST, READY_CHECK_ACCEPT_PATH), 1);
  }

  /// Test: Catalog load while game data is starting
  ///
  /// Scenario: The champion summary answers 503 twice before it is served.
  /// Expected: The load retries and delivers the catalog.
  #[tokio::test]
  async fn test_catalog_load_retries_until_served() {
    let reads = Arc::new(AtomicUsize::new(0));
    let counter = reads.clone();
    let api: Arc<dyn LcuApi> = Arc::new(MockLcu::new(move |_, path, _| {
      if counter.fetch_add(1, Ordering::SeqCst) < 2 {
        return Err(api_error(503, path));
      }
      Ok(LcuResponse::ok(json!([
        { "id": -1, "name": "None", "alias": "None" },
        { "id": 103, "name": "Ahri", "alias": "Ahri" }
      ])))
    }));
    let (tx, mut rx) = mpsc::channel(4);

    tokio::time::timeout(
      Duration::from_secs(2),
      load_catalog(api, quick_retry(), tx, CancellationToken::new()),
    )
    .await
    .unwrap();

    match rx.try_recv() {
      Ok(AutomationInput::Catalog(catalog)) => assert_eq!(catalog.resolve("ahri"), Some(103)),
      _ => panic!("expected a catalog"),
    }
    assert_eq!(reads.load(Ordering::SeqCst), 3);
  }

  /// Test: Catalog load for a replaced client
  ///
  /// Scenario: The game data never appears and the endpoint generation changes.
  /// Expected: The load stops without sending anything.
  #[tokio::test]
  async fn test_catalog_load_stops_on_new_endpoint() {
    let mock = Arc::new(MockLcu::new(|_, path, _| Err(api_error(404, path))));
    let api: Arc<dyn LcuApi> = mock.clone();
    let (tx, mut rx) = mpsc::channel(4);
    let task = tokio::spawn(load_catalog(api, quick_retry(), tx, CancellationToken::new()));

    tokio::time::timeout(Duration::from_secs(2), async {
      while mock.count(Method::GET, CHAMPION_SUMMARY_PATH) < 2 {
        tokio::time::sleep(Duration::from_millis(2)).await;
      }
    })
    .await
    .unwrap();
    mock.bump_generation();

    tokio::time::timeout(Duration::from_secs(2), task).await.unwrap().unwrap();
    assert!(rx.try_recv().is_err());
  }

}
