// Tiered strategy selection with one-step degradation and promotion

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use super::{AcquisitionStrategyKind, ConcreteStrategy, HealthReport, HealthSignal};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorConfig {
  /// Push stream failures tolerated inside the window before degrading.
  #[serde(default = "default_push_failure_threshold")]
  pub push_failure_threshold: u32,
  /// Failed polling passes tolerated inside the window before degrading.
  #[serde(default = "default_polling_failure_threshold")]
  pub polling_failure_threshold: u32,
  /// Consecutive failed UI observations before the UI strategy is degraded.
  #[serde(default = "default_ui_degraded_after")]
  pub ui_degraded_after: u32,
  #[serde(default = "default_failure_window_secs")]
  pub failure_window_secs: u64,
  /// Minimum time on a tier before promotion is considered.
  #[serde(default = "default_hysteresis_secs")]
  pub hysteresis_secs: u64,
  #[serde(default = "default_promotion_check_secs")]
  pub promotion_check_secs: u64,
  #[serde(default = "default_evaluation_interval_ms")]
  pub evaluation_interval_ms: u64,
}

fn default_push_failure_threshold() -> u32 {
  3
}

fn default_polling_failure_threshold() -> u32 {
  5
}

fn default_ui_degraded_after() -> u32 {
  5
}

fn default_failure_window_secs() -> u64 {
  60
}

fn default_hysteresis_secs() -> u64 {
  30
}

fn default_promotion_check_secs() -> u64 {
  15
}

fn default_evaluation_interval_ms() -> u64 {
  1000
}

impl Default for SelectorConfig {
  fn default() -> Self {
    Self {
      push_failure_threshold: default_push_failure_threshold(),
      polling_failure_threshold: default_polling_failure_threshold(),
      ui_degraded_after: default_ui_degraded_after(),
      failure_window_secs: default_failure_window_secs(),
      hysteresis_secs: default_hysteresis_secs(),
      promotion_check_secs: default_promotion_check_secs(),
      evaluation_interval_ms: default_evaluation_interval_ms(),
    }
  }
}

impl SelectorConfig {
  pub fn failure_window(&self) -> Duration {
    Duration::from_secs(self.failure_window_secs)
  }

  pub fn hysteresis(&self) -> Duration {
    Duration::from_secs(self.hysteresis_secs)
  }

  pub fn promotion_check(&self) -> Duration {
    Duration::from_secs(self.promotion_check_secs)
  }

  pub fn evaluation_interval(&self) -> Duration {
    Duration::from_millis(self.evaluation_interval_ms.max(10))
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorDecision {
  Stay,
  Degrade {
    from: ConcreteStrategy,
    to: ConcreteStrategy,
  },
  Promote {
    from: ConcreteStrategy,
    to: ConcreteStrategy,
  },
}

impl SelectorDecision {
  pub fn target(&self) -> Option<ConcreteStrategy> {
    match self {
      Self::Stay => None,
      Self::Degrade { to, .. } | Self::Promote { to, .. } => Some(*to),
    }
  }
}

/// Resolves the configured kind to the concrete strategy that should run.
/// Moves at most one tier per evaluation.
#[derive(Debug)]
pub struct StrategySelector {
  configured: AcquisitionStrategyKind,
  config: SelectorConfig,
  active: ConcreteStrategy,
  failures: VecDeque<Instant>,
  unavailable: bool,
  degraded: bool,
  last_switch: Instant,
  last_probe: Option<Instant>,
  probe_succeeded: bool,
}

impl StrategySelector {
  pub fn new(configured: AcquisitionStrategyKind, config: SelectorConfig, now: Instant) -> Self {
    Self {
      configured,
      config,
      active: configured.pinned().unwrap_or(ConcreteStrategy::PushEvents),
      failures: VecDeque::new(),
      unavailable: false,
      degraded: false,
      last_switch: now,
      last_probe: None,
      probe_succeeded: false,
    }
  }

  pub fn active(&self) -> ConcreteStrategy {
    self.active
  }

  pub fn configured(&self) -> AcquisitionStrategyKind {
    self.configured
  }

  pub fn config(&self) -> &SelectorConfig {
    &self.config
  }

  /// True when the active strategy is failing beyond its threshold. Pinned
  /// strategies keep running but still report this.
  pub fn is_degraded(&self) -> bool {
    self.degraded || self.unavailable || self.failures.len() as u32 > self.threshold()
  }

  fn threshold(&self) -> u32 {
    match self.active {
      ConcreteStrategy::PushEvents => self.config.push_failure_threshold,
      ConcreteStrategy::Polling => self.config.polling_failure_threshold,
      ConcreteStrategy::UiAutomation => self.config.ui_degraded_after,
    }
  }

  /// Reports from a strategy that is no longer active are ignored.
  pub fn record(&mut self, report: &HealthReport) {
    if report.strategy != self.active {
      return;
    }
    match report.signal {
      HealthSignal::StreamClosed | HealthSignal::RequestFailed | HealthSignal::ObservationFailed => {
        self.failures.push_back(report.at)
      }
      HealthSignal::Unavailable => self.unavailable = true,
      HealthSignal::Degraded => self.degraded = true,
      HealthSignal::ObservationOk => self.degraded = false,
      HealthSignal::Connected => {}
    }
  }

  fn prune(&mut self, now: Instant) {
    let window = self.config.failure_window();
    while let Some(front) = self.failures.front() {
      if now.saturating_duration_since(*front) > window {
        self.failures.pop_front();
      } else {
        break;
      }
    }
  }

  /// Strategy worth probing for promotion, if a probe is due.
  pub fn wants_probe(&self, now: Instant) -> Option<ConcreteStrategy> {
    if self.configured != AcquisitionStrategyKind::Auto {
      return None;
    }
    let higher = self.active.higher()?;
    if now.saturating_duration_since(self.last_switch) < self.config.hysteresis() {
      return None;
    }
    match self.last_probe {
      Some(at) if now.saturating_duration_since(at) < self.config.promotion_check() => None,
      _ => Some(higher),
    }
  }

  pub fn record_probe(&mut self, strategy: ConcreteStrategy, success: bool, now: Instant) {
    self.last_probe = Some(now);
    if Some(strategy) == self.active.higher() {
      self.probe_succeeded = success;
      if success {
        tracing::info!("[Selector] Probe of {} succeeded", strategy);
      } else {
        tracing::debug!("[Selector] Probe of {} failed", strategy);
      }
    }
  }

  pub fn evaluate(&mut self, now: Instant) -> SelectorDecision {
    self.prune(now);
    if self.configured != AcquisitionStrategyKind::Auto {
      return SelectorDecision::Stay;
    }

    let from = self.active;
    if self.is_degraded() {
      if let Some(to) = from.lower() {
        tracing::warn!(
          "[Selector] Degrading {} -> {} ({} failures in window{})",
          from,
          to,
          self.failures.len(),
          if self.unavailable { ", channel unavailable" } else { "" }
        );
        self.switch_to(to, now);
        return SelectorDecision::Degrade { from, to };
      }
      return SelectorDecision::Stay;
    }

    if self.probe_succeeded {
      if let Some(to) = from.higher() {
        if now.saturating_duration_since(self.last_switch) >= self.config.hysteresis() {
          tracing::info!("[Selector] Promoting {} -> {}", from, to);
          self.switch_to(to, now);
          return SelectorDecision::Promote { from, to };
        }
      }
    }
    SelectorDecision::Stay
  }

  fn switch_to(&mut self, to: ConcreteStrategy, now: Instant) {
    self.active = to;
    self.failures.clear();
    self.unavailable = false;
    self.degraded = false;
    self.probe_succeeded = false;
    self.last_probe = None;
    self.last_switch = now;
  }
}
