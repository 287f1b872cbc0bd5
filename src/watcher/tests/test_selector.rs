// Tests for tier selection

use super::super::{
  AcquisitionStrategyKind, ConcreteStrategy, HealthReport, HealthSignal, SelectorConfig,
  SelectorDecision, StrategySelector,
};
use std::time::{Duration, Instant};

fn report(strategy: ConcreteStrategy, signal: HealthSignal, at: Instant) -> HealthReport {
  HealthReport {
    strategy,
    signal,
    at,
  }
}

#[cfg(test)]
mod selector_tests {
  use super::*;

  /// Test: Push channel unavailable
  ///
  /// Scenario: Auto starts on PushEvents and the client answers that no push channel exists.
  /// Expected: Exactly one step down to Polling in one evaluation, and no further.
  #[test]
  fn test_unavailable_push_degrades_one_tier() {
    let start = Instant::now();
    let mut selector =
      StrategySelector::new(AcquisitionStrategyKind::Auto, SelectorConfig::default(), start);
    assert_eq!(selector.active(), ConcreteStrategy::PushEvents);

    selector.record(&report(ConcreteStrategy::PushEvents, HealthSignal::Unavailable, start));
    assert_eq!(
      selector.evaluate(start),
      SelectorDecision::Degrade {
        from: ConcreteStrategy::PushEvents,
        to: ConcreteStrategy::Polling
      }
    );
    assert_eq!(selector.active(), ConcreteStrategy::Polling);
    assert_eq!(selector.evaluate(start), SelectorDecision::Stay);
  }

  /// Test: Stream closures inside and outside the window
  ///
  /// Scenario: Three closures are tolerated, a fourth in the window degrades; old ones age out.
  /// Expected: Degradation only when the count exceeds the threshold inside the window.
  #[test]
  fn test_failure_threshold_uses_sliding_window() {
    let start = Instant::now();
    let config = SelectorConfig {
      push_failure_threshold: 3,
      failure_window_secs: 60,
      ..SelectorConfig::default()
    };
    let mut selector = StrategySelector::new(AcquisitionStrategyKind::Auto, config, start);

    for _ in 0..3 {
      selector.record(&report(ConcreteStrategy::PushEvents, HealthSignal::StreamClosed, start));
    }
    assert_eq!(selector.evaluate(start), SelectorDecision::Stay);

    // The early failures have left the window by now
    let later = start + Duration::from_secs(61);
    selector.record(&report(ConcreteStrategy::PushEvents, HealthSignal::StreamClosed, later));
    assert_eq!(selector.evaluate(later), SelectorDecision::Stay);

    for _ in 0..3 {
      selector.record(&report(ConcreteStrategy::PushEvents, HealthSignal::StreamClosed, later));
    }
    assert!(matches!(
      selector.evaluate(later),
      SelectorDecision::Degrade {
        to: ConcreteStrategy::Polling,
        ..
      }
    ));
  }

  /// Test: Stale reports
  ///
  /// Scenario: The old strategy reports a failure after the switch already happened.
  /// Expected: The report is ignored.
  #[test]
  fn test_reports_from_inactive_strategy_are_ignored() {
    let start = Instant::now();
    let mut selector =
      StrategySelector::new(AcquisitionStrategyKind::Auto, SelectorConfig::default(), start);
    selector.record(&report(ConcreteStrategy::PushEvents, HealthSignal::Unavailable, start));
    selector.evaluate(start);

    selector.record(&report(ConcreteStrategy::PushEvents, HealthSignal::Unavailable, start));
    assert_eq!(selector.evaluate(start), SelectorDecision::Stay);
    assert_eq!(selector.active(), ConcreteStrategy::Polling);
  }

  /// Test: Promotion with hysteresis
  ///
  /// Scenario: After degrading to Polling, a push probe succeeds before and after the hysteresis window.
  /// Expected: No probe is requested inside the window; a successful probe afterwards promotes one tier.
  #[test]
  fn test_promotion_respects_hysteresis() {
    let start = Instant::now();
    let config = SelectorConfig {
      hysteresis_secs: 30,
      promotion_check_secs: 15,
      ..SelectorConfig::default()
    };
    let mut selector = StrategySelector::new(AcquisitionStrategyKind::Polling, config.clone(), start);
    assert_eq!(selector.wants_probe(start + Duration::from_secs(100)), None);

    let mut selector = StrategySelector::new(AcquisitionStrategyKind::Auto, config, start);
    selector.record(&report(ConcreteStrategy::PushEvents, HealthSignal::Unavailable, start));
    selector.evaluate(start);

    assert_eq!(selector.wants_probe(start + Duration::from_secs(10)), None);
    let due = start + Duration::from_secs(31);
    assert_eq!(selector.wants_probe(due), Some(ConcreteStrategy::PushEvents));

    selector.record_probe(ConcreteStrategy::PushEvents, false, due);
    assert_eq!(selector.evaluate(due), SelectorDecision::Stay);
    assert_eq!(selector.wants_probe(due + Duration::from_secs(5)), None);

    let retry = due + Duration::from_secs(16);
    assert_eq!(selector.wants_probe(retry), Some(ConcreteStrategy::PushEvents));
    selector.record_probe(ConcreteStrategy::PushEvents, true, retry);
    assert_eq!(
      selector.evaluate(retry),
      SelectorDecision::Promote {
        from: ConcreteStrategy::Polling,
        to: ConcreteStrategy::PushEvents
      }
    );
  }

  /// Test: Pinned strategy
  ///
  /// Scenario: The user pins Polling and the API keeps failing.
  /// Expected: No switch, but the selector reports itself degraded.
  #[test]
  fn test_pinned_strategy_never_switches() {
    let start = Instant::now();
    let mut selector =
      StrategySelector::new(AcquisitionStrategyKind::Polling, SelectorConfig::default(), start);
    for _ in 0..10 {
      selector.record(&report(ConcreteStrategy::Polling, HealthSignal::RequestFailed, start));
    }
    assert_eq!(selector.evaluate(start), SelectorDecision::Stay);
    assert_eq!(selector.active(), ConcreteStrategy::Polling);
    assert!(selector.is_degraded());
  }

  /// Test: Bottom tier
  ///
  /// Scenario: UI automation degrades while it is already the last resort.
  /// Expected: Stay on UI automation.
  #[test]
  fn test_ui_automation_is_the_floor() {
    let start = Instant::now();
    let mut selector =
      StrategySelector::new(AcquisitionStrategyKind::Auto, SelectorConfig::default(), start);
    selector.record(&report(ConcreteStrategy::PushEvents, HealthSignal::Unavailable, start));
    selector.evaluate(start);
    for _ in 0..6 {
      selector.record(&report(ConcreteStrategy::Polling, HealthSignal::RequestFailed, start));
    }
    assert_eq!(selector.evaluate(start).target(), Some(ConcreteStrategy::UiAutomation));

    selector.record(&report(ConcreteStrategy::UiAutomation, HealthSignal::Degraded, start));
    assert_eq!(selector.evaluate(start), SelectorDecision::Stay);
    assert!(selector.is_degraded());
  }

  /// Test: Parsing configured kinds
  ///
  /// Scenario: Config and CLI spellings of the acquisition method.
  /// Expected: All map to the right kind; unknown names are errors.
  #[test]
  fn test_kind_from_str() {
    let parse = |raw: &str| raw.parse::<AcquisitionStrategyKind>();
    assert_eq!(parse("auto"), Ok(AcquisitionStrategyKind::Auto));
    assert_eq!(parse("push"), Ok(AcquisitionStrategyKind::PushEvents));
    assert_eq!(parse("Polling"), Ok(AcquisitionStrategyKind::Polling));
    assert_eq!(parse("ui-automation"), Ok(AcquisitionStrategyKind::UiAutomation));
    assert!("carrier-pigeon".parse::<AcquisitionStrategyKind>().is_err());
  }
}
