// Bounded exponential backoff shared by the transport and the action dispatcher

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryPolicy {
  #[serde(default = "default_max_attempts")]
  pub max_attempts: u32,
  #[serde(default = "default_base_delay_ms")]
  pub base_delay_ms: u64,
  #[serde(default = "default_max_delay_ms")]
  pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
  4
}

fn default_base_delay_ms() -> u64 {
  250
}

fn default_max_delay_ms() -> u64 {
  4000
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_attempts: default_max_attempts(),
      base_delay_ms: default_base_delay_ms(),
      max_delay_ms: default_max_delay_ms(),
    }
  }
}

impl RetryPolicy {
  pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
    Self {
      max_attempts: max_attempts.max(1),
      base_delay_ms: base_delay.as_millis() as u64,
      max_delay_ms: max_delay.as_millis() as u64,
    }
  }

  /// Delay to wait after the given failed attempt (1-based).
  pub fn delay_after(&self, attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(16);
    let delay = self.base_delay_ms.saturating_mul(1u64 << exp);
    Duration::from_millis(delay.min(self.max_delay_ms))
  }

  pub fn attempts(&self) -> u32 {
    self.max_attempts.max(1)
  }
}
