// UI automation strategy: reads the client window through Windows UI Automation

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::{ConcreteStrategy, HealthSignal, RawEvent, StrategySink};
use crate::error::{PilotError, Result};

/// Visible text and button labels of the client window at one instant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScreenObservation {
  pub window_found: bool,
  pub texts: Vec<String>,
  pub buttons: Vec<String>,
}

impl ScreenObservation {
  pub fn has_text(&self, needle: &str) -> bool {
    let needle = needle.to_lowercase();
    self.texts.iter().any(|t| t.to_lowercase().contains(&needle))
  }

  pub fn has_button(&self, label: &str) -> bool {
    self.buttons.iter().any(|b| b.eq_ignore_ascii_case(label))
  }
}

/// The client window as seen by an accessibility API.
pub trait WindowSurface: Send + Sync {
  fn observe(&self) -> BoxFuture<'_, Result<ScreenObservation>>;

  /// Invoke the button with the given label.
  fn click<'a>(&'a self, button: &'a str) -> BoxFuture<'a, Result<()>>;
}

const OBSERVE_SCRIPT: &str = r#"
Add-Type -AssemblyName UIAutomationClient, UIAutomationTypes
$root = [System.Windows.Automation.AutomationElement]::RootElement
$cond = New-Object System.Windows.Automation.PropertyCondition([System.Windows.Automation.AutomationElement]::NameProperty, '__TITLE__')
$win = $root.FindFirst([System.Windows.Automation.TreeScope]::Children, $cond)
if ($win -eq $null) { '{"windowFound":false}'; exit 0 }
$texts = @(); $buttons = @()
foreach ($el in $win.FindAll([System.Windows.Automation.TreeScope]::Descendants, [System.Windows.Automation.Condition]::TrueCondition)) {
  $name = $el.Current.Name
  if ([string]::IsNullOrWhiteSpace($name)) { continue }
  if ($el.Current.ControlType -eq [System.Windows.Automation.ControlType]::Button) { $buttons += $name } else { $texts += $name }
}
@{ windowFound = $true; texts = $texts; buttons = $buttons } | ConvertTo-Json -Compress
"#;

const CLICK_SCRIPT: &str = r#"
Add-Type -AssemblyName UIAutomationClient, UIAutomationTypes
$root = [System.Windows.Automation.AutomationElement]::RootElement
$cond = New-Object System.Windows.Automation.PropertyCondition([System.Windows.Automation.AutomationElement]::NameProperty, '__TITLE__')
$win = $root.FindFirst([System.Windows.Automation.TreeScope]::Children, $cond)
if ($win -eq $null) { 'missing-window'; exit 0 }
$btnCond = New-Object System.Windows.Automation.PropertyCondition([System.Windows.Automation.AutomationElement]::NameProperty, '__BUTTON__')
$btn = $win.FindFirst([System.Windows.Automation.TreeScope]::Descendants, $btnCond)
if ($btn -eq $null) { 'missing-button'; exit 0 }
$btn.GetCurrentPattern([System.Windows.Automation.InvokePattern]::Pattern).Invoke()
'ok'
"#;

/// `WindowSurface` backed by PowerShell and the .NET UI Automation client.
#[derive(Debug, Clone)]
pub struct PowerShellSurface {
  window_title: String,
  timeout: Duration,
}

impl Default for PowerShellSurface {
  fn default() -> Self {
    Self::new("League of Legends")
  }
}

impl PowerShellSurface {
  pub fn new(window_title: impl Into<String>) -> Self {
    Self {
      window_title: window_title.into(),
      timeout: Duration::from_secs(5),
    }
  }

  async fn run_script(&self, script: String) -> Result<String> {
    let task = tokio::task::spawn_blocking(move || run_powershell(&script));
    match tokio::time::timeout(self.timeout, task).await {
      Err(_) => Err(PilotError::Timeout("UI automation script".into())),
      Ok(Err(join)) => Err(PilotError::Surface(join.to_string())),
      Ok(Ok(result)) => result,
    }
  }
}

fn quote(raw: &str) -> String {
  raw.replace('\'', "''")
}

#[cfg(target_os = "windows")]
fn run_powershell(script: &str) -> Result<String> {
  let output = crate::lcu::process::hidden_command("powershell")
    .args(["-NoProfile", "-NonInteractive", "-Command", script])
    .output()?;
  if !output.status.success() {
    return Err(PilotError::Surface(
      String::from_utf8_lossy(&output.stderr).trim().to_string(),
    ));
  }
  Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

#[cfg(not(target_os = "windows"))]
fn run_powershell(_script: &str) -> Result<String> {
  Err(PilotError::Surface(
    "UI automation is only available on Windows".into(),
  ))
}

impl WindowSurface for PowerShellSurface {
  fn observe(&self) -> BoxFuture<'_, Result<ScreenObservation>> {
    Box::pin(async move {
      let script = OBSERVE_SCRIPT.replace("__TITLE__", &quote(&self.window_title));
      let stdout = self.run_script(script).await?;
      Ok(serde_json::from_str(&stdout)?)
    })
  }

  fn click<'a>(&'a self, button: &'a str) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
      let script = CLICK_SCRIPT
        .replace("__TITLE__", &quote(&self.window_title))
        .replace("__BUTTON__", &quote(button));
      match self.run_script(script).await?.as_str() {
        "ok" => Ok(()),
        "missing-window" => Err(PilotError::Surface("client window not found".into())),
        _ => Err(PilotError::Surface(format!("button '{}' not found", button))),
      }
    })
  }
}

pub struct UiAutomationStrategy {
  surface: Arc<dyn WindowSurface>,
  interval: Duration,
  degraded_after: u32,
}

impl UiAutomationStrategy {
  pub fn new(surface: Arc<dyn WindowSurface>, interval: Duration, degraded_after: u32) -> Self {
    Self {
      surface,
      interval: interval.max(Duration::from_millis(100)),
      degraded_after: degraded_after.max(1),
    }
  }

  pub async fn run(self, sink: StrategySink, cancel: CancellationToken) {
    let kind = ConcreteStrategy::UiAutomation;
    let mut consecutive_failures: u32 = 0;
    let mut last: Option<ScreenObservation> = None;
    let mut ticker = tokio::time::interval(self.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
      tokio::select! {
        _ = cancel.cancelled() => break,
        _ = ticker.tick() => {}
      }

      let observed = self.surface.observe().await;

      let failure = match observed {
        Ok(observation) if observation.window_found => {
          if consecutive_failures > 0 {
            sink.report(kind, HealthSignal::ObservationOk);
          }
          consecutive_failures = 0;
          if last.as_ref() != Some(&observation) {
            last = Some(observation.clone());
            if sink.events.send(RawEvent::Screen(observation)).await.is_err() {
              return;
            }
          }
          continue;
        }
        Ok(_) => "client window not found".to_string(),
        Err(e) => e.to_string(),
      };

      consecutive_failures += 1;
      sink.report(kind, HealthSignal::ObservationFailed);
      tracing::debug!(
        "[UI Automation] Observation failed ({} in a row): {}",
        consecutive_failures,
        failure
      );
      if consecutive_failures == self.degraded_after {
        tracing::warn!(
          "[UI Automation] Degraded after {} failed observations",
          consecutive_failures
        );
        sink.report(kind, HealthSignal::Degraded);
      }
    }
  }
}
