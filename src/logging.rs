// Logging setup: stdout, an on-disk live log and a bounded in-memory buffer

use chrono::Local;
use once_cell::sync::Lazy;
use std::collections::VecDeque;
use std::fmt::Write as _;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::error::{PilotError, Result};

pub const LIVE_LOG_NAME: &str = "osspilot-live.log";
const BUFFER_LINES: usize = 2000;

static LOG_BUFFER: Lazy<Mutex<VecDeque<String>>> = Lazy::new(|| Mutex::new(VecDeque::new()));

pub fn logs_dir(app_dir: &Path) -> PathBuf {
  app_dir.join("logs")
}

fn push_line(line: String) {
  let mut buf = LOG_BUFFER.lock().unwrap_or_else(|p| p.into_inner());
  buf.push_back(line);
  while buf.len() > BUFFER_LINES {
    buf.pop_front();
  }
}

/// Last lines logged by this process, oldest first.
pub fn buffered_lines() -> Vec<String> {
  let buf = LOG_BUFFER.lock().unwrap_or_else(|p| p.into_inner());
  buf.iter().cloned().collect()
}

#[derive(Default)]
struct MessageVisitor {
  message: String,
  fields: String,
}

impl Visit for MessageVisitor {
  fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
    if field.name() == "message" {
      let _ = write!(self.message, "{:?}", value);
    } else {
      let _ = write!(self.fields, " {}={:?}", field.name(), value);
    }
  }

  fn record_str(&mut self, field: &Field, value: &str) {
    if field.name() == "message" {
      self.message.push_str(value);
    } else {
      let _ = write!(self.fields, " {}={}", field.name(), value);
    }
  }
}

/// Keeps formatted events in `LOG_BUFFER` for export when the live log is
/// unavailable.
struct BufferLayer;

impl<S: Subscriber> Layer<S> for BufferLayer {
  fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
    let mut visitor = MessageVisitor::default();
    event.record(&mut visitor);
    push_line(format!(
      "{} {:>5} {}{}",
      Local::now().format("%H:%M:%S%.3f"),
      event.metadata().level(),
      visitor.message,
      visitor.fields
    ));
  }
}

/// Install the global subscriber. `RUST_LOG` overrides the level. The
/// returned guard flushes the live log when dropped and must be held for the
/// life of the program.
pub fn init(app_dir: &Path, verbose: bool) -> Result<WorkerGuard> {
  let dir = logs_dir(app_dir);
  fs::create_dir_all(&dir)?;
  let file_appender = tracing_appender::rolling::never(&dir, LIVE_LOG_NAME);
  let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

  let default_level = if verbose { "debug" } else { "info" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

  tracing_subscriber::registry()
    .with(filter)
    .with(tracing_subscriber::fmt::layer().with_target(false))
    .with(
      tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true),
    )
    .with(BufferLayer)
    .try_init()
    .map_err(|e| PilotError::Config(format!("Logging already initialized: {}", e)))?;

  tracing::info!("[Logging] Writing live log to {}", dir.join(LIVE_LOG_NAME).display());
  Ok(guard)
}

/// Copy the live log (or the in-memory buffer when the file is missing or
/// empty) to a timestamped file and return its path.
pub fn export_logs(app_dir: &Path) -> Result<PathBuf> {
  let dir = logs_dir(app_dir);
  fs::create_dir_all(&dir)?;

  let live = match fs::read_to_string(dir.join(LIVE_LOG_NAME)) {
    Ok(text) if !text.is_empty() => Some(text),
    _ => None,
  };
  let contents = match live {
    Some(text) => text,
    None => {
      let lines = buffered_lines();
      if lines.is_empty() {
        return Err(PilotError::Config("No logs available".into()));
      }
      lines.join("\n")
    }
  };

  let file_name = format!("osspilot-logs-{}.txt", Local::now().format("%Y%m%d-%H%M%S"));
  let out_path = dir.join(file_name);
  let mut file = File::create(&out_path)?;
  file.write_all(contents.as_bytes())?;
  file.sync_all()?;
  Ok(out_path)
}
