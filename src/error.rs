use std::io;
use thiserror::Error;

// Error handling for client integration and automation

#[derive(Debug, Error)]
pub enum PilotError {
  #[error("IO Error: {0}")]
  Io(#[from] io::Error),
  #[error("JSON error: {0}")]
  Json(#[from] serde_json::Error),
  #[error("HTTP error: {0}")]
  Http(#[from] reqwest::Error),
  #[error("WebSocket error: {0}")]
  WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
  #[error("File watch error: {0}")]
  Watch(#[from] notify::Error),
  #[error("Invalid URL: {0}")]
  Url(#[from] url::ParseError),
  #[error("Credentials rejected by client on port {port}")]
  Unauthorized { port: u16 },
  #[error("LCU API returned {status} for {path}: {body}")]
  Api {
    status: u16,
    path: String,
    body: String,
  },
  #[error("Push channel unavailable: {0}")]
  PushUnavailable(String),
  #[error("No client endpoint available")]
  NoEndpoint,
  #[error("Configuration error: {0}")]
  Config(String),
  #[error("Concurrent edit detected: {0}")]
  Conflict(String),
  #[error("Timeout: {0}")]
  Timeout(String),
  #[error("Aborted: {0}")]
  Aborted(String),
  #[error("Window surface error: {0}")]
  Surface(String),
}

impl PilotError {
  /// Authentication rejections are fatal for the endpoint that produced them.
  pub fn is_fatal(&self) -> bool {
    matches!(self, Self::Unauthorized { .. })
  }

  /// Connection level failures that are worth retrying with backoff.
  pub fn is_transport(&self) -> bool {
    match self {
      Self::Http(err) => err.is_connect() || err.is_timeout() || err.is_request(),
      Self::WebSocket(_) | Self::Timeout(_) | Self::NoEndpoint => true,
      Self::Io(err) => matches!(
        err.kind(),
        io::ErrorKind::ConnectionRefused
          | io::ErrorKind::ConnectionReset
          | io::ErrorKind::ConnectionAborted
          | io::ErrorKind::TimedOut
      ),
      _ => false,
    }
  }

  pub fn status(&self) -> Option<u16> {
    match self {
      Self::Api { status, .. } => Some(*status),
      Self::Unauthorized { .. } => Some(401),
      _ => None,
    }
  }
}

pub type Result<T> = std::result::Result<T, PilotError>;
