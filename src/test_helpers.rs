// Shared test doubles

use futures_util::future::BoxFuture;
use futures_util::StreamExt;
use reqwest::Method;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use crate::error::{PilotError, Result};
use crate::lcu::{EventSubscription, LcuApi, LcuResponse};

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
  pub method: Method,
  pub path: String,
  pub body: Option<Value>,
}

type Handler = Box<dyn Fn(&Method, &str, Option<&Value>) -> Result<LcuResponse> + Send + Sync>;

/// Scripted in-memory client API that records every call.
pub struct MockLcu {
  handler: Handler,
  calls: Mutex<Vec<RecordedCall>>,
  push_frames: Mutex<Option<Vec<String>>>,
  install_dir: Option<PathBuf>,
  has_endpoint: AtomicBool,
  generation: AtomicU64,
}

impl MockLcu {
  pub fn new(
    handler: impl Fn(&Method, &str, Option<&Value>) -> Result<LcuResponse> + Send + Sync + 'static,
  ) -> Self {
    Self {
      handler: Box::new(handler),
      calls: Mutex::new(Vec::new()),
      push_frames: Mutex::new(None),
      install_dir: None,
      has_endpoint: AtomicBool::new(true),
      generation: AtomicU64::new(1),
    }
  }

  /// Every request succeeds with an empty body.
  pub fn accepting() -> Self {
    Self::new(|_, _, _| Ok(LcuResponse::no_content()))
  }

  pub fn with_install_dir(mut self, dir: impl Into<PathBuf>) -> Self {
    self.install_dir = Some(dir.into());
    self
  }

  /// Frames the next subscription yields before it closes.
  pub fn with_push_frames(self, frames: Vec<String>) -> Self {
    *self.push_frames.lock().unwrap() = Some(frames);
    self
  }

  pub fn set_has_endpoint(&self, present: bool) {
    self.has_endpoint.store(present, Ordering::SeqCst);
  }

  pub fn bump_generation(&self) {
    self.generation.fetch_add(1, Ordering::SeqCst);
  }

  pub fn calls(&self) -> Vec<RecordedCall> {
    self.calls.lock().unwrap().clone()
  }

  pub fn count(&self, method: Method, path: &str) -> usize {
    self
      .calls
      .lock()
      .unwrap()
      .iter()
      .filter(|c| c.method == method && c.path == path)
      .count()
  }

  pub fn writes(&self) -> Vec<RecordedCall> {
    self
      .calls()
      .into_iter()
      .filter(|c| c.method != Method::GET)
      .collect()
  }
}

impl LcuApi for MockLcu {
  fn request<'a>(
    &'a self,
    method: Method,
    path: &'a str,
    body: Option<Value>,
  ) -> BoxFuture<'a, Result<LcuResponse>> {
    let result = (self.handler)(&method, path, body.as_ref());
    self.calls.lock().unwrap().push(RecordedCall {
      method,
      path: path.to_string(),
      body,
    });
    Box::pin(async move { result })
  }

  fn subscribe<'a>(&'a self, _prefixes: &'a [String]) -> BoxFuture<'a, Result<EventSubscription>> {
    let frames = self.push_frames.lock().unwrap().clone();
    let generation = self.generation.load(Ordering::SeqCst);
    Box::pin(async move {
      match frames {
        Some(frames) => Ok(EventSubscription {
          generation,
          frames: futures_util::stream::iter(frames.into_iter().map(Ok)).boxed(),
        }),
        None => Err(PilotError::PushUnavailable("mock has no push channel".into())),
      }
    })
  }

  fn install_dir(&self) -> Option<PathBuf> {
    self.install_dir.clone()
  }

  fn has_endpoint(&self) -> bool {
    self.has_endpoint.load(Ordering::SeqCst)
  }

  fn generation(&self) -> u64 {
    self.generation.load(Ordering::SeqCst)
  }
}

pub fn api_error(status: u16, path: &str) -> PilotError {
  PilotError::Api {
    status,
    path: path.to_string(),
    body: String::new(),
  }
}
