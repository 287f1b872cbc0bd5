// Connection to the local LCU API: authenticated REST requests and the WAMP event socket

use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use futures_util::{SinkExt, StreamExt};
use http::header::{ACCEPT, AUTHORIZATION, SEC_WEBSOCKET_PROTOCOL};
use http::HeaderValue;
use native_tls::TlsConnector;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::Connector;
use url::Url;

use super::types::ClientEndpoint;
use crate::error::{PilotError, Result};
use crate::retry::RetryPolicy;

/// Decoded response of a successful request. Empty bodies become `Null`.
#[derive(Debug, Clone, PartialEq)]
pub struct LcuResponse {
  pub status: u16,
  pub body: Value,
}

impl LcuResponse {
  pub fn ok(body: Value) -> Self {
    Self { status: 200, body }
  }

  pub fn no_content() -> Self {
    Self {
      status: 204,
      body: Value::Null,
    }
  }

  pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
    Ok(serde_json::from_value(self.body.clone())?)
  }
}

/// Raw text frames of the push channel. Ends when the socket closes or the
/// endpoint it was opened against is superseded.
pub struct EventSubscription {
  pub generation: u64,
  pub frames: BoxStream<'static, Result<String>>,
}

/// Everything the engine needs from the client. Implemented by
/// `ConnectionManager` and by test doubles.
pub trait LcuApi: Send + Sync {
  fn request<'a>(
    &'a self,
    method: Method,
    path: &'a str,
    body: Option<Value>,
  ) -> BoxFuture<'a, Result<LcuResponse>>;

  /// Open the push channel for the given resource prefixes. Builds without a
  /// push channel answer `PushUnavailable`.
  fn subscribe<'a>(&'a self, _prefixes: &'a [String]) -> BoxFuture<'a, Result<EventSubscription>> {
    Box::pin(async { Err(PilotError::PushUnavailable("push channel not supported".into())) })
  }

  /// Install directory of the connected client, if known.
  fn install_dir(&self) -> Option<PathBuf> {
    None
  }

  fn has_endpoint(&self) -> bool {
    true
  }

  /// Bumped whenever the endpoint behind this API changes.
  fn generation(&self) -> u64 {
    0
  }
}

pub async fn get_json<T: DeserializeOwned>(api: &dyn LcuApi, path: &str) -> Result<T> {
  api.request(Method::GET, path, None).await?.json()
}

pub async fn send_json(
  api: &dyn LcuApi,
  method: Method,
  path: &str,
  body: Value,
) -> Result<LcuResponse> {
  api.request(method, path, Some(body)).await
}

/// WAMP subscribe frame for a resource prefix such as `/lol-gameflow/v1/gameflow-phase`.
pub fn subscription_frame(prefix: &str) -> String {
  let trimmed = prefix.trim_start_matches('/');
  let topic = if trimmed.is_empty() {
    "OnJsonApiEvent".to_string()
  } else {
    format!("OnJsonApiEvent_{}", trimmed.replace('/', "_"))
  };
  format!("[5,\"{}\"]", topic)
}

#[derive(Debug, Clone)]
pub struct ConnectionOptions {
  pub request_timeout: Duration,
  pub connect_timeout: Duration,
  pub transport_retry: RetryPolicy,
  /// PEM root certificate the client's self-signed chain is issued from.
  pub root_cert: Option<PathBuf>,
}

impl Default for ConnectionOptions {
  fn default() -> Self {
    Self {
      request_timeout: Duration::from_secs(5),
      connect_timeout: Duration::from_secs(2),
      transport_retry: RetryPolicy::new(3, Duration::from_millis(200), Duration::from_secs(2)),
      root_cert: None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointChange {
  Unchanged,
  Adopted(Arc<ClientEndpoint>),
  Cleared,
  IgnoredRejected,
}

#[derive(Default)]
struct ConnState {
  endpoint: Option<Arc<ClientEndpoint>>,
  rejected: Option<ClientEndpoint>,
}

pub struct ConnectionManager {
  http: reqwest::Client,
  tls: TlsConnector,
  state: RwLock<ConnState>,
  generation: watch::Sender<u64>,
  options: ConnectionOptions,
}

impl ConnectionManager {
  pub fn new(options: ConnectionOptions) -> Result<Self> {
    let mut http = reqwest::Client::builder()
      .timeout(options.request_timeout)
      .connect_timeout(options.connect_timeout)
      .pool_max_idle_per_host(2);
    let mut tls = TlsConnector::builder();

    match &options.root_cert {
      Some(path) => {
        let pem = std::fs::read(path)?;
        let http_cert = reqwest::Certificate::from_pem(&pem)?;
        let tls_cert = native_tls::Certificate::from_pem(&pem)
          .map_err(|e| PilotError::Config(format!("Invalid root certificate: {}", e)))?;
        // The client certificate is issued for the loopback address, not a hostname
        http = http
          .add_root_certificate(http_cert)
          .danger_accept_invalid_hostnames(true);
        tls.add_root_certificate(tls_cert);
        tls.danger_accept_invalid_hostnames(true);
      }
      None => {
        http = http.danger_accept_invalid_certs(true);
        tls.danger_accept_invalid_certs(true);
      }
    }

    let tls = tls
      .build()
      .map_err(|e| PilotError::Config(format!("Failed to build TLS connector: {}", e)))?;
    let (generation, _) = watch::channel(0);

    Ok(Self {
      http: http.build()?,
      tls,
      state: RwLock::new(ConnState::default()),
      generation,
      options,
    })
  }

  fn read_state(&self) -> RwLockReadGuard<'_, ConnState> {
    self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  fn write_state(&self) -> RwLockWriteGuard<'_, ConnState> {
    self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  pub fn endpoint(&self) -> Option<Arc<ClientEndpoint>> {
    self.read_state().endpoint.clone()
  }

  pub fn generation(&self) -> u64 {
    *self.generation.borrow()
  }

  pub fn credentials_rejected(&self) -> bool {
    let state = self.read_state();
    match (&state.endpoint, &state.rejected) {
      (Some(current), Some(rejected)) => current.same_connection(rejected),
      (None, Some(_)) => true,
      _ => false,
    }
  }

  /// Replace the active endpoint. Any change bumps the generation, which ends
  /// open subscriptions.
  pub fn set_endpoint(&self, candidate: Option<ClientEndpoint>) -> EndpointChange {
    let change = {
      let mut state = self.write_state();
      match candidate {
        None => {
          if state.endpoint.take().is_some() {
            EndpointChange::Cleared
          } else {
            EndpointChange::Unchanged
          }
        }
        Some(candidate) => {
          let rejected = state
            .rejected
            .as_ref()
            .map(|r| r.same_connection(&candidate))
            .unwrap_or(false);
          let same = state
            .endpoint
            .as_ref()
            .map(|e| e.same_connection(&candidate))
            .unwrap_or(false);
          if rejected {
            state.endpoint = None;
            EndpointChange::IgnoredRejected
          } else if same {
            EndpointChange::Unchanged
          } else {
            let endpoint = Arc::new(candidate);
            state.endpoint = Some(endpoint.clone());
            state.rejected = None;
            EndpointChange::Adopted(endpoint)
          }
        }
      }
    };

    match &change {
      EndpointChange::Adopted(endpoint) => {
        tracing::info!(
          "[Connection] Using client on port {} (pid {})",
          endpoint.port,
          endpoint.pid
        );
        self.generation.send_modify(|g| *g += 1);
      }
      EndpointChange::Cleared => {
        tracing::info!("[Connection] Client endpoint cleared");
        self.generation.send_modify(|g| *g += 1);
      }
      EndpointChange::Unchanged | EndpointChange::IgnoredRejected => {}
    }
    change
  }

  fn mark_rejected(&self, endpoint: &ClientEndpoint) {
    tracing::warn!(
      "[Connection] Client rejected credentials on port {}; waiting for a new lockfile",
      endpoint.port
    );
    let cleared = {
      let mut state = self.write_state();
      state.rejected = Some(endpoint.clone());
      let current = state
        .endpoint
        .as_ref()
        .map(|e| e.same_connection(endpoint))
        .unwrap_or(false);
      if current {
        state.endpoint = None;
      }
      current
    };
    if cleared {
      self.generation.send_modify(|g| *g += 1);
    }
  }

  async fn send_once(
    &self,
    endpoint: &ClientEndpoint,
    method: Method,
    url: Url,
    body: Option<&Value>,
  ) -> std::result::Result<reqwest::Response, reqwest::Error> {
    let mut request = self
      .http
      .request(method, url)
      .header(AUTHORIZATION, endpoint.auth_header())
      .header(ACCEPT, "application/json");
    if let Some(body) = body {
      request = request.json(body);
    }
    request.send().await
  }

  async fn perform(&self, method: Method, path: &str, body: Option<Value>) -> Result<LcuResponse> {
    let endpoint = self.endpoint().ok_or(PilotError::NoEndpoint)?;
    let url = Url::parse(&endpoint.base_url())?.join(path)?;
    let retry = &self.options.transport_retry;

    let mut attempt = 0;
    let response = loop {
      attempt += 1;
      match self
        .send_once(&endpoint, method.clone(), url.clone(), body.as_ref())
        .await
      {
        Ok(response) => break response,
        Err(err) => {
          let err = PilotError::from(err);
          if err.is_transport() && attempt < retry.attempts() {
            let delay = retry.delay_after(attempt);
            tracing::debug!(
              "[Connection] {} {} failed ({}), retrying in {:?}",
              method,
              path,
              err,
              delay
            );
            tokio::time::sleep(delay).await;
            continue;
          }
          return Err(err);
        }
      }
    };

    let status = response.status().as_u16();
    if status == 401 || status == 403 {
      self.mark_rejected(&endpoint);
      return Err(PilotError::Unauthorized {
        port: endpoint.port,
      });
    }

    let text = response.text().await?;
    if !(200..300).contains(&status) {
      return Err(PilotError::Api {
        status,
        path: path.to_string(),
        body: text,
      });
    }

    let body = if text.trim().is_empty() {
      Value::Null
    } else {
      serde_json::from_str(&text).unwrap_or(Value::String(text))
    };
    Ok(LcuResponse { status, body })
  }

  async fn open_subscription(&self, prefixes: &[String]) -> Result<EventSubscription> {
    let endpoint = self.endpoint().ok_or(PilotError::NoEndpoint)?;
    let generation = self.generation();

    let mut request = endpoint.ws_url().into_client_request()?;
    let auth = HeaderValue::from_str(&endpoint.auth_header())
      .map_err(|e| PilotError::Config(format!("Invalid auth header: {}", e)))?;
    request.headers_mut().insert(AUTHORIZATION, auth);
    request
      .headers_mut()
      .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static("wamp"));

    let connect = tokio_tungstenite::connect_async_tls_with_config(
      request,
      None,
      false,
      Some(Connector::NativeTls(self.tls.clone())),
    );
    let (mut socket, _response) =
      match tokio::time::timeout(self.options.request_timeout, connect).await {
        Err(_) => return Err(PilotError::Timeout("WebSocket handshake".into())),
        Ok(Err(WsError::Http(response))) => {
          let status = response.status().as_u16();
          if status == 401 || status == 403 {
            self.mark_rejected(&endpoint);
            return Err(PilotError::Unauthorized {
              port: endpoint.port,
            });
          }
          return Err(PilotError::PushUnavailable(format!(
            "WebSocket upgrade refused with HTTP {}",
            status
          )));
        }
        Ok(Err(err)) => return Err(err.into()),
        Ok(Ok(ok)) => ok,
      };

    if prefixes.is_empty() {
      socket.send(Message::Text(subscription_frame(""))).await?;
    }
    for prefix in prefixes {
      socket.send(Message::Text(subscription_frame(prefix))).await?;
    }

    let (tx, rx) = mpsc::channel::<Result<String>>(256);
    let mut generation_rx = self.generation.subscribe();
    tokio::spawn(async move {
      loop {
        tokio::select! {
          changed = generation_rx.changed() => {
            if changed.is_err() || *generation_rx.borrow() != generation {
              let _ = socket.close(None).await;
              break;
            }
          }
          frame = socket.next() => {
            match frame {
              Some(Ok(Message::Text(text))) => {
                if tx.send(Ok(text)).await.is_err() {
                  let _ = socket.close(None).await;
                  break;
                }
              }
              Some(Ok(Message::Close(_))) | None => break,
              Some(Ok(_)) => {}
              Some(Err(err)) => {
                let _ = tx.send(Err(err.into())).await;
                break;
              }
            }
          }
        }
      }
    });

    let frames = futures_util::stream::unfold(rx, |mut rx| async move {
      rx.recv().await.map(|item| (item, rx))
    })
    .boxed();

    tracing::info!(
      "[Connection] Event socket open on port {} ({} topics)",
      endpoint.port,
      prefixes.len().max(1)
    );
    Ok(EventSubscription { generation, frames })
  }
}

impl LcuApi for ConnectionManager {
  fn request<'a>(
    &'a self,
    method: Method,
    path: &'a str,
    body: Option<Value>,
  ) -> BoxFuture<'a, Result<LcuResponse>> {
    Box::pin(self.perform(method, path, body))
  }

  fn subscribe<'a>(&'a self, prefixes: &'a [String]) -> BoxFuture<'a, Result<EventSubscription>> {
    Box::pin(self.open_subscription(prefixes))
  }

  fn install_dir(&self) -> Option<PathBuf> {
    self.endpoint().map(|e| e.install_dir.clone())
  }

  fn has_endpoint(&self) -> bool {
    self.endpoint().is_some()
  }

  fn generation(&self) -> u64 {
    ConnectionManager::generation(self)
  }
}

/// Holds back a new endpoint until it has been seen unchanged for the quiet
/// interval, so a flapping client during startup does not cause reconnect
/// storms. Removal is passed through immediately.
#[derive(Debug)]
pub struct EndpointDebouncer {
  quiet: Duration,
  pending: Option<(ClientEndpoint, Instant)>,
}

impl EndpointDebouncer {
  pub fn new(quiet: Duration) -> Self {
    Self {
      quiet,
      pending: None,
    }
  }

  /// Returns `Some(value)` when the active endpoint should become `value`.
  pub fn offer(
    &mut self,
    candidate: Option<ClientEndpoint>,
    current: Option<&ClientEndpoint>,
    now: Instant,
  ) -> Option<Option<ClientEndpoint>> {
    let candidate = match candidate {
      None => {
        self.pending = None;
        return current.map(|_| None);
      }
      Some(candidate) => candidate,
    };

    if current.map(|c| c.same_connection(&candidate)).unwrap_or(false) {
      self.pending = None;
      return None;
    }

    match self.pending.take() {
      Some((pending, since)) if pending.same_connection(&candidate) => {
        if now.saturating_duration_since(since) >= self.quiet {
          Some(Some(candidate))
        } else {
          self.pending = Some((pending, since));
          None
        }
      }
      _ => {
        if self.quiet.is_zero() {
          return Some(Some(candidate));
        }
        self.pending = Some((candidate, now));
        None
      }
    }
  }
}
