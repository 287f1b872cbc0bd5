// LCU module - discovery of the local client and the connection to its API

pub mod connection;
pub mod locator;
pub mod process;
pub mod status;
pub mod types;

#[cfg(test)]
mod tests;

pub use connection::{
  get_json, send_json, ConnectionManager, ConnectionOptions, EndpointChange, EndpointDebouncer,
  EventSubscription, LcuApi, LcuResponse,
};
pub use locator::ClientLocator;
pub use status::check_connectivity;
pub use types::{parse_lockfile, ClientEndpoint, ConnectivityStatus, LcuEventEnvelope, LcuEventType};
