// osspilot - League client integration and champion select automation

pub mod automation;
pub mod bindings;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod lcu;
pub mod logging;
pub mod retry;
pub mod runes;
pub mod watcher;

#[cfg(test)]
mod test_helpers;

pub use config::PilotConfig;
pub use engine::{Engine, EngineStatus, ResetHandle};
pub use error::{PilotError, Result};
