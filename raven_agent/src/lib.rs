//! raven_agent: status aggregation and live WebSocket broadcast for the NoC Raven
//! telemetry appliance.

pub mod aggregator;
pub mod api;
pub mod broadcast;
pub mod config;
pub mod error;
pub mod logging;
pub mod probe;
pub mod sampler;
pub mod settings;
pub mod state;
pub mod tail;
pub mod types;
pub mod ws;

#[cfg(test)]
mod test_support;

pub use error::{ApiError, Error, Result};
