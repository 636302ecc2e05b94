//! Liveness/readiness probes and queue stats over HTTP.

pub mod config;
pub mod error;
pub mod server;

pub use config::HealthConfig;
pub use error::HealthError;
pub use server::HealthServer;
