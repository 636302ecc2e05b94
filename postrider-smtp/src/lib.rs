//! The SMTP edges of the relay: the local submission listener that feeds
//! the queue, and the client/transport that drains it to the upstream.

pub mod client;
pub mod command;
pub mod config;
pub mod listener;
mod session;
pub mod transport;

pub use config::{ListenerConfig, UpstreamConfig};
pub use listener::GatewayListener;
pub use transport::SmtpTransport;
