//! Ties the pieces together: one configuration file describes the
//! submission listener, the spool, the dispatcher, and the health server,
//! and [`relay::Relay`] runs them all.

pub mod config;
pub mod relay;
