pub mod envelope;
pub mod logging;

pub use tracing;

/// Control signals broadcast to every long-running component.
#[derive(Debug, Clone, Copy)]
pub enum Signal {
    Shutdown,
}
