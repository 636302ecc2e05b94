//! Structured logging for the relay.
//!
//! Events are emitted inside a direction span (`incoming`, `outgoing`, or
//! `internal`) so a session transcript reads like a wire capture: what the
//! peer sent, what we replied, and what happened in between.

use std::str::FromStr;

use tracing::metadata::LevelFilter;
use tracing_subscriber::{
    Layer, filter::FilterFn, layer::SubscriberExt, util::SubscriberInitExt,
};

#[macro_export]
macro_rules! log {
    ($level:expr, $span:expr, $($msg:expr),*) => {{
        let span = $crate::tracing::span!($level, $span);
        let _enter = span.enter();

        $crate::tracing::event!($level, $($msg),*)
    }};
}

/// Something sent to a peer (a session reply, an upstream command).
#[macro_export]
macro_rules! outgoing {
    (level = $level:ident, $($msg:expr),*) => {
        $crate::log!($crate::tracing::Level::$level, "outgoing", $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::outgoing!(level = TRACE, $($msg),*)
    };
}

/// Something received from a peer.
#[macro_export]
macro_rules! incoming {
    (level = $level:ident, $($msg:expr),*) => {
        $crate::log!($crate::tracing::Level::$level, "incoming", $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::incoming!(level = TRACE, $($msg),*)
    };
}

/// Anything that never touched the wire.
#[macro_export]
macro_rules! internal {
    (level = $level:ident, $($msg:expr),*) => {
        $crate::log!($crate::tracing::Level::$level, "internal", $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::internal!(level = TRACE, $($msg),*)
    };
}

/// Install the process-wide subscriber.
///
/// Verbosity comes from `POSTRIDER_LOG` (`trace`, `debug`, `info`, `warn`,
/// `error`), defaulting to `info` in release builds. Only this workspace's
/// own events pass the filter; dependency chatter is dropped. Timestamps are
/// UTC RFC 3339 so delivery logs line up with `Received:` headers and
/// upstream provider logs.
pub fn init() {
    let fallback = if cfg!(debug_assertions) {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    };

    let level = std::env::var("POSTRIDER_LOG").map_or(fallback, |requested| {
        LevelFilter::from_str(&requested).unwrap_or_else(|_| {
            eprintln!("Unrecognised POSTRIDER_LOG value {requested:?}, using {fallback}");
            fallback
        })
    });

    let relay_only = FilterFn::new(|metadata| metadata.target().starts_with("postrider"));

    let format = tracing_subscriber::fmt::layer()
        .compact()
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::ChronoUtc::rfc_3339());

    tracing_subscriber::registry()
        .with(format.with_filter(level).with_filter(relay_only))
        .init();
}
