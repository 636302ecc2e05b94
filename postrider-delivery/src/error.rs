//! Typed error handling for delivery attempts.
//!
//! Every failure is classified exactly once, at the transport boundary,
//! into one of two kinds:
//! - Permanent failures (5xx SMTP codes) - don't retry
//! - Temporary failures (4xx SMTP codes, I/O, timeouts) - retry with backoff
//!
//! Everything downstream of the transport consumes the classification and
//! never re-derives it.

use thiserror::Error;

/// The outcome classification of a failed delivery attempt.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Permanent failure that should not be retried (e.g., 5xx SMTP codes).
    #[error("Permanent failure: {0}")]
    Permanent(#[from] PermanentError),

    /// Temporary failure that can be retried with backoff (e.g., 4xx SMTP codes).
    #[error("Temporary failure: {0}")]
    Temporary(#[from] TemporaryError),
}

/// Permanent errors that should not be retried.
///
/// These typically correspond to 5xx SMTP response codes.
#[derive(Debug, Error)]
pub enum PermanentError {
    /// Recipient address is invalid or rejected by the server.
    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    /// Message was rejected by the server (e.g., policy violation, spam).
    #[error("Message rejected: {0}")]
    MessageRejected(String),

    /// SMTP authentication failed.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Message size exceeds server limits.
    #[error("Message too large: {0}")]
    MessageTooLarge(String),
}

/// Temporary errors that should be retried with backoff.
///
/// These typically correspond to 4xx SMTP response codes or transient
/// network issues.
#[derive(Debug, Error)]
pub enum TemporaryError {
    /// Failed to establish connection to the upstream server.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Server is temporarily busy or unavailable.
    #[error("Server busy: {0}")]
    ServerBusy(String),

    /// The attempt exceeded its deadline.
    #[error("Attempt timed out: {0}")]
    Timeout(String),

    /// Server returned a temporary failure code.
    #[error("Temporary SMTP error: {0}")]
    SmtpTemporary(String),

    /// TLS handshake failed.
    #[error("TLS handshake failed: {0}")]
    TlsHandshakeFailed(String),
}

impl DeliveryError {
    /// Returns `true` if this error is temporary and may be retried.
    #[must_use]
    pub const fn is_temporary(&self) -> bool {
        matches!(self, Self::Temporary(_))
    }

    /// Returns `true` if this error is permanent and must not be retried.
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent(_))
    }

    /// Classify an SMTP reply code the upstream returned for any command.
    ///
    /// 4xx codes become temporary failures, everything else that reaches
    /// this function (5xx, or a malformed code) is treated as permanent.
    #[must_use]
    pub fn from_smtp_reply(code: u16, message: &str) -> Self {
        if (400..500).contains(&code) {
            match code {
                421 | 450 => {
                    Self::Temporary(TemporaryError::ServerBusy(format!("{code} {message}")))
                }
                _ => Self::Temporary(TemporaryError::SmtpTemporary(format!("{code} {message}"))),
            }
        } else {
            match code {
                550 | 551 | 553 => {
                    Self::Permanent(PermanentError::InvalidRecipient(format!("{code} {message}")))
                }
                552 => {
                    Self::Permanent(PermanentError::MessageTooLarge(format!("{code} {message}")))
                }
                535 => Self::Permanent(PermanentError::AuthenticationFailed(format!(
                    "{code} {message}"
                ))),
                _ => Self::Permanent(PermanentError::MessageRejected(format!("{code} {message}"))),
            }
        }
    }
}
