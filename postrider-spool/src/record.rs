use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use postrider_common::envelope::Envelope;

use crate::MessageId;

/// Where a record sits in its delivery lifecycle.
///
/// `Delivered` and `Failed` are terminal; nothing transitions out of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeliveryStatus {
    /// Awaiting its first delivery attempt.
    Pending,
    /// Leased by a worker; a delivery attempt is underway.
    InFlight,
    /// Relayed upstream successfully.
    Delivered,
    /// A previous attempt failed transiently; waiting out the retry delay.
    Retrying,
    /// Given up, either permanently rejected or out of retry budget.
    Failed,
}

impl DeliveryStatus {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Failed)
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = match self {
            Self::Pending => "pending",
            Self::InFlight => "in-flight",
            Self::Delivered => "delivered",
            Self::Retrying => "retrying",
            Self::Failed => "failed",
        };
        f.write_str(status)
    }
}

/// The outcome a worker reports for a leased record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// The upstream accepted the message.
    Delivered,
    /// The attempt failed transiently; try again after `delay`.
    Retry { delay: Duration, error: String },
    /// The attempt failed for good.
    Failed { error: String },
}

/// A message in the queue, together with everything the dispatcher needs to
/// schedule and account for its delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: MessageId,
    pub envelope: Envelope,
    pub status: DeliveryStatus,
    /// Number of delivery attempts made so far.
    pub attempt_count: u32,
    /// Earliest time the record is eligible for (re)delivery.
    pub next_attempt_at: SystemTime,
    /// Human-readable description of the most recent failure.
    pub last_error: Option<String>,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

impl MessageRecord {
    /// A fresh record for a newly accepted envelope, eligible immediately.
    #[must_use]
    pub fn accept(envelope: Envelope, now: SystemTime) -> Self {
        Self {
            id: MessageId::generate(),
            envelope,
            status: DeliveryStatus::Pending,
            attempt_count: 0,
            next_attempt_at: now,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether this record may be leased at `now`.
    #[must_use]
    pub fn is_eligible(&self, now: SystemTime) -> bool {
        matches!(
            self.status,
            DeliveryStatus::Pending | DeliveryStatus::Retrying
        ) && self.next_attempt_at <= now
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn fresh_record_is_immediately_eligible() {
        let now = SystemTime::now();
        let record = MessageRecord::accept(Envelope::default(), now);
        assert_eq!(record.status, DeliveryStatus::Pending);
        assert_eq!(record.attempt_count, 0);
        assert!(record.is_eligible(now));
    }

    #[test]
    fn future_retry_is_not_eligible() {
        let now = SystemTime::now();
        let mut record = MessageRecord::accept(Envelope::default(), now);
        record.status = DeliveryStatus::Retrying;
        record.next_attempt_at = now + Duration::from_secs(30);
        assert!(!record.is_eligible(now));
        assert!(record.is_eligible(now + Duration::from_secs(30)));
    }

    #[test]
    fn terminal_statuses_are_never_eligible() {
        let now = SystemTime::now();
        for status in [DeliveryStatus::Delivered, DeliveryStatus::Failed] {
            let mut record = MessageRecord::accept(Envelope::default(), now);
            record.status = status;
            assert!(status.is_terminal());
            assert!(!record.is_eligible(now + Duration::from_secs(3600)));
        }
    }

    #[test]
    fn in_flight_is_not_eligible() {
        let now = SystemTime::now();
        let mut record = MessageRecord::accept(Envelope::default(), now);
        record.status = DeliveryStatus::InFlight;
        assert!(!record.is_eligible(now));
    }
}
