use mailparse::addrparse;
use serde::{Deserialize, Serialize};

/// A message as accepted for relay: the envelope sender, the envelope
/// recipients, and the raw message data handed over in the DATA phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    sender: String,
    recipients: Vec<String>,
    data: Vec<u8>,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("Envelope has no sender")]
    MissingSender,

    #[error("Envelope has no recipients")]
    MissingRecipients,

    #[error("Envelope has no message data")]
    EmptyData,

    #[error("Message data is {size} bytes, which exceeds the limit of {limit}")]
    TooLarge { size: usize, limit: usize },

    #[error("Unparseable address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },
}

impl Envelope {
    #[must_use]
    pub const fn new(sender: String, recipients: Vec<String>, data: Vec<u8>) -> Self {
        Self {
            sender,
            recipients,
            data,
        }
    }

    #[must_use]
    pub fn sender(&self) -> &str {
        &self.sender
    }

    #[must_use]
    pub fn recipients(&self) -> &[String] {
        &self.recipients
    }

    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Checks that the envelope is complete and relayable: a parseable
    /// sender, at least one parseable recipient, and a non-empty body no
    /// larger than `max_size` bytes.
    ///
    /// # Errors
    ///
    /// Returns the first [`EnvelopeError`] encountered.
    pub fn validate(&self, max_size: usize) -> Result<(), EnvelopeError> {
        if self.sender.is_empty() {
            return Err(EnvelopeError::MissingSender);
        }

        Self::check_address(&self.sender)?;

        if self.recipients.is_empty() {
            return Err(EnvelopeError::MissingRecipients);
        }

        for recipient in &self.recipients {
            Self::check_address(recipient)?;
        }

        if self.data.is_empty() {
            return Err(EnvelopeError::EmptyData);
        }

        if self.data.len() > max_size {
            return Err(EnvelopeError::TooLarge {
                size: self.data.len(),
                limit: max_size,
            });
        }

        Ok(())
    }

    fn check_address(address: &str) -> Result<(), EnvelopeError> {
        let parsed = addrparse(address).map_err(|err| EnvelopeError::InvalidAddress {
            address: address.to_owned(),
            reason: err.to_string(),
        })?;

        if parsed.is_empty() {
            return Err(EnvelopeError::InvalidAddress {
                address: address.to_owned(),
                reason: "no address found".to_owned(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const LIMIT: usize = 1024;

    fn envelope() -> Envelope {
        Envelope::new(
            "sender@example.com".to_owned(),
            vec!["rcpt@example.com".to_owned()],
            b"Subject: hi\r\n\r\nhello\r\n".to_vec(),
        )
    }

    #[test]
    fn valid_envelope_passes() {
        assert_eq!(envelope().validate(LIMIT), Ok(()));
    }

    #[test]
    fn empty_sender_is_rejected() {
        let mut env = envelope();
        env.sender = String::new();
        assert_eq!(env.validate(LIMIT), Err(EnvelopeError::MissingSender));
    }

    #[test]
    fn empty_recipient_list_is_rejected() {
        let mut env = envelope();
        env.recipients.clear();
        assert_eq!(env.validate(LIMIT), Err(EnvelopeError::MissingRecipients));
    }

    #[test]
    fn empty_data_is_rejected() {
        let mut env = envelope();
        env.data.clear();
        assert_eq!(env.validate(LIMIT), Err(EnvelopeError::EmptyData));
    }

    #[test]
    fn oversized_data_is_rejected() {
        let mut env = envelope();
        env.data = vec![b'x'; LIMIT + 1];
        assert_eq!(
            env.validate(LIMIT),
            Err(EnvelopeError::TooLarge {
                size: LIMIT + 1,
                limit: LIMIT
            })
        );
    }

    #[test]
    fn garbage_recipient_is_rejected() {
        let mut env = envelope();
        env.recipients.push("not an address <<".to_owned());
        assert!(matches!(
            env.validate(LIMIT),
            Err(EnvelopeError::InvalidAddress { .. })
        ));
    }
}
