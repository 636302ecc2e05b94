//! The upstream delivery transport.
//!
//! One SMTP conversation per attempt: connect, EHLO, optional STARTTLS and
//! AUTH PLAIN, then a single MAIL/RCPT/DATA transaction. Failures are
//! classified here, at the boundary, into temporary or permanent.

use async_trait::async_trait;

use postrider_common::envelope::Envelope;
use postrider_common::outgoing;
use postrider_delivery::{DeliveryError, TemporaryError, Transport};

use crate::client::{ClientError, Response, SmtpClient};
use crate::config::UpstreamConfig;

/// [`Transport`] implementation speaking SMTP to the configured upstream.
#[derive(Debug)]
pub struct SmtpTransport {
    config: UpstreamConfig,
}

impl SmtpTransport {
    #[must_use]
    pub const fn new(config: UpstreamConfig) -> Self {
        Self { config }
    }

    async fn relay(&self, envelope: &Envelope) -> Result<(), DeliveryError> {
        let address = self.config.address();
        outgoing!(level = DEBUG, "Connecting to upstream {address}");

        let mut client = SmtpClient::connect(&address, self.config.host.clone())
            .await
            .map_err(classify)?
            .accept_invalid_certs(self.config.accept_invalid_certs);

        let greeting = client.read_greeting().await.map_err(classify)?;
        if greeting.code != 220 {
            return Err(DeliveryError::from_smtp_reply(
                greeting.code,
                &greeting.message(),
            ));
        }

        expect_success(client.ehlo(&self.config.ehlo_domain).await)?;

        if self.config.starttls {
            expect_success(client.starttls().await)?;
            // The session state resets across the TLS upgrade
            expect_success(client.ehlo(&self.config.ehlo_domain).await)?;
        }

        if let (Some(username), Some(password)) =
            (self.config.username.as_deref(), self.config.password.as_deref())
        {
            expect_success(client.auth_plain(username, password).await)?;
        }

        expect_success(client.mail_from(envelope.sender()).await)?;

        for recipient in envelope.recipients() {
            expect_success(client.rcpt_to(recipient).await)?;
        }

        let data = client.data().await.map_err(classify)?;
        if data.code != 354 {
            return Err(DeliveryError::from_smtp_reply(data.code, &data.message()));
        }

        expect_success(client.send_data(envelope.data()).await)?;

        // The message is accepted at this point; a failed QUIT is harmless
        let _ = client.quit().await;

        Ok(())
    }
}

#[async_trait]
impl Transport for SmtpTransport {
    async fn deliver(&self, envelope: &Envelope) -> Result<(), DeliveryError> {
        self.relay(envelope).await
    }
}

/// Map a client-level failure onto the retry taxonomy.
///
/// Everything the client can fail with is network-ish (I/O, closed
/// connections, TLS trouble, garbled responses) and worth retrying; explicit
/// upstream error replies arrive as [`Response`] values and are classified
/// by their code in [`expect_success`].
fn classify(err: ClientError) -> DeliveryError {
    match err {
        ClientError::Io(err) => {
            DeliveryError::Temporary(TemporaryError::ConnectionFailed(err.to_string()))
        }
        ClientError::ConnectionClosed => DeliveryError::Temporary(
            TemporaryError::ConnectionFailed("connection closed unexpectedly".to_owned()),
        ),
        ClientError::TlsError(err) => {
            DeliveryError::Temporary(TemporaryError::TlsHandshakeFailed(err))
        }
        ClientError::ParseError(err) => {
            DeliveryError::Temporary(TemporaryError::SmtpTemporary(err))
        }
        ClientError::Utf8Error(err) => {
            DeliveryError::Temporary(TemporaryError::SmtpTemporary(err.to_string()))
        }
    }
}

fn expect_success(
    response: Result<Response, ClientError>,
) -> Result<Response, DeliveryError> {
    let response = response.map_err(classify)?;
    if response.is_success() {
        Ok(response)
    } else {
        Err(DeliveryError::from_smtp_reply(
            response.code,
            &response.message(),
        ))
    }
}
