use async_trait::async_trait;

use postrider_common::envelope::Envelope;

use crate::error::DeliveryError;

/// The outbound delivery capability.
///
/// Implementations own everything about talking to the upstream (connection,
/// TLS, authentication, the SMTP conversation) and report the outcome as an
/// already-classified [`DeliveryError`]. The dispatcher never inspects wire
/// details.
#[async_trait]
pub trait Transport: std::fmt::Debug + Send + Sync {
    /// Attempt to deliver one envelope upstream.
    ///
    /// # Errors
    ///
    /// Returns a [`DeliveryError`] classified as temporary or permanent at
    /// this boundary.
    async fn deliver(&self, envelope: &Envelope) -> Result<(), DeliveryError>;
}
