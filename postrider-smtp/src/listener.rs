use std::{net::SocketAddr, sync::Arc};

use futures_util::future::join_all;
use tokio::net::TcpListener;

use postrider_common::{Signal, incoming, internal};
use postrider_spool::QueueStore;

use crate::{config::ListenerConfig, session::Session};

/// The local submission listener: accepts connections and feeds completed
/// envelopes into the queue store.
#[derive(Debug)]
pub struct GatewayListener {
    listener: TcpListener,
    store: Arc<QueueStore>,
    config: ListenerConfig,
}

impl GatewayListener {
    /// Bind the configured address.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn bind(config: ListenerConfig, store: Arc<QueueStore>) -> std::io::Result<Self> {
        let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
        Ok(Self {
            listener,
            store,
            config,
        })
    }

    /// The address the listener is actually bound to (useful when the
    /// configured port is 0).
    ///
    /// # Errors
    ///
    /// Returns an error if the local address cannot be determined.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept sessions until a shutdown signal arrives, then let the open
    /// sessions finish.
    ///
    /// # Errors
    ///
    /// Returns an error if accepting a connection fails.
    pub async fn serve(
        self,
        mut shutdown: tokio::sync::broadcast::Receiver<Signal>,
    ) -> std::io::Result<()> {
        internal!(
            level = INFO,
            "Submission listener serving on {}",
            self.local_addr()?
        );

        let mut sessions = Vec::default();

        loop {
            tokio::select! {
                sig = shutdown.recv() => {
                    if matches!(sig, Ok(Signal::Shutdown) | Err(_)) {
                        internal!(level = INFO, "Submission listener received shutdown, finishing sessions ...");
                        join_all(sessions).await;
                        break;
                    }
                }

                connection = self.listener.accept() => {
                    let (stream, peer) = connection?;
                    incoming!(level = DEBUG, "Connection from {peer}");

                    let session = Session::new(stream, peer, Arc::clone(&self.store), &self.config);
                    sessions.push(tokio::spawn(async move {
                        if let Err(err) = session.run().await {
                            internal!(level = ERROR, "Session with {peer} failed: {err}");
                        }
                    }));
                }
            }
        }

        Ok(())
    }
}
