use std::sync::{Arc, LazyLock};

use serde::Deserialize;
use tokio::{sync::broadcast, task::JoinSet};

use postrider_common::{Signal, internal, logging};
use postrider_delivery::{DeliveryConfig, Dispatcher};
use postrider_health::{HealthConfig, HealthServer};
use postrider_smtp::{GatewayListener, ListenerConfig, SmtpTransport, UpstreamConfig};
use postrider_spool::{FileBackingStore, QueueStore};

use crate::config::SpoolConfig;

/// The whole relay, as described by one configuration file: the submission
/// listener, the durable spool between it and the dispatcher, and the
/// upstream the dispatcher drains into.
#[derive(Debug, Default, Deserialize)]
pub struct Relay {
    #[serde(default)]
    listener: ListenerConfig,
    #[serde(default)]
    upstream: UpstreamConfig,
    #[serde(default)]
    spool: SpoolConfig,
    #[serde(default)]
    delivery: DeliveryConfig,
    #[serde(default)]
    health: HealthConfig,
}

static SHUTDOWN_BROADCAST: LazyLock<broadcast::Sender<Signal>> = LazyLock::new(|| {
    let (sender, _receiver) = broadcast::channel(64);
    sender
});

/// Wait for an interrupt or terminate signal, then tell every component to
/// wind down.
async fn shutdown() -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            internal!(level = INFO, "CTRL+C entered -- Enter it again to force shutdown");
        }
        _ = terminate.recv() => {
            internal!(level = INFO, "Terminate signal received, shutting down");
        }
    };

    SHUTDOWN_BROADCAST
        .send(Signal::Shutdown)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Interrupted, e.to_string()))?;

    Ok(())
}

impl Relay {
    /// Run the relay until it is told to shut down.
    ///
    /// # Errors
    ///
    /// Returns an error if the spool cannot be opened, or if a listen
    /// address cannot be bound.
    pub async fn run(self) -> anyhow::Result<()> {
        logging::init();

        let backend = FileBackingStore::open(&self.spool.path).await?;
        let store = Arc::new(
            QueueStore::open(Arc::new(backend), self.listener.max_message_size).await?,
        );

        let stranded = store.recover().await?;
        if stranded > 0 {
            internal!(
                level = WARN,
                "Requeued {stranded} message(s) left in flight by an unclean shutdown"
            );
        }

        let transport = Arc::new(SmtpTransport::new(self.upstream));
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&store),
            transport,
            self.delivery,
        ));
        let listener = GatewayListener::bind(self.listener, Arc::clone(&store)).await?;

        let mut tasks: JoinSet<anyhow::Result<()>> = JoinSet::new();

        tasks.spawn(async move {
            listener.serve(SHUTDOWN_BROADCAST.subscribe()).await?;
            Ok(())
        });

        tasks.spawn(async move {
            dispatcher.serve(SHUTDOWN_BROADCAST.subscribe()).await;
            Ok(())
        });

        if self.health.enabled {
            let health = HealthServer::new(self.health, Arc::clone(&store)).await?;
            tasks.spawn(async move {
                health.serve(SHUTDOWN_BROADCAST.subscribe()).await?;
                Ok(())
            });
        }

        internal!(level = INFO, "Relay running");

        shutdown().await?;

        // Let every component drain; a second interrupt forces the issue
        loop {
            tokio::select! {
                task = tasks.join_next() => match task {
                    Some(result) => {
                        if let Err(err) = result? {
                            internal!(level = ERROR, "{err}");
                        }
                    }
                    None => break,
                },
                _ = tokio::signal::ctrl_c() => {
                    internal!(level = WARN, "Forcing shutdown");
                    tasks.abort_all();
                    break;
                }
            }
        }

        internal!(level = INFO, "Shutting down...");

        Ok(())
    }
}
