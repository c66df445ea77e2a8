//! The broker orchestrator: binds the listener, accepts connections, wires
//! each into a client handler and runs the periodic `$SYS` publisher.

use crate::broker::auth::{AuthProvider, PasswordAuthProvider};
use crate::broker::client_handler::ClientHandler;
use crate::broker::config::BrokerConfig;
use crate::broker::router::MessageRouter;
use crate::broker::session::SessionStore;
use crate::broker::sys_topics::{BrokerStats, SysTopicsProvider};
use crate::{MqttError, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

pub struct MqttBroker {
    config: Arc<BrokerConfig>,
    router: Arc<MessageRouter>,
    sessions: Arc<SessionStore>,
    auth_provider: Arc<dyn AuthProvider>,
    stats: Arc<BrokerStats>,
    listener: TcpListener,
    shutdown_tx: broadcast::Sender<()>,
}

impl MqttBroker {
    /// Binds with the default credential check: an empty password table
    /// honoring `allow_anonymous`.
    pub async fn bind(config: BrokerConfig) -> Result<Self> {
        let auth: Arc<dyn AuthProvider> = Arc::new(
            PasswordAuthProvider::new().with_anonymous(config.allow_anonymous),
        );
        Self::bind_with_auth(config, auth).await
    }

    /// Binding failure is fatal to the broker as a whole.
    pub async fn bind_with_auth(
        config: BrokerConfig,
        auth_provider: Arc<dyn AuthProvider>,
    ) -> Result<Self> {
        let addr = config.listen_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|err| MqttError::Configuration(format!("failed to bind {addr}: {err}")))?;
        info!(addr = %addr, "listening");

        let stats = Arc::new(BrokerStats::new());
        let sessions = Arc::new(SessionStore::new());
        let router = Arc::new(MessageRouter::new(
            Arc::clone(&sessions),
            Arc::clone(&stats),
            config.outbound_highwater_bytes,
        ));
        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            config: Arc::new(config),
            router,
            sessions,
            auth_provider,
            stats,
            listener,
            shutdown_tx,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().map_err(Into::into)
    }

    /// Sending on the returned channel stops the accept loop and every
    /// running connection handler.
    #[must_use]
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    #[must_use]
    pub fn stats(&self) -> Arc<BrokerStats> {
        Arc::clone(&self.stats)
    }

    /// Accepts until shut down. Individual accept failures are logged and
    /// retried; only the listener going away ends the loop with an error.
    pub async fn run(self) -> Result<()> {
        let sys = SysTopicsProvider::new(
            Arc::clone(&self.router),
            Arc::clone(&self.stats),
            Duration::from_secs(u64::from(self.config.stats_publish_interval_secs)),
        );
        tokio::spawn(sys.run(self.shutdown_tx.subscribe()));

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => {
                            if let Err(err) = stream.set_nodelay(true) {
                                warn!(%addr, "failed to set TCP_NODELAY: {err}");
                            }
                            debug!(%addr, "accepted connection");
                            let handler = ClientHandler::new(
                                stream,
                                addr,
                                Arc::clone(&self.config),
                                Arc::clone(&self.router),
                                Arc::clone(&self.sessions),
                                Arc::clone(&self.auth_provider),
                                Arc::clone(&self.stats),
                                self.shutdown_tx.subscribe(),
                            );
                            tokio::spawn(async move {
                                if let Err(err) = handler.run().await {
                                    if err.is_normal_disconnect() {
                                        debug!("connection closed: {err}");
                                    } else {
                                        warn!("connection ended with error: {err}");
                                    }
                                }
                            });
                        }
                        Err(err) => {
                            warn!("accept error: {err}");
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("shutting down");
                    return Ok(());
                }
            }
        }
    }
}
