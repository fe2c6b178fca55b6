//! `DuochatServer` builder and server loop.
//!
//! This is the entry point for running a Duochat server. It ties
//! together all the layers: transport → protocol → session → room, plus
//! the HTTP ban query and a maintenance sweeper.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use duochat_moderation::{AllowAll, BanStore, ContentFilter};
use duochat_protocol::{Codec, JsonCodec};
use duochat_room::{Matchmaker, RoomRegistry};
use duochat_session::{SessionConfig, SessionManager};
use duochat_transport::{Transport, WebSocketTransport};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;

use crate::config::{DEFAULT_SWEEP_INTERVAL, GatewayConfig, ServerConfig};
use crate::gateway::handle_connection;
use crate::{DuochatError, http};

/// Shared server state passed to each connection task.
///
/// Wrapped in `Arc` so it can be cheaply cloned across tasks. Nothing in
/// here is a global: every store is owned by this struct.
pub(crate) struct ServerState<C: Codec> {
    pub(crate) sessions: Mutex<SessionManager>,
    pub(crate) matchmaker: Matchmaker,
    pub(crate) bans: Arc<BanStore>,
    pub(crate) filter: Box<dyn ContentFilter>,
    pub(crate) codec: C,
    pub(crate) config: GatewayConfig,
}

/// Builder for configuring and starting a Duochat server.
///
/// # Example
///
/// ```rust,no_run
/// use duochat::prelude::*;
///
/// # async fn run() -> Result<(), DuochatError> {
/// let server = DuochatServer::builder()
///     .bind("0.0.0.0:8080")
///     .http_bind("0.0.0.0:8081")
///     .filter(WordListFilter::new(["spam"]))
///     .build()
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct DuochatServerBuilder {
    ws_addr: String,
    http_addr: Option<String>,
    session_config: SessionConfig,
    gateway_config: GatewayConfig,
    sweep_interval: Duration,
    filter: Box<dyn ContentFilter>,
}

impl DuochatServerBuilder {
    /// Creates a new builder with default settings.
    ///
    /// No HTTP listener is started unless [`http_bind`](Self::http_bind)
    /// is called.
    pub fn new() -> Self {
        Self {
            ws_addr: "127.0.0.1:8080".to_string(),
            http_addr: None,
            session_config: SessionConfig::default(),
            gateway_config: GatewayConfig::default(),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            filter: Box::new(AllowAll),
        }
    }

    /// Takes addresses and tuning from a [`ServerConfig`]. The filter is
    /// left as is.
    pub fn config(self, config: ServerConfig) -> Self {
        self.bind(&config.ws_addr)
            .http_bind(&config.http_addr)
            .session_config(config.session)
            .gateway_config(config.gateway)
            .sweep_interval(config.sweep_interval)
    }

    /// Sets the WebSocket bind address.
    pub fn bind(mut self, addr: &str) -> Self {
        self.ws_addr = addr.to_string();
        self
    }

    /// Serves the HTTP ban query on `addr`.
    pub fn http_bind(mut self, addr: &str) -> Self {
        self.http_addr = Some(addr.to_string());
        self
    }

    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    pub fn gateway_config(mut self, config: GatewayConfig) -> Self {
        self.gateway_config = config;
        self
    }

    /// How often expired sessions and bans are evicted.
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Sets the content filter consulted for every chat message.
    pub fn filter(mut self, filter: impl ContentFilter) -> Self {
        self.filter = Box::new(filter);
        self
    }

    /// Binds the listeners and assembles the server.
    ///
    /// Uses `JsonCodec` and `WebSocketTransport`.
    pub async fn build(self) -> Result<DuochatServer<JsonCodec>, DuochatError> {
        let transport = WebSocketTransport::bind(&self.ws_addr).await?;
        let http = match &self.http_addr {
            Some(addr) => Some(TcpListener::bind(addr).await?),
            None => None,
        };

        let bans = Arc::new(BanStore::new());
        let registry = Arc::new(RoomRegistry::new());
        let state = Arc::new(ServerState {
            sessions: Mutex::new(SessionManager::new(self.session_config)),
            matchmaker: Matchmaker::new(registry, Arc::clone(&bans)),
            bans,
            filter: self.filter,
            codec: JsonCodec,
            config: self.gateway_config,
        });

        Ok(DuochatServer {
            transport,
            http,
            state,
            sweep_interval: self.sweep_interval,
        })
    }
}

impl Default for DuochatServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Duochat server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct DuochatServer<C: Codec> {
    transport: WebSocketTransport,
    http: Option<TcpListener>,
    state: Arc<ServerState<C>>,
    sweep_interval: Duration,
}

impl DuochatServer<JsonCodec> {
    /// Creates a new builder.
    pub fn builder() -> DuochatServerBuilder {
        DuochatServerBuilder::new()
    }
}

impl<C: Codec> DuochatServer<C> {
    /// Returns the address the WebSocket listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    /// Returns the address the HTTP listener is bound to, if any.
    pub fn http_addr(&self) -> Option<SocketAddr> {
        self.http.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// The ban store shared by the gateway and the HTTP query.
    pub fn bans(&self) -> Arc<BanStore> {
        Arc::clone(&self.state.bans)
    }

    /// Runs the server.
    ///
    /// Spawns the HTTP server and the maintenance sweeper, then accepts
    /// connections and spawns a gateway task for each. Runs until the
    /// process is terminated.
    pub async fn run(mut self) -> Result<(), DuochatError> {
        if let Some(listener) = self.http.take() {
            let app = http::router(Arc::clone(&self.state.bans));
            tokio::spawn(async move {
                if let Err(e) = axum::serve(listener, app).await {
                    tracing::error!(error = %e, "http server stopped");
                }
            });
        }
        tokio::spawn(sweep(Arc::clone(&self.state), self.sweep_interval));

        tracing::info!(addr = ?self.local_addr().ok(), "duochat server running");

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, state).await {
                            tracing::debug!(
                                error = %e,
                                "connection ended with error"
                            );
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}

/// Periodically expires stale sessions and drops lapsed bans.
async fn sweep<C: Codec>(state: Arc<ServerState<C>>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let expired = {
            let mut sessions = state.sessions.lock().await;
            let expired = sessions.expire_stale();
            sessions.cleanup_expired();
            expired
        };
        let purged = state.bans.purge_expired().await;

        if !expired.is_empty() || purged > 0 {
            tracing::debug!(
                sessions = expired.len(),
                bans = purged,
                "maintenance sweep"
            );
        }
    }
}
