//! WebSocket Game Server
//!
//! Async WebSocket server for card duel connections.
//! Accepts upgrades on one path and drives a [`Session`] per connection.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::time::interval;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::game::catalog::{CardCatalog, CatalogError};
use crate::network::protocol::ServerMessage;
use crate::network::registry::{RegistryStatus, RoomRegistry};
use crate::network::session::Session;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Path that accepts WebSocket upgrades.
    pub ws_path: String,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Outbound queue length per connection.
    pub outbound_buffer: usize,
    /// How often room status is logged. Zero disables it.
    pub status_interval: Duration,
    /// JSON catalog to load instead of the built-in deck.
    pub catalog_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            ws_path: "/ws".to_string(),
            max_connections: 1000,
            outbound_buffer: 64,
            status_interval: Duration::from_secs(60),
            catalog_path: None,
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A variable was set to something unusable.
    #[error("Invalid value for {key}: {value:?}")]
    Invalid {
        /// Environment variable name.
        key: &'static str,
        /// Raw value.
        value: String,
    },
}

/// Read `key` and parse it, falling back to `default` when unset.
fn env_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        Err(_) => Ok(default),
    }
}

impl ServerConfig {
    /// Load configuration from `CARD_DUEL_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let ws_path = std::env::var("CARD_DUEL_WS_PATH").unwrap_or(defaults.ws_path);
        if !ws_path.starts_with('/') {
            return Err(ConfigError::Invalid { key: "CARD_DUEL_WS_PATH", value: ws_path });
        }

        let outbound_buffer = env_or("CARD_DUEL_OUTBOUND_BUFFER", defaults.outbound_buffer)?;
        if outbound_buffer == 0 {
            return Err(ConfigError::Invalid {
                key: "CARD_DUEL_OUTBOUND_BUFFER",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            bind_addr: env_or("CARD_DUEL_BIND_ADDR", defaults.bind_addr)?,
            ws_path,
            max_connections: env_or("CARD_DUEL_MAX_CONNECTIONS", defaults.max_connections)?,
            outbound_buffer,
            status_interval: Duration::from_secs(env_or(
                "CARD_DUEL_STATUS_INTERVAL_SECS",
                defaults.status_interval.as_secs(),
            )?),
            catalog_path: std::env::var_os("CARD_DUEL_CATALOG").map(PathBuf::from),
        })
    }

    /// Load the configured catalog, or the built-in deck.
    pub fn load_catalog(&self) -> Result<CardCatalog, CatalogError> {
        match &self.catalog_path {
            Some(path) => CardCatalog::from_path(path),
            None => Ok(CardCatalog::standard()),
        }
    }
}

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Catalog could not be loaded.
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Configuration is invalid.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Connected client state.
struct ConnectedClient {
    /// Session identifier, for correlating logs.
    connection_id: Uuid,
    /// Connection time.
    connected_at: Instant,
}

/// Snapshot of server load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerStatus {
    /// Open WebSocket connections.
    pub connections: usize,
    /// Room summaries.
    pub registry: RegistryStatus,
}

type ClientMap = Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>;

/// The game server.
pub struct GameServer {
    /// Server configuration.
    config: ServerConfig,
    /// Room registry.
    registry: Arc<RoomRegistry>,
    /// Connected clients.
    clients: ClientMap,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a server, loading the catalog named by `config`.
    pub fn new(config: ServerConfig) -> Result<Self, GameServerError> {
        let catalog = config.load_catalog()?;
        Ok(Self::with_catalog(config, catalog))
    }

    /// Create a server dealing from `catalog`.
    pub fn with_catalog(config: ServerConfig, catalog: CardCatalog) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            registry: Arc::new(RoomRegistry::new(catalog)),
            clients: Arc::new(RwLock::new(BTreeMap::new())),
            shutdown_tx,
        }
    }

    /// Bind the configured address and run until shutdown.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Accept connections on `listener` until shutdown.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GameServerError> {
        info!(
            addr = %listener.local_addr()?,
            path = %self.config.ws_path,
            cards = self.registry.catalog().len(),
            "Game server listening"
        );

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        let status_handle = (!self.config.status_interval.is_zero()).then(|| {
            let registry = self.registry.clone();
            let clients = self.clients.clone();
            let period = self.config.status_interval;
            tokio::spawn(async move {
                Self::run_status_loop(registry, clients, period).await;
            })
        });

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let clients_count = self.clients.read().await.len();
                            if clients_count >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }

                            debug!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        if let Some(handle) = status_handle {
            handle.abort();
        }

        Ok(())
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let clients = self.clients.clone();
        let registry = self.registry.clone();
        let ws_path = self.config.ws_path.clone();
        let outbound_buffer = self.config.outbound_buffer;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let check_path = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                if req.uri().path() == ws_path {
                    return Ok(resp);
                }
                debug!("Rejecting upgrade on {} from {}", req.uri().path(), addr);
                let mut not_found = ErrorResponse::new(Some("Not Found".to_string()));
                *not_found.status_mut() = StatusCode::NOT_FOUND;
                Err(not_found)
            };

            let ws_stream = match accept_hdr_async(stream, check_path).await {
                Ok(ws) => ws,
                Err(e) => {
                    debug!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(outbound_buffer);
            let mut session = Session::new(registry, msg_tx);

            // Register client
            {
                let mut clients = clients.write().await;
                clients.insert(addr, ConnectedClient {
                    connection_id: session.connection_id(),
                    connected_at: Instant::now(),
                });
            }
            info!(connection = %session.connection_id(), "Client {} connected", addr);

            // Spawn message sender task
            let sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let text = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
            });

            // Handle incoming messages
            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                session.handle_text(&text).await;
                            }
                            Some(Ok(Message::Binary(_))) => {
                                debug!("Dropping binary frame from {}", addr);
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {} disconnected", addr);
                                break;
                            }
                            Some(Err(e)) => {
                                warn!("WebSocket error for {}: {}", addr, e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }

            // Cleanup
            session.close().await;
            sender_task.abort();

            let removed = clients.write().await.remove(&addr);
            if let Some(client) = removed {
                info!(
                    connection = %client.connection_id,
                    duration_secs = client.connected_at.elapsed().as_secs(),
                    "Client {} cleaned up",
                    addr
                );
            }
        });
    }

    /// Periodically log room and connection counts.
    async fn run_status_loop(registry: Arc<RoomRegistry>, clients: ClientMap, period: Duration) {
        let mut interval = interval(period);

        loop {
            interval.tick().await;

            let connections = clients.read().await.len();
            let status = registry.status().await;
            let in_play = status.rooms.iter().filter(|r| r.round > 0).count();

            info!(
                connections,
                rooms = status.room_count(),
                in_play,
                "Server status"
            );
        }
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Consistent read of connections and rooms.
    pub async fn status(&self) -> ServerStatus {
        ServerStatus {
            connections: self.connection_count().await,
            registry: self.registry.status().await,
        }
    }

    /// The room registry.
    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::catalog::Card;
    use tokio::task::JoinHandle;
    use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    fn duel_catalog() -> CardCatalog {
        CardCatalog::new(vec![
            Card::new("Dragon", &[("Strength", 95)], "dragon.png"),
            Card::new("Phoenix", &[("Strength", 70)], "phoenix.png"),
        ])
        .unwrap()
    }

    async fn start(
        catalog: CardCatalog,
    ) -> (Arc<GameServer>, SocketAddr, JoinHandle<Result<(), GameServerError>>) {
        let config = ServerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            status_interval: Duration::ZERO,
            ..Default::default()
        };
        let server = Arc::new(GameServer::with_catalog(config, catalog));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let running = server.clone();
        let handle = tokio::spawn(async move { running.serve(listener).await });
        (server, addr, handle)
    }

    async fn connect(addr: SocketAddr) -> Client {
        let (ws, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
        ws
    }

    async fn send(ws: &mut Client, text: &str) {
        ws.send(Message::Text(text.to_string())).await.unwrap();
    }

    async fn recv(ws: &mut Client) -> ServerMessage {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
                .await
                .expect("timed out waiting for server")
                .expect("connection closed")
                .unwrap();
            if let Message::Text(text) = msg {
                return ServerMessage::from_json(&text).unwrap();
            }
        }
    }

    /// Poll until `check` holds or a few seconds pass.
    async fn eventually<F, Fut>(check: F)
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        for _ in 0..100 {
            if check().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("condition not reached");
    }

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.ws_path, "/ws");
        assert_eq!(config.max_connections, 1000);
        assert_eq!(config.outbound_buffer, 64);
        assert!(config.catalog_path.is_none());
        assert_eq!(config.load_catalog().unwrap(), CardCatalog::standard());
    }

    #[test]
    fn test_env_or_parses_and_rejects() {
        std::env::set_var("CARD_DUEL_TEST_PORT_OK", " 9000 ");
        std::env::set_var("CARD_DUEL_TEST_PORT_BAD", "lots");

        assert_eq!(env_or("CARD_DUEL_TEST_PORT_OK", 1u16).unwrap(), 9000);
        assert_eq!(env_or("CARD_DUEL_TEST_PORT_UNSET", 7u16).unwrap(), 7);
        assert!(matches!(
            env_or("CARD_DUEL_TEST_PORT_BAD", 1u16),
            Err(ConfigError::Invalid { key: "CARD_DUEL_TEST_PORT_BAD", .. })
        ));
    }

    #[test]
    fn test_missing_catalog_file() {
        let config = ServerConfig {
            catalog_path: Some(PathBuf::from("/nonexistent/cards.json")),
            ..Default::default()
        };
        assert!(matches!(GameServer::new(config), Err(GameServerError::Catalog(CatalogError::Io(_)))));
    }

    #[tokio::test]
    async fn test_server_creation() {
        let server = GameServer::with_catalog(ServerConfig::default(), duel_catalog());

        assert_eq!(server.connection_count().await, 0);
        let status = server.status().await;
        assert_eq!(status.connections, 0);
        assert_eq!(status.registry.room_count(), 0);
    }

    #[tokio::test]
    async fn test_full_duel_over_websocket() {
        let (server, addr, handle) = start(duel_catalog()).await;
        let mut a = connect(addr).await;
        let mut b = connect(addr).await;

        send(&mut a, r#"{"action":"join","room":"r1","player":"A"}"#).await;
        assert!(matches!(recv(&mut a).await, ServerMessage::Waiting(_)));

        send(&mut b, r#"{"action":"join","room":"r1","player":"B"}"#).await;
        let ServerMessage::Start(start_a) = recv(&mut a).await else { panic!("expected start") };
        let ServerMessage::Start(start_b) = recv(&mut b).await else { panic!("expected start") };
        assert_eq!(start_a.round, 1);
        assert_ne!(start_a.your_turn, start_b.your_turn);

        let dragon_holder = match start_a.your_top_card.as_ref() {
            Some(card) if card.name == "Dragon" => "A",
            _ => "B",
        };
        let play = r#"{"action":"playCard","attribute":"Strength"}"#;
        if start_a.your_turn {
            send(&mut a, play).await;
        } else {
            send(&mut b, play).await;
        }

        for ws in [&mut a, &mut b] {
            let ServerMessage::RoundResult(result) = recv(ws).await else {
                panic!("expected roundResult")
            };
            assert_eq!(result.winner, dragon_holder);
            assert_eq!(result.game_over.as_deref(), Some(dragon_holder));
            assert_eq!(result.attribute, "Strength");
        }

        let status = server.status().await;
        assert_eq!(status.connections, 2);
        assert_eq!(status.registry.room_count(), 1);

        server.shutdown();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_room_full_over_websocket() {
        let (server, addr, _handle) = start(duel_catalog()).await;
        let mut a = connect(addr).await;
        let mut b = connect(addr).await;
        send(&mut a, r#"{"action":"join","room":"r1","player":"A"}"#).await;
        assert!(matches!(recv(&mut a).await, ServerMessage::Waiting(_)));
        send(&mut b, r#"{"action":"join","room":"r1","player":"B"}"#).await;
        assert!(matches!(recv(&mut b).await, ServerMessage::Start(_)));

        let mut c = connect(addr).await;
        send(&mut c, r#"{"action":"join","room":"r1","player":"C"}"#).await;
        match recv(&mut c).await {
            ServerMessage::Error(err) => assert_eq!(err.code, crate::network::protocol::ErrorCode::RoomFull),
            other => panic!("expected error, got {other:?}"),
        }

        // Connection stays usable after the error.
        send(&mut c, r#"{"action":"join","room":"r2","player":"C"}"#).await;
        assert!(matches!(recv(&mut c).await, ServerMessage::Waiting(_)));
        server.shutdown();
    }

    #[tokio::test]
    async fn test_disconnect_frees_seat() {
        let (server, addr, _handle) = start(duel_catalog()).await;
        let mut a = connect(addr).await;
        let mut b = connect(addr).await;
        send(&mut a, r#"{"action":"join","room":"r1","player":"A"}"#).await;
        assert!(matches!(recv(&mut a).await, ServerMessage::Waiting(_)));
        send(&mut b, r#"{"action":"join","room":"r1","player":"B"}"#).await;
        assert!(matches!(recv(&mut a).await, ServerMessage::Start(_)));

        b.close(None).await.unwrap();

        let registry = server.registry().clone();
        eventually(|| {
            let registry = registry.clone();
            async move {
                let status = registry.status().await;
                status.rooms.first().map(|r| (r.seats, r.round)) == Some((1, 0))
            }
        })
        .await;

        drop(a);
        let registry = server.registry().clone();
        eventually(|| {
            let registry = registry.clone();
            async move { registry.room_count().await == 0 }
        })
        .await;
        server.shutdown();
    }

    #[tokio::test]
    async fn test_wrong_path_is_not_found() {
        let (server, addr, _handle) = start(duel_catalog()).await;

        let err = connect_async(format!("ws://{addr}/elsewhere")).await.unwrap_err();
        match err {
            tokio_tungstenite::tungstenite::Error::Http(resp) => {
                assert_eq!(resp.status(), StatusCode::NOT_FOUND);
            }
            other => panic!("expected HTTP error, got {other:?}"),
        }
        assert_eq!(server.connection_count().await, 0);
        server.shutdown();
    }
}
