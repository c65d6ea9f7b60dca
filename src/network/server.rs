//! TCP Match Server
//!
//! Accepts raw TCP connections speaking the framed binary protocol. The
//! first frame decides what a connection is: a JOIN hands it to the tick
//! loop as a match player, anything else is a one-shot leaderboard or tag
//! request answered and closed on the spot.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use crate::core::rng::DeterministicRng;
use crate::game::catalog::MAX_ABILITIES_PER_UNIT;
use crate::network::protocol::{
    clip_name, read_frame, write_frame, ClientMessage, ProtocolError, ServerMessage, TagReply, TagStatus,
    MAX_NAME_LEN,
};
use crate::network::session::{PlayerInput, PlayerLink, SessionConfig, SessionManager};
use crate::store::tags::{uid_hex, EMPTY_ABILITY};
use crate::store::Stores;

/// Default listening port.
pub const DEFAULT_PORT: u16 = 7777;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent sessions.
    pub max_sessions: usize,
    /// Tick rate for the session loop (Hz).
    pub tick_rate: u32,
    /// How long a new connection has to send its first frame.
    pub handshake_timeout: Duration,
    /// Leaderboard file.
    pub leaderboard_path: PathBuf,
    /// Tag registry file.
    pub tags_path: PathBuf,
    /// Per-session rules.
    pub session: SessionConfig,
    /// Queue depth of each player channel.
    pub channel_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            max_sessions: 16,
            tick_rate: crate::TICK_RATE,
            handshake_timeout: Duration::from_secs(5),
            leaderboard_path: PathBuf::from("global_leaderboard.json"),
            tags_path: PathBuf::from("tags.json"),
            session: SessionConfig::default(),
            channel_capacity: 64,
        }
    }
}

impl ServerConfig {
    /// Defaults with `AUTOBATTLE_BIND`, `AUTOBATTLE_LEADERBOARD` and
    /// `AUTOBATTLE_TAGS` applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(bind) = std::env::var("AUTOBATTLE_BIND") {
            match bind.parse() {
                Ok(addr) => config.bind_addr = addr,
                Err(e) => warn!("Ignoring AUTOBATTLE_BIND={}: {}", bind, e),
            }
        }
        if let Ok(path) = std::env::var("AUTOBATTLE_LEADERBOARD") {
            config.leaderboard_path = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("AUTOBATTLE_TAGS") {
            config.tags_path = PathBuf::from(path);
        }
        config
    }

    /// Same address, different port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.bind_addr.set_port(port);
        self
    }
}

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// Wire error.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// A connection that sent JOIN, on its way to the tick loop.
#[derive(Debug)]
struct JoinRequest {
    /// `None` creates a lobby.
    code: Option<String>,
    name: String,
    link: PlayerLink,
}

/// What a handshake task needs.
#[derive(Clone)]
struct Handshake {
    stores: Arc<Stores>,
    joins: mpsc::Sender<JoinRequest>,
    timeout: Duration,
    channel_capacity: usize,
}

/// The match server.
pub struct GameServer {
    /// Server configuration.
    config: ServerConfig,
    /// Leaderboard and tags.
    stores: Arc<Stores>,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a server, loading both stores from the configured paths.
    pub fn new(config: ServerConfig) -> Self {
        let stores = Stores::load(&config.leaderboard_path, &config.tags_path);
        Self::with_stores(config, stores)
    }

    /// Create a server around already loaded stores.
    pub fn with_stores(config: ServerConfig, stores: Stores) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self { config, stores: Arc::new(stores), shutdown_tx }
    }

    /// Shared stores.
    pub fn stores(&self) -> &Arc<Stores> {
        &self.stores
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Bind and serve until shutdown.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!("Match server listening on {}", listener.local_addr()?);
        self.serve(listener).await
    }

    /// Serve on an already bound listener until shutdown.
    #[instrument(skip(self, listener))]
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GameServerError> {
        let (join_tx, join_rx) = mpsc::channel(self.config.channel_capacity);
        let manager = SessionManager::new(
            self.config.max_sessions,
            self.config.session.clone(),
            DeterministicRng::from_entropy(),
        );
        let tick_handle = tokio::spawn(Self::run_tick_loop(
            manager,
            join_rx,
            self.config.tick_rate,
            self.shutdown_tx.subscribe(),
        ));

        let handshake = Handshake {
            stores: self.stores.clone(),
            joins: join_tx,
            timeout: self.config.handshake_timeout,
            channel_capacity: self.config.channel_capacity,
        };
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            debug!("New connection from {}", addr);
                            tokio::spawn(Self::handle_connection(stream, addr, handshake.clone()));
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

        if let Err(e) = tick_handle.await {
            error!("Tick loop ended abnormally: {}", e);
        }
        self.save_stores().await;
        Ok(())
    }

    /// Flush both stores to disk.
    pub async fn save_stores(&self) {
        if let Err(e) = self.stores.leaderboard.lock().await.save() {
            warn!("Failed to save leaderboard: {}", e);
        }
        if let Err(e) = self.stores.tags.lock().await.save() {
            warn!("Failed to save tag registry: {}", e);
        }
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Owns every session; advances them by measured wall time.
    async fn run_tick_loop(
        mut manager: SessionManager,
        mut joins: mpsc::Receiver<JoinRequest>,
        tick_rate: u32,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        let mut ticker = interval(Duration::from_secs_f64(1.0 / tick_rate.max(1) as f64));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last = Instant::now();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let now = Instant::now();
                    let dt = now.duration_since(last).as_secs_f32();
                    last = now;
                    manager.tick_all(dt);
                }
                Some(req) = joins.recv() => {
                    let result = match req.code {
                        None => manager.create(req.name, req.link).map(|code| {
                            debug!("Lobby {} opened ({} live)", code, manager.live_count());
                        }),
                        Some(code) => manager.join(&code, req.name, req.link),
                    };
                    if let Err(e) = result {
                        debug!("Join refused: {}", e);
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Tick loop stopping with {} live sessions", manager.live_count());
                    break;
                }
            }
        }
    }

    /// Read the first frame and route the connection.
    async fn handle_connection(stream: TcpStream, addr: SocketAddr, handshake: Handshake) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!("set_nodelay failed for {}: {}", addr, e);
        }
        let (mut reader, mut writer) = stream.into_split();

        let frame = match timeout(handshake.timeout, read_frame(&mut reader)).await {
            Ok(Ok(frame)) => frame,
            Ok(Err(e)) => {
                debug!("Handshake failed for {}: {}", addr, e);
                return;
            }
            Err(_) => {
                debug!("Handshake timed out for {}", addr);
                return;
            }
        };
        let msg = match ClientMessage::decode(&frame) {
            Ok(msg) => msg,
            Err(e) => {
                debug!("Bad first frame from {}: {}", addr, e);
                return;
            }
        };

        match msg {
            ClientMessage::Join { code, name } => {
                let name = match clip_name(&name, MAX_NAME_LEN) {
                    "" => "Player".to_string(),
                    clipped => clipped.to_string(),
                };
                let link = Self::spawn_link(reader, writer, addr, handshake.channel_capacity);
                if handshake.joins.send(JoinRequest { code, name, link }).await.is_err() {
                    warn!("Tick loop gone, dropping {}", addr);
                }
            }
            other => {
                if let Some(reply) = serve_request(&handshake.stores, other).await {
                    if let Err(e) = write_frame(&mut writer, &reply.encode()).await {
                        debug!("Reply to {} failed: {}", addr, e);
                    }
                }
                let _ = writer.shutdown().await;
            }
        }
    }

    /// Spawn the socket tasks of a joined player and return the session side.
    fn spawn_link(reader: OwnedReadHalf, writer: OwnedWriteHalf, addr: SocketAddr, capacity: usize) -> PlayerLink {
        let (in_tx, in_rx) = mpsc::channel(capacity);
        let (out_tx, out_rx) = mpsc::channel(capacity);

        let reader_task = tokio::spawn(Self::read_loop(reader, addr, in_tx));
        tokio::spawn(async move {
            Self::write_loop(writer, addr, out_rx).await;
            reader_task.abort();
        });

        PlayerLink::new(out_tx, in_rx)
    }

    /// Frames in, session inputs out. Ends with `Disconnected`.
    async fn read_loop(mut reader: OwnedReadHalf, addr: SocketAddr, inbox: mpsc::Sender<PlayerInput>) {
        loop {
            let frame = match read_frame(&mut reader).await {
                Ok(frame) => frame,
                Err(ProtocolError::Disconnected) => {
                    debug!("Client {} disconnected", addr);
                    break;
                }
                Err(e) => {
                    warn!("Dropping {}: {}", addr, e);
                    break;
                }
            };
            match ClientMessage::decode(&frame) {
                Ok(msg) => {
                    if inbox.send(PlayerInput::Message(msg)).await.is_err() {
                        return;
                    }
                }
                Err(e) => debug!("Ignoring frame from {}: {}", addr, e),
            }
        }
        let _ = inbox.send(PlayerInput::Disconnected).await;
    }

    /// Session outbox to socket; closes the socket once the session lets go.
    async fn write_loop(mut writer: OwnedWriteHalf, addr: SocketAddr, mut outbox: mpsc::Receiver<ServerMessage>) {
        while let Some(msg) = outbox.recv().await {
            if let Err(e) = write_frame(&mut writer, &msg.encode()).await {
                debug!("Write to {} failed: {}", addr, e);
                break;
            }
        }
        let _ = writer.shutdown().await;
    }
}

/// Answer a one-shot leaderboard or tag request.
///
/// Returns the reply to send, if the request has one. Mutations are saved
/// immediately; save failures are logged and the in-memory change kept.
pub async fn serve_request(stores: &Stores, msg: ClientMessage) -> Option<ServerMessage> {
    match msg {
        ClientMessage::LeaderboardSubmit(record) => {
            let mut board = stores.leaderboard.lock().await;
            let name = record.name.clone();
            let round = record.round;
            if board.insert(record) {
                info!("Leaderboard entry '{}' round {}", name, round);
                if let Err(e) = board.save() {
                    warn!("Failed to save leaderboard: {}", e);
                }
            }
            Some(ServerMessage::LeaderboardData(board.entries().to_vec()))
        }
        ClientMessage::LeaderboardRequest => {
            let board = stores.leaderboard.lock().await;
            Some(ServerMessage::LeaderboardData(board.entries().to_vec()))
        }
        ClientMessage::TagLookup { uid } => {
            let tags = stores.tags.lock().await;
            let reply = match tags.lookup(&uid_hex(&uid)) {
                Some(tag) => TagReply {
                    uid,
                    status: TagStatus::Ok,
                    archetype: tag.archetype,
                    rarity: tag.rarity,
                    abilities: Some(tag.abilities),
                },
                None => TagReply {
                    uid,
                    status: TagStatus::NotFound,
                    archetype: 0,
                    rarity: 0,
                    abilities: Some([EMPTY_ABILITY; MAX_ABILITIES_PER_UNIT]),
                },
            };
            Some(ServerMessage::TagData(reply))
        }
        ClientMessage::TagRegister { uid, archetype, rarity } => {
            let hex = uid_hex(&uid);
            let mut tags = stores.tags.lock().await;
            let status = match tags.register(&hex, archetype, rarity) {
                Ok(how) => {
                    info!("Tag {} {:?} as type {} rarity {}", hex, how, archetype, rarity);
                    if let Err(e) = tags.save() {
                        warn!("Failed to save tag registry: {}", e);
                    }
                    TagStatus::Ok
                }
                Err(e) => {
                    warn!("Tag {} not registered: {}", hex, e);
                    TagStatus::Error
                }
            };
            Some(ServerMessage::TagData(TagReply { uid, status, archetype, rarity, abilities: None }))
        }
        ClientMessage::TagAbilityUpdate { uid, abilities } => {
            let hex = uid_hex(&uid);
            let mut tags = stores.tags.lock().await;
            match tags.update_abilities(&hex, &abilities) {
                Ok(()) => {
                    if let Err(e) = tags.save() {
                        warn!("Failed to save tag registry: {}", e);
                    }
                }
                Err(e) => debug!("Tag {} ability update ignored: {}", hex, e),
            }
            None
        }
        ClientMessage::TagAbilityReset { uid } => {
            let hex = uid_hex(&uid);
            let mut tags = stores.tags.lock().await;
            match tags.reset_abilities(&hex) {
                Ok(()) => {
                    if let Err(e) = tags.save() {
                        warn!("Failed to save tag registry: {}", e);
                    }
                }
                Err(e) => debug!("Tag {} ability reset ignored: {}", hex, e),
            }
            None
        }
        other => {
            debug!("Unexpected first frame {:?}", other);
            None
        }
    }
}
