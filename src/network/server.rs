//! WebSocket Game Server
//!
//! Async WebSocket server for the lobby and the round.
//!
//! One dispatcher task owns the [`GameSession`]. Connection tasks never
//! touch game state; they forward frames to the dispatcher over a channel
//! and write whatever lands in their outbound queue. The dispatcher also
//! drives the fixed-rate tick and wakes for the next scheduled deadline,
//! so every mutation runs one at a time.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, instrument, warn};

use crate::config::ServerConfig;
use crate::game::state::ConnectionId;
use crate::network::protocol::ServerMessage;
use crate::network::session::GameSession;

/// Inbound command queue depth.
const COMMAND_QUEUE: usize = 1024;

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Work for the dispatcher.
#[derive(Debug)]
enum Command {
    /// A connection finished its handshake.
    Connected {
        conn: ConnectionId,
        sender: mpsc::Sender<ServerMessage>,
    },
    /// A text frame arrived.
    Inbound {
        conn: ConnectionId,
        text: String,
    },
    /// A connection went away.
    Closed {
        conn: ConnectionId,
    },
}

/// The game server.
pub struct GameServer {
    /// Server configuration.
    config: ServerConfig,
    /// Connection id source.
    next_connection: AtomicU64,
    /// Open connections.
    open_connections: Arc<AtomicUsize>,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a new game server.
    pub fn new(config: ServerConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            next_connection: AtomicU64::new(1),
            open_connections: Arc::new(AtomicUsize::new(0)),
            shutdown_tx,
        }
    }

    /// Bind the configured address and run until shutdown.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Run on an already-bound listener until shutdown.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GameServerError> {
        let local_addr = listener.local_addr()?;
        info!(
            addr = %local_addr,
            version = %self.config.version,
            tick_rate = self.config.tick_rate,
            "Game server listening"
        );

        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_QUEUE);
        let session = GameSession::new(self.config.game.clone(), self.config.seed);
        let dispatcher = tokio::spawn(run_dispatcher(
            session,
            cmd_rx,
            self.config.tick_rate,
            self.shutdown_tx.subscribe(),
        ));

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            info!("New connection from {}", addr);
                            self.handle_connection(stream, addr, cmd_tx.clone());
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

        drop(cmd_tx);
        dispatcher
            .await
            .map_err(|e| GameServerError::Internal(format!("dispatcher task failed: {}", e)))
    }

    /// Spawn the reader/writer pair for one connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr, cmd_tx: mpsc::Sender<Command>) {
        let conn = ConnectionId(self.next_connection.fetch_add(1, Ordering::Relaxed));
        let queue = self.config.outbound_queue;
        let open = self.open_connections.clone();
        let shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            open.fetch_add(1, Ordering::Relaxed);
            if let Err(e) = serve_connection(stream, addr, conn, queue, &cmd_tx, shutdown_rx).await {
                warn!(%addr, connection = %conn, "Connection error: {}", e);
            }
            open.fetch_sub(1, Ordering::Relaxed);

            let _ = cmd_tx.send(Command::Closed { conn }).await;
            info!(%addr, connection = %conn, "Client cleaned up");
        });
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get open connection count.
    pub fn connection_count(&self) -> usize {
        self.open_connections.load(Ordering::Relaxed)
    }
}

/// Pump one WebSocket until it closes.
async fn serve_connection(
    stream: TcpStream,
    addr: SocketAddr,
    conn: ConnectionId,
    queue: usize,
    cmd_tx: &mpsc::Sender<Command>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), GameServerError> {
    let ws_stream = accept_async(stream).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(queue);

    if cmd_tx.send(Command::Connected { conn, sender: msg_tx }).await.is_err() {
        return Err(GameServerError::Internal("dispatcher stopped".to_string()));
    }

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
        let _ = ws_sender.close().await;
    });

    // Handle incoming messages
    let result = loop {
        tokio::select! {
            msg = ws_receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if cmd_tx.send(Command::Inbound { conn, text }).await.is_err() {
                            break Ok(());
                        }
                    }
                    Some(Ok(Message::Binary(_))) => {
                        debug!(%addr, "Ignoring binary frame");
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("Client {} disconnected", addr);
                        break Ok(());
                    }
                    Some(Err(e)) => {
                        break Err(GameServerError::from(e));
                    }
                    // ping/pong are answered by tungstenite
                    Some(Ok(_)) => {}
                }
            }
            _ = shutdown_rx.recv() => {
                break Ok(());
            }
        }
    };

    sender_task.abort();
    result
}

/// Own the session and serialize every mutation.
async fn run_dispatcher(
    mut session: GameSession,
    mut commands: mpsc::Receiver<Command>,
    tick_rate: u32,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let started = Instant::now();
    let mut ticker = interval(Duration::from_secs(1) / tick_rate.max(1));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_tick = started;

    loop {
        let wake = session
            .next_deadline()
            .map(|ms| started + Duration::from_millis(ms));

        tokio::select! {
            cmd = commands.recv() => {
                let Some(cmd) = cmd else {
                    break;
                };
                let now = elapsed_ms(started);
                match cmd {
                    Command::Connected { conn, sender } => session.connect(conn, sender),
                    Command::Inbound { conn, text } => session.handle_text(conn, &text, now),
                    Command::Closed { conn } => session.disconnect(conn, now),
                }
            }
            _ = ticker.tick() => {
                let now = Instant::now();
                let result = session.tick(now - last_tick, elapsed_ms(started));
                last_tick = now;
                if result.round_ended {
                    debug!(tick = session.state().tick, "Round ended on tick");
                }
            }
            _ = sleep_until_deadline(wake) => {
                session.fire_due(elapsed_ms(started));
            }
            _ = shutdown_rx.recv() => {
                break;
            }
        }
    }

    info!(sessions = session.registry().len(), "Dispatcher stopped");
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
