//! Server network layer: WebSocket sessions feeding the single simulation loop

use crate::config::ArenaConfig;
use crate::registry::Registry;
use crate::session::{Outbound, SessionManager};
use crate::stats::StatsReporter;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::{ClientMessage, SessionId, TICK_INTERVAL_MS};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;

/// Log a load summary every this many ticks.
const STATUS_LOG_TICKS: u64 = 300;

/// Messages sent from connection tasks to the main server loop
#[derive(Debug)]
pub enum NetworkEvent {
    Connected {
        session: SessionId,
        addr: SocketAddr,
        outbound: Outbound,
    },
    Message {
        session: SessionId,
        message: ClientMessage,
    },
    Disconnected {
        session: SessionId,
    },
}

/// Parses one text frame. Malformed frames are dropped.
pub fn decode_frame(session: SessionId, text: &str) -> Option<ClientMessage> {
    match ClientMessage::from_json(text) {
        Ok(message) => Some(message),
        Err(e) => {
            debug!("Dropping malformed frame from session {}: {}", session, e);
            None
        }
    }
}

/// Main server coordinating connections and every room's simulation
pub struct Server {
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    registry: Registry,
    sessions: SessionManager,
    stats: StatsReporter,
    tick: u64,
}

impl Server {
    pub async fn bind(
        addr: &str,
        config: &ArenaConfig,
        stats: StatsReporter,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!(
            "Server listening on {} with {} rooms",
            local_addr,
            config.rooms.len()
        );

        Ok(Server {
            listener: Some(listener),
            local_addr,
            registry: Registry::from_config(config),
            sessions: SessionManager::new(),
            stats,
            tick: 0,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts connections until the listener fails and hands each to its own task
    async fn accept_loop(listener: TcpListener, events: mpsc::UnboundedSender<NetworkEvent>) {
        let mut next_session: SessionId = 1;

        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    let session = next_session;
                    next_session += 1;
                    debug!("Accepted TCP connection {} from {}", session, addr);
                    tokio::spawn(Self::handle_connection(stream, addr, session, events.clone()));
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }

            if events.is_closed() {
                break;
            }
        }
    }

    /// Runs one WebSocket session: a writer task draining the outbound queue
    /// and a reader loop forwarding parsed intents.
    async fn handle_connection(
        stream: TcpStream,
        addr: SocketAddr,
        session: SessionId,
        events: mpsc::UnboundedSender<NetworkEvent>,
    ) {
        let ws_stream = match tokio_tungstenite::accept_async(stream).await {
            Ok(ws_stream) => ws_stream,
            Err(e) => {
                warn!("WebSocket handshake with {} failed: {}", addr, e);
                return;
            }
        };
        let (mut ws_writer, mut ws_reader) = ws_stream.split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<String>();

        if events
            .send(NetworkEvent::Connected {
                session,
                addr,
                outbound,
            })
            .is_err()
        {
            return;
        }

        // Ends once the session is dropped from the manager
        let writer = tokio::spawn(async move {
            while let Some(text) = outbound_rx.recv().await {
                if ws_writer.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            let _ = ws_writer.close().await;
        });

        while let Some(frame) = ws_reader.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    let Some(message) = decode_frame(session, &text) else {
                        continue;
                    };
                    if events
                        .send(NetworkEvent::Message { session, message })
                        .is_err()
                    {
                        break;
                    }
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    debug!("WebSocket read error on session {}: {}", session, e);
                    break;
                }
            }
        }

        let _ = events.send(NetworkEvent::Disconnected { session });
        if writer.await.is_err() {
            error!("Writer task for session {} panicked", session);
        }
    }

    fn handle_event(&mut self, event: NetworkEvent) {
        match event {
            NetworkEvent::Connected {
                session,
                addr,
                outbound,
            } => self.sessions.register(session, addr, outbound),
            NetworkEvent::Message { session, message } => {
                self.sessions
                    .handle(&mut self.registry, session, message, Instant::now());
            }
            NetworkEvent::Disconnected { session } => {
                self.sessions.disconnect(&mut self.registry, session);
            }
        }
    }

    /// Advances every room, broadcasts snapshots, then delivers the tick's events
    fn run_tick(&mut self) {
        let snapshots = self.registry.tick();
        self.release_faulted();
        self.sessions.broadcast_snapshots(snapshots);
        self.sessions
            .flush_events(self.registry.drain_events(), &self.stats);
        self.tick += 1;

        if self.tick % STATUS_LOG_TICKS == 0 && !self.sessions.is_empty() {
            debug!(
                "Tick {}: {} sessions, {} players across {} rooms",
                self.tick,
                self.sessions.len(),
                self.registry.player_count(),
                self.registry.len()
            );
        }
    }

    fn run_second(&mut self) {
        self.registry.on_second();
        self.release_faulted();
        self.sessions
            .flush_events(self.registry.drain_events(), &self.stats);
    }

    fn release_faulted(&mut self) {
        for room in self.registry.drain_faults() {
            self.sessions.release_room(&room);
        }
    }

    /// Main server loop. Everything that touches room state runs here, in order.
    pub async fn run(mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let listener = self.listener.take().ok_or("server is already running")?;
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        tokio::spawn(Self::accept_loop(listener, events_tx));

        let mut tick_interval = interval(Duration::from_millis(TICK_INTERVAL_MS));
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut second_interval = interval(Duration::from_secs(1));
        second_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // Skip the first tick since it fires immediately
        second_interval.tick().await;

        info!("Server started successfully");

        loop {
            tokio::select! {
                event = events_rx.recv() => {
                    match event {
                        Some(event) => self.handle_event(event),
                        None => {
                            info!("Listener stopped, shutting down");
                            break;
                        }
                    }
                },

                _ = tick_interval.tick() => self.run_tick(),

                _ = second_interval.tick() => self.run_second(),
            }
        }

        Ok(())
    }
}
