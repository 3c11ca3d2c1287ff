//! Client network layer: one WebSocket session driven on a background runtime.
//!
//! The render loop owns the main thread, so the socket lives on its own thread
//! with a current-thread tokio runtime. Intents go out over an unbounded
//! channel; notifications come back over a std channel the render loop drains
//! once per frame.

use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::{ClientMessage, ServerMessage};
use std::collections::VecDeque;
use std::sync::mpsc as std_mpsc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// What the render loop hears from the connection thread
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Connected,
    Message(ServerMessage),
    Disconnected(String),
}

pub struct NetworkClient {
    outbound: mpsc::UnboundedSender<ClientMessage>,
    inbound: std_mpsc::Receiver<ClientEvent>,
    connected: bool,
}

impl NetworkClient {
    /// Starts the connection thread. `fake_ping_ms` delays each direction by half its value.
    pub fn connect(url: &str, fake_ping_ms: u64) -> Result<Self, Box<dyn std::error::Error>> {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound) = std_mpsc::channel();
        let url = url.to_string();
        let delay = Duration::from_millis(fake_ping_ms / 2);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        std::thread::Builder::new()
            .name("network".to_string())
            .spawn(move || {
                runtime.block_on(run_connection(url, delay, outbound_rx, inbound_tx));
            })?;

        Ok(Self {
            outbound,
            inbound,
            connected: false,
        })
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Queues an intent. Returns false once the connection thread is gone.
    pub fn send(&self, message: ClientMessage) -> bool {
        self.outbound.send(message).is_ok()
    }

    /// Drains everything received since the last call.
    pub fn poll(&mut self) -> Vec<ClientEvent> {
        let events: Vec<ClientEvent> = self.inbound.try_iter().collect();
        for event in &events {
            match event {
                ClientEvent::Connected => self.connected = true,
                ClientEvent::Disconnected(_) => self.connected = false,
                ClientEvent::Message(_) => {}
            }
        }
        events
    }
}

/// Messages held back to simulate one direction of latency.
/// The delay is constant, so release order is arrival order.
struct DelayLine<T> {
    delay: Duration,
    queue: VecDeque<(Instant, T)>,
}

impl<T> DelayLine<T> {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            queue: VecDeque::new(),
        }
    }

    fn push(&mut self, item: T) {
        self.queue.push_back((Instant::now() + self.delay, item));
    }

    /// When the oldest held message is due, if any is held.
    fn next_due(&self) -> Option<Instant> {
        self.queue.front().map(|(due, _)| *due)
    }

    /// Every message whose delay has elapsed, oldest first.
    fn release(&mut self, now: Instant) -> Vec<T> {
        let ready = self.queue.iter().take_while(|(due, _)| *due <= now).count();
        self.queue.drain(..ready).map(|(_, item)| item).collect()
    }

    fn drain_all(&mut self) -> Vec<T> {
        self.queue.drain(..).map(|(_, item)| item).collect()
    }
}

/// Hands over anything still in flight, then reports the disconnect.
fn close_with(
    reason: String,
    receiving: &mut DelayLine<ServerMessage>,
    inbound: &std_mpsc::Sender<ClientEvent>,
) {
    for message in receiving.drain_all() {
        let _ = inbound.send(ClientEvent::Message(message));
    }
    let _ = inbound.send(ClientEvent::Disconnected(reason));
}

async fn wait_until(due: Option<Instant>) {
    match due {
        Some(due) => sleep_until(due).await,
        None => std::future::pending().await,
    }
}

async fn run_connection(
    url: String,
    delay: Duration,
    mut outbound: mpsc::UnboundedReceiver<ClientMessage>,
    inbound: std_mpsc::Sender<ClientEvent>,
) {
    info!("Connecting to {}", url);
    let ws_stream = match connect_async(url.as_str()).await {
        Ok((ws_stream, _)) => ws_stream,
        Err(e) => {
            error!("Failed to connect to {}: {}", url, e);
            let _ = inbound.send(ClientEvent::Disconnected(e.to_string()));
            return;
        }
    };
    if inbound.send(ClientEvent::Connected).is_err() {
        return;
    }
    let (mut writer, mut reader) = ws_stream.split();
    let mut sending = DelayLine::new(delay);
    let mut receiving = DelayLine::new(delay);

    loop {
        let send_due = sending.next_due();
        let receive_due = receiving.next_due();

        tokio::select! {
            intent = outbound.recv() => {
                let Some(intent) = intent else {
                    // Render loop is gone
                    let _ = writer.close().await;
                    break;
                };
                match intent.to_json() {
                    Ok(text) => sending.push(text),
                    Err(e) => error!("Failed to serialize {:?}: {}", intent, e),
                }
            },

            _ = wait_until(send_due) => {
                for text in sending.release(Instant::now()) {
                    if let Err(e) = writer.send(Message::Text(text.into())).await {
                        let _ = inbound.send(ClientEvent::Disconnected(e.to_string()));
                        return;
                    }
                }
            },

            frame = reader.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => match ServerMessage::from_json(&text) {
                        Ok(message) => receiving.push(message),
                        Err(e) => warn!("Unreadable frame from server: {}", e),
                    },
                    Some(Ok(Message::Close(_))) | None => {
                        close_with("closed by server".to_string(), &mut receiving, &inbound);
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!("WebSocket read error: {}", e);
                        close_with(e.to_string(), &mut receiving, &inbound);
                        break;
                    }
                }
            },

            _ = wait_until(receive_due) => {
                for message in receiving.release(Instant::now()) {
                    if inbound.send(ClientEvent::Message(message)).is_err() {
                        return;
                    }
                }
            },
        }
    }
}
