//! Headless load generator: a handful of bots that join a room and wander.

use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use rand::Rng;
use server::rate_limit::IP_JOIN_INTERVAL;
use shared::{
    ClientMessage, ErrorCode, JoinRoom, PlayerData, ServerMessage, MAP_HEIGHT, MAP_WIDTH,
};
use std::time::Duration;
use tokio::time::{interval, sleep};
use tokio_tungstenite::{connect_async, tungstenite::Message};

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about)]
struct Args {
    /// WebSocket URL of the server
    #[clap(short, long, default_value = "ws://127.0.0.1:8080")]
    server: String,
    /// Room to join
    #[clap(short, long, default_value = "0")]
    room: String,
    /// Number of bots to run
    #[clap(short, long, default_value = "4")]
    bots: usize,
    /// Seconds to run before disconnecting
    #[clap(short, long, default_value = "30")]
    duration: u64,
}

/// Gap between consecutive bot joins. Every bot shares one source address.
const JOIN_STAGGER: Duration = IP_JOIN_INTERVAL.saturating_add(Duration::from_millis(50));

fn join_delay(index: usize) -> Duration {
    JOIN_STAGGER * index as u32
}

fn join_message(index: usize, room: &str) -> ClientMessage {
    ClientMessage::JoinRoom(JoinRoom {
        room_id: room.to_string(),
        player_data: PlayerData {
            name: Some(format!("bot-{}", index)),
            wallet_address: None,
        },
        spectator: false,
    })
}

/// Runs one bot until the deadline. Returns how many snapshots it saw.
async fn run_bot(index: usize, args: Args) -> Result<u64, Box<dyn std::error::Error + Send + Sync>> {
    let (ws, _) = connect_async(args.server.as_str()).await?;
    let (mut writer, mut reader) = ws.split();
    let join = join_message(index, &args.room).to_json()?;
    let mut joined = false;

    let mut steer = interval(Duration::from_millis(250));
    let deadline = tokio::time::sleep(Duration::from_secs(args.duration));
    tokio::pin!(deadline);
    let mut snapshots = 0u64;

    loop {
        tokio::select! {
            frame = reader.next() => {
                let text = match frame {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return Err(e.into()),
                    None => break,
                };
                match ServerMessage::from_json(&text) {
                    Ok(ServerMessage::Welcome { session_id }) => {
                        debug!("bot-{} is session {}", index, session_id);
                        sleep(join_delay(index)).await;
                        writer.send(Message::Text(join.clone().into())).await?;
                    }
                    Ok(ServerMessage::GameState(_)) => {
                        joined = true;
                        snapshots += 1;
                    }
                    Ok(ServerMessage::Error {
                        code: code @ (ErrorCode::IpJoinRateLimited | ErrorCode::JoinRateLimited),
                    }) if !joined => {
                        let retry = JOIN_STAGGER
                            + Duration::from_millis(rand::thread_rng().gen_range(0..100));
                        warn!("bot-{} join refused ({}), retrying in {:?}", index, code, retry);
                        sleep(retry).await;
                        writer.send(Message::Text(join.clone().into())).await?;
                    }
                    Ok(ServerMessage::GameOver { winner, .. }) => {
                        info!("bot-{} was eaten by {:?}", index, winner);
                    }
                    Ok(ServerMessage::Error { code }) => warn!("bot-{} rejected: {}", index, code),
                    Ok(other) => debug!("bot-{} received {:?}", index, other),
                    Err(e) => warn!("bot-{} got an unreadable frame: {}", index, e),
                }
            }
            _ = steer.tick(), if joined => {
                let intent = {
                    let mut rng = rand::thread_rng();
                    match rng.gen_range(0..20) {
                        0 => ClientMessage::Split,
                        1 => ClientMessage::Eject,
                        _ => ClientMessage::Input {
                            x: rng.gen_range(0.0..MAP_WIDTH),
                            y: rng.gen_range(0.0..MAP_HEIGHT),
                        },
                    }
                };
                writer.send(Message::Text(intent.to_json()?.into())).await?;
            }
            _ = &mut deadline => break,
        }
    }

    info!("bot-{} done after {} snapshots", index, snapshots);
    writer.close().await?;
    Ok(snapshots)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();
    info!("Starting {} bots against {} room {}", args.bots, args.server, args.room);

    let handles: Vec<_> = (0..args.bots)
        .map(|index| {
            let args = args.clone();
            tokio::spawn(async move {
                match run_bot(index, args).await {
                    Ok(0) => warn!("bot-{} never got into room", index),
                    Ok(_) => {}
                    Err(e) => warn!("bot-{} stopped: {}", index, e),
                }
            })
        })
        .collect();

    for handle in handles {
        handle.await?;
    }
    Ok(())
}
