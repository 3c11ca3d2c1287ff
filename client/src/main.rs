use clap::Parser;
use client::game::GameClient;
use client::input::{FrameInput, InputManager};
use client::network::{ClientEvent, NetworkClient};
use client::rendering::{HudInfo, Renderer};
use log::{error, info, warn};
use macroquad::prelude::*;
use shared::PlayerData;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// WebSocket URL of the server
    #[arg(short = 's', long, default_value = "ws://127.0.0.1:8080")]
    server: String,

    /// Room to join
    #[arg(short = 'r', long, default_value = "0")]
    room: String,

    /// Display name
    #[arg(short = 'n', long)]
    name: Option<String>,

    /// Wallet identifier for stats
    #[arg(long)]
    wallet: Option<String>,

    /// Watch the room without taking a seat
    #[arg(long)]
    spectate: bool,

    /// Simulate network latency in milliseconds
    #[arg(short = 'l', long, default_value = "0")]
    fake_ping: u64,

    /// Window width
    #[arg(short = 'w', long, default_value = "1280")]
    width: i32,

    /// Window height (no short flag to avoid conflict with --help)
    #[arg(long, default_value = "720")]
    height: i32,
}

fn window_conf() -> Conf {
    let args = Args::parse();
    Conf {
        window_title: "Mass Arena".to_string(),
        window_width: args.width,
        window_height: args.height,
        ..Default::default()
    }
}

#[macroquad::main(window_conf)]
async fn main() {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting client...");
    info!("Connecting to: {}", args.server);
    if args.fake_ping > 0 {
        info!("Simulating {}ms latency", args.fake_ping);
    }
    info!("Controls: mouse to steer, Space to split, W to eject, Esc to quit");

    let mut network = match NetworkClient::connect(&args.server, args.fake_ping) {
        Ok(network) => network,
        Err(e) => {
            error!("Failed to start network thread: {}", e);
            return;
        }
    };

    let player_data = PlayerData {
        name: args.name.clone(),
        wallet_address: args.wallet.clone(),
    };
    let mut game = GameClient::new(args.room.clone(), player_data, args.spectate);
    let mut input = InputManager::new();
    let mut renderer = Renderer::new();

    loop {
        if is_key_pressed(KeyCode::Escape) {
            break;
        }
        let now = Instant::now();

        for event in network.poll() {
            match event {
                ClientEvent::Connected => info!("Connected to {}", args.server),
                ClientEvent::Message(message) => {
                    if let Some(reply) = game.apply(message, now) {
                        network.send(reply);
                    }
                }
                ClientEvent::Disconnected(reason) => warn!("Disconnected: {}", reason),
            }
        }

        let view = game.frame(now);

        if !game.spectator {
            let frame = FrameInput::sample();
            let player = view.as_ref().and_then(|v| game.local_player(v));
            for intent in input.update(&frame, player, game.camera.scale, now) {
                network.send(intent);
            }
        }

        let hud = HudInfo {
            connected: network.is_connected(),
            fake_ping_ms: args.fake_ping,
            jitter: game.mirror.jitter(),
        };
        renderer.render(view.as_ref(), &game, &hud);

        next_frame().await;
    }
}
