use crate::camera::Camera;
use crate::game::GameClient;
use macroquad::prelude::*;
use shared::{PlayerView, RoomSnapshot, RoomStatus, Vector2};
use std::time::Duration;

const BACKGROUND: Color = Color::new(0.008, 0.016, 0.04, 1.0);
const GRID_STEP: f64 = 100.0;
const VIRUS_SPIKES: usize = 18;

/// Parses the server's `hsl(H, S%, L%)` colours. Anything else renders grey.
pub fn parse_color(text: &str) -> Color {
    parse_hsl(text).unwrap_or(GRAY)
}

fn parse_hsl(text: &str) -> Option<Color> {
    let inner = text.trim().strip_prefix("hsl(")?.strip_suffix(')')?;
    let mut parts = inner.split(',').map(|p| p.trim().trim_end_matches('%'));
    let h: f32 = parts.next()?.parse().ok()?;
    let s: f32 = parts.next()?.parse().ok()?;
    let l: f32 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(hsl_to_rgb(h, s / 100.0, l / 100.0))
}

fn hsl_to_rgb(h: f32, s: f32, l: f32) -> Color {
    let c = (1.0 - (2.0 * l - 1.0).abs()) * s;
    let h = h.rem_euclid(360.0) / 60.0;
    let x = c * (1.0 - (h % 2.0 - 1.0).abs());
    let (r, g, b) = match h as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = l - c / 2.0;
    Color::new(r + m, g + m, b + m, 1.0)
}

/// HUD inputs that do not come from the snapshot itself
#[derive(Debug, Clone)]
pub struct HudInfo {
    pub connected: bool,
    pub fake_ping_ms: u64,
    pub jitter: Option<Duration>,
}

pub struct Renderer {
    screen: (f64, f64),
}

impl Renderer {
    pub fn new() -> Self {
        Self {
            screen: (screen_width() as f64, screen_height() as f64),
        }
    }

    fn to_screen(&self, camera: &Camera, x: f64, y: f64) -> (f32, f32) {
        let (sx, sy) = camera.world_to_screen(Vector2::new(x, y), self.screen);
        (sx as f32, sy as f32)
    }

    pub fn render(&mut self, view: Option<&RoomSnapshot>, game: &GameClient, hud: &HudInfo) {
        self.screen = (screen_width() as f64, screen_height() as f64);
        clear_background(BACKGROUND);

        if let Some(view) = view {
            let camera = game.camera;
            self.draw_world(view, &camera);

            let mut players: Vec<&PlayerView> = view.players.values().collect();
            players.sort_by(|a, b| a.total_mass.total_cmp(&b.total_mass));
            for player in players {
                self.draw_player(player, &camera, Some(player.id) == game.session_id);
            }
            self.draw_status(view, game);
        } else {
            draw_text("Waiting for room state...", 20.0, 40.0, 24.0, WHITE);
        }

        self.draw_ui(game, hud);
    }

    fn draw_world(&mut self, view: &RoomSnapshot, camera: &Camera) {
        let scale = camera.scale as f32;

        let (left, top) = self.to_screen(camera, 0.0, 0.0);
        let (right, bottom) = self.to_screen(camera, view.map_width, view.map_height);
        let grid = Color::new(1.0, 1.0, 1.0, 0.03);
        let mut x = 0.0;
        while x <= view.map_width {
            let (sx, _) = self.to_screen(camera, x, 0.0);
            draw_line(sx, top, sx, bottom, 1.0, grid);
            x += GRID_STEP;
        }
        let mut y = 0.0;
        while y <= view.map_height {
            let (_, sy) = self.to_screen(camera, 0.0, y);
            draw_line(left, sy, right, sy, 1.0, grid);
            y += GRID_STEP;
        }
        draw_rectangle_lines(
            left,
            top,
            right - left,
            bottom - top,
            (10.0 * scale).max(1.0),
            Color::new(0.0, 0.95, 1.0, 0.2),
        );

        for food in view.food.values() {
            let (sx, sy) = self.to_screen(camera, food.x, food.y);
            draw_circle(sx, sy, food.radius as f32 * scale, parse_color(&food.color));
        }
        for blob in view.ejected_mass.values() {
            let (sx, sy) = self.to_screen(camera, blob.x, blob.y);
            draw_circle(sx, sy, blob.radius as f32 * scale, parse_color(&blob.color));
        }
        for virus in view.viruses.values() {
            let (sx, sy) = self.to_screen(camera, virus.x, virus.y);
            self.draw_virus(sx, sy, virus.radius as f32 * scale);
        }
    }

    fn draw_virus(&mut self, x: f32, y: f32, radius: f32) {
        let fill = Color::new(0.2, 1.0, 0.2, 0.8);
        let edge = Color::new(0.13, 0.67, 0.13, 1.0);
        draw_circle(x, y, radius * 0.85, fill);

        let points = VIRUS_SPIKES * 2;
        for i in 0..points {
            let r0 = if i % 2 == 0 { radius } else { radius * 0.85 };
            let r1 = if i % 2 == 0 { radius * 0.85 } else { radius };
            let a0 = std::f32::consts::TAU * i as f32 / points as f32;
            let a1 = std::f32::consts::TAU * (i + 1) as f32 / points as f32;
            let p0 = vec2(x + a0.cos() * r0, y + a0.sin() * r0);
            let p1 = vec2(x + a1.cos() * r1, y + a1.sin() * r1);
            draw_triangle(vec2(x, y), p0, p1, fill);
            draw_line(p0.x, p0.y, p1.x, p1.y, 2.0, edge);
        }
    }

    fn draw_player(&mut self, player: &PlayerView, camera: &Camera, is_local: bool) {
        let color = parse_color(&player.color);
        let scale = camera.scale as f32;
        let border = if is_local {
            Color::new(1.0, 1.0, 1.0, 0.8)
        } else {
            Color::new(1.0, 1.0, 1.0, 0.3)
        };

        for fragment in &player.fragments {
            let (sx, sy) = self.to_screen(camera, fragment.x, fragment.y);
            let r = fragment.radius as f32 * scale;
            draw_circle(sx, sy, r, color);
            draw_circle_lines(sx, sy, r, if is_local { 4.0 } else { 2.0 }, border);
        }

        if let Some(centroid) = player.centroid() {
            let (sx, sy) = self.to_screen(camera, centroid.x, centroid.y);
            let size = 18.0;
            let dims = measure_text(&player.name, None, size as u16, 1.0);
            draw_text(&player.name, sx - dims.width / 2.0, sy + dims.height / 2.0, size, WHITE);
        }
    }

    fn draw_status(&mut self, view: &RoomSnapshot, game: &GameClient) {
        let centre_x = self.screen.0 as f32 / 2.0;
        let banner = match view.status {
            RoomStatus::Waiting => Some("Waiting for players...".to_string()),
            RoomStatus::Starting => Some(format!("Match starts in {}", view.countdown)),
            RoomStatus::Ended => Some(format!(
                "{} wins!",
                view.winner_name.as_deref().unwrap_or("Nobody")
            )),
            RoomStatus::Active => None,
        };
        if let Some(text) = banner {
            let dims = measure_text(&text, None, 32, 1.0);
            draw_text(&text, centre_x - dims.width / 2.0, 60.0, 32.0, WHITE);
        }

        if let Some(player) = game.local_player(view) {
            let mass = format!("Mass: {:.0}", player.total_mass);
            draw_text(&mass, 10.0, self.screen.1 as f32 - 16.0, 24.0, WHITE);
        }

        let notice = if let Some(pot) = game.victory {
            Some((format!("Victory! You won {:.2}", pot), GOLD))
        } else {
            game.game_over.as_ref().map(|over| {
                let by = over.winner.as_deref().unwrap_or("someone");
                let text = if over.is_lobby {
                    format!("Eaten by {}. Respawning...", by)
                } else {
                    format!("Eaten by {}", by)
                };
                (text, RED)
            })
        };
        if let Some((text, color)) = notice {
            let dims = measure_text(&text, None, 40, 1.0);
            let y = self.screen.1 as f32 / 2.0;
            draw_text(&text, centre_x - dims.width / 2.0, y, 40.0, color);
        }
    }

    fn draw_ui(&mut self, game: &GameClient, hud: &HudInfo) {
        let y_start = 10.0;

        let connection_color = if hud.connected && game.session_id.is_some() {
            GREEN
        } else {
            RED
        };
        draw_rectangle(10.0, y_start, 8.0, 8.0, connection_color);
        let label = if game.spectator {
            format!("Room {} (spectating)", game.room_id)
        } else {
            format!("Room {}", game.room_id)
        };
        draw_text(&label, 24.0, y_start + 8.0, 16.0, WHITE);

        // Jitter bars: one bar per 5ms away from the tick interval
        let jitter_y = y_start + 18.0;
        let jitter_ms = hud.jitter.map_or(0, |j| j.as_millis() as u64);
        let bars = (jitter_ms / 5).min(10) as i32;
        for i in 0..10i32 {
            let bar_color = if i < bars {
                if jitter_ms < 10 {
                    GREEN
                } else if jitter_ms < 30 {
                    YELLOW
                } else {
                    RED
                }
            } else {
                Color::from_rgba(51, 51, 51, 255)
            };
            draw_rectangle(10.0 + (i as f32) * 3.0, jitter_y, 2.0, 8.0, bar_color);
        }
        let mut jitter_text = format!("jitter {}ms", jitter_ms);
        if hud.fake_ping_ms > 0 {
            jitter_text.push_str(&format!(" (+{}ms simulated)", hud.fake_ping_ms));
        }
        draw_text(&jitter_text, 45.0, jitter_y + 8.0, 14.0, WHITE);

        if let Some(code) = game.last_error {
            draw_text(code.as_str(), 10.0, jitter_y + 26.0, 16.0, ORANGE);
        }
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}
