use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::PathBuf;

use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use snake_duel_server::config::init_tracing;
use snake_duel_server::constants::{in_bounds, INITIAL_BODY_LEN};
use snake_duel_server::engine::GameEngine;
use snake_duel_server::types::{PlayerView, RuntimeEvent, Slot, Velocity};
use tracing::{info, warn};

/// Plays a headless duel between two random-walk bots and checks the engine
/// invariants on every tick.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[arg(long, default_value_t = 2_000)]
    ticks: u64,
    #[arg(long)]
    seed: Option<u32>,
    /// Chance per tick that a bot picks a new direction.
    #[arg(long, default_value_t = 0.3)]
    turn_chance: f64,
    #[arg(long)]
    summary_out: Option<PathBuf>,
}

#[derive(Clone, Debug, Default, Serialize)]
struct PlayerStats {
    #[serde(rename = "foodEaten")]
    food_eaten: u32,
    deaths: u32,
    #[serde(rename = "wallResets")]
    wall_resets: u32,
    #[serde(rename = "bestScore")]
    best_score: u32,
}

#[derive(Clone, Debug, Serialize)]
struct Anomaly {
    tick: u64,
    message: String,
}

#[derive(Clone, Debug, Serialize)]
struct RunSummary {
    seed: u32,
    ticks: u64,
    players: BTreeMap<String, PlayerStats>,
    anomalies: Vec<Anomaly>,
}

const BOTS: [(&str, Slot); 2] = [("bot_1", Slot::P1), ("bot_2", Slot::P2)];
const DIRECTIONS: [Velocity; 4] = [Velocity::UP, Velocity::DOWN, Velocity::LEFT, Velocity::RIGHT];

fn main() -> io::Result<()> {
    init_tracing("info");
    let cli = Cli::parse();
    let seed = cli.seed.unwrap_or_else(rand::random);

    let summary = run(seed, cli.ticks, cli.turn_chance);
    for anomaly in &summary.anomalies {
        warn!(tick = anomaly.tick, "{}", anomaly.message);
    }
    info!(
        seed,
        ticks = summary.ticks,
        anomalies = summary.anomalies.len(),
        "simulation finished"
    );

    let line = serde_json::to_string(&summary).map_err(io::Error::other)?;
    println!("{line}");
    if let Some(path) = cli.summary_out {
        fs::write(path, format!("{line}\n"))?;
    }
    Ok(())
}

fn run(seed: u32, ticks: u64, turn_chance: f64) -> RunSummary {
    let mut engine = GameEngine::new(seed);
    let mut bot_rng = StdRng::seed_from_u64(seed as u64);
    let mut stats: BTreeMap<String, PlayerStats> = BTreeMap::new();
    for (id, slot) in BOTS {
        engine.add_player(id, slot, 0);
        stats.insert(id.to_string(), PlayerStats::default());
    }

    let mut anomalies = Vec::new();
    for tick in 1..=ticks {
        for (id, _) in BOTS {
            if bot_rng.random_bool(turn_chance.clamp(0.0, 1.0)) {
                let dir = DIRECTIONS[bot_rng.random_range(0..DIRECTIONS.len())];
                engine.receive_input(id, dir);
            }
        }

        let before: BTreeMap<String, (usize, Velocity)> = engine
            .players()
            .map(|player| {
                let heading = engine.heading(&player.id).unwrap_or_default();
                (player.id.clone(), (player.body.len(), heading))
            })
            .collect();
        let events = engine.step();

        let mut reset = Vec::new();
        for event in &events {
            match event {
                RuntimeEvent::PlayerDied { player_id } => {
                    reset.push(player_id.clone());
                    if let Some(entry) = stats.get_mut(player_id) {
                        entry.deaths += 1;
                    }
                }
                RuntimeEvent::WallReset { player_id } => {
                    reset.push(player_id.clone());
                    if let Some(entry) = stats.get_mut(player_id) {
                        entry.wall_resets += 1;
                    }
                }
                RuntimeEvent::FoodEaten { player_id, score } => {
                    if let Some(entry) = stats.get_mut(player_id) {
                        entry.food_eaten += 1;
                        entry.best_score = entry.best_score.max(*score);
                    }
                }
            }
        }

        for player in engine.players() {
            let was_reset = reset.contains(&player.id);
            let ate = events.iter().any(|event| {
                matches!(event, RuntimeEvent::FoodEaten { player_id, .. } if *player_id == player.id)
            });
            let (prev_len, prev_heading) = before
                .get(&player.id)
                .copied()
                .unwrap_or((player.body.len(), Velocity::ZERO));
            let heading = engine.heading(&player.id).unwrap_or_default();
            for message in check_player(player, was_reset, ate, prev_len, prev_heading, heading) {
                anomalies.push(Anomaly { tick, message });
            }
        }
    }

    RunSummary {
        seed,
        ticks,
        players: stats,
        anomalies,
    }
}

fn check_player(
    player: &PlayerView,
    was_reset: bool,
    ate: bool,
    prev_len: usize,
    prev_heading: Velocity,
    heading: Velocity,
) -> Vec<String> {
    let mut problems = Vec::new();
    if player.body.front() != Some(&player.head()) {
        problems.push(format!("{}: head does not match body[0]", player.id));
    }
    if player.body.len() < INITIAL_BODY_LEN {
        problems.push(format!("{}: body shorter than {}", player.id, INITIAL_BODY_LEN));
    }
    if let Some(cell) = player.body.iter().find(|cell| !in_bounds(**cell)) {
        problems.push(format!("{}: cell ({}, {}) off the board", player.id, cell.x, cell.y));
    }
    if was_reset {
        if player.body.len() != INITIAL_BODY_LEN || player.score != 0 {
            problems.push(format!("{}: reset left stale body or score", player.id));
        }
        return problems;
    }

    let expected_len = if ate { prev_len + 1 } else { prev_len };
    if player.body.len() != expected_len {
        problems.push(format!(
            "{}: body length {} expected {}",
            player.id,
            player.body.len(),
            expected_len
        ));
    }
    if heading.is_reverse_of(prev_heading) {
        problems.push(format!("{}: reversed direction in one tick", player.id));
    }
    problems
}
