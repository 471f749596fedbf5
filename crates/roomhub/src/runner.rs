//! Match Runner (C6): one per active room, owning a 20 Hz tick loop over
//! every member's [`Simulation`]. `game_input` is applied inline by the Hub
//! between ticks through the same per-match lock the ticker holds, so
//! inputs and ticks serialize cleanly per room (§5).
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rand::rngs::SmallRng;
use rand::SeedableRng;
use roomhub_core::TICK_INTERVAL;
use roomhub_db::RoomId;
use roomhub_engine::Simulation;
use tokio::sync::{Mutex, mpsc};

use crate::protocol::ServerMessage;
use crate::registry::Registry;
use crate::session::UserId;

pub type GameMap = Arc<Mutex<HashMap<UserId, Simulation>>>;

/// Posted back to the Hub loop when the tick task observes any player enter
/// game-over. Completion bookkeeping (persistence, broadcasts, runner
/// teardown) stays on the Hub's single serialization point.
pub struct MatchEnded {
    pub room_id: RoomId,
}

/// Handle the Hub keeps per active room. Dropping it does not stop the
/// runner; call [`RunnerHandle::stop`] explicitly so teardown is observable.
pub struct RunnerHandle {
    pub games: GameMap,
    active: Arc<AtomicBool>,
}

impl RunnerHandle {
    pub fn stop(&self) {
        self.active.store(false, Ordering::SeqCst);
    }
}

/// Spawns the tick task for `room_id` and returns the Hub-facing handle.
pub fn spawn(
    room_id: RoomId,
    starting_level: i64,
    users: Vec<UserId>,
    registry: Arc<Registry>,
    match_ended: mpsc::UnboundedSender<MatchEnded>,
) -> RunnerHandle {
    let level = starting_level.clamp(1, 29) as u32;
    let mut games = HashMap::new();
    for (i, user) in users.into_iter().enumerate() {
        let rng = SmallRng::seed_from_u64(seed_for(&room_id, user, i));
        games.insert(user, Simulation::new(level, rng));
    }
    let games = Arc::new(Mutex::new(games));
    let active = Arc::new(AtomicBool::new(true));

    let handle = RunnerHandle {
        games: games.clone(),
        active: active.clone(),
    };

    tokio::spawn(tick_loop(room_id, games, active, registry, match_ended));
    handle
}

fn seed_for(room_id: &str, user: UserId, index: usize) -> u64 {
    let mut hash: u64 = 1469598103934665603;
    for byte in room_id.bytes().chain(user.to_le_bytes()).chain([index as u8]) {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(1099511628211);
    }
    hash
}

async fn tick_loop(
    room_id: RoomId,
    games: GameMap,
    active: Arc<AtomicBool>,
    registry: Arc<Registry>,
    match_ended: mpsc::UnboundedSender<MatchEnded>,
) {
    let mut ticker = tokio::time::interval(TICK_INTERVAL);
    loop {
        ticker.tick().await;
        if !active.load(Ordering::SeqCst) {
            return;
        }
        let mut any_game_over = false;
        {
            let mut games = games.lock().await;
            for (&user, game) in games.iter_mut() {
                if game.is_game_over() {
                    any_game_over = true;
                    continue;
                }
                game.tick();
                let snapshot = game.snapshot();
                if game.is_game_over() {
                    any_game_over = true;
                }
                registry
                    .broadcast_room(
                        &room_id,
                        ServerMessage::PlayerGameState {
                            user_id: user,
                            state: snapshot,
                        },
                    )
                    .await;
            }
        }
        if any_game_over {
            active.store(false, Ordering::SeqCst);
            let _ = match_ended.send(MatchEnded {
                room_id: room_id.clone(),
            });
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn tick_loop_broadcasts_until_match_ends() {
        let registry = Arc::new(Registry::new());
        let (handle, mut rx) = crate::session::channel(1, "r1".to_string());
        registry.add(handle).await;
        let (tx, mut ended_rx) = mpsc::unbounded_channel();

        spawn("r1".to_string(), 1, vec![1], registry.clone(), tx);

        tokio::time::advance(TICK_INTERVAL).await;
        assert!(rx.try_recv().is_ok());
        assert!(ended_rx.try_recv().is_err());
    }

    #[test]
    fn seed_for_is_stable_given_same_inputs() {
        assert_eq!(seed_for("r1", 7, 0), seed_for("r1", 7, 0));
        assert_ne!(seed_for("r1", 7, 0), seed_for("r1", 8, 0));
    }
}
