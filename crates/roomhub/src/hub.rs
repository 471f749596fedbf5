//! Room Hub (C5): the single serialization point for every room/match
//! mutation. One task drains three event sources — registration, inbound
//! client messages, and Match Runner completions — plus a cleanup ticker,
//! and never yields shared state to any other task (§5).
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use roomhub_core::{CLEANUP_SCAN_INTERVAL, IDLE_ROOM_AGE, MIN_PLAYERS_TO_START};
use roomhub_db::{MemberStatus, PersistencePort, RoomId, RoomStatus};
use tokio::sync::mpsc;

use crate::protocol::{ClientMessage, ServerMessage};
use crate::registry::Registry;
use crate::runner::{self, MatchEnded, RunnerHandle};
use crate::session::{SessionHandle, SessionId, UserId};

/// A decoded client message, already re-stamped with the sender's
/// authenticated identity by the Connection Endpoint — the Hub never trusts
/// `room_id`/`user_id` fields that arrive on the wire.
pub struct Inbound {
    pub session: SessionId,
    pub room_id: RoomId,
    pub user: UserId,
    pub message: ClientMessage,
}

enum HubEvent {
    Register(SessionHandle),
    Unregister(SessionId),
    Inbound(Inbound),
}

/// Handle used by Connection Endpoint tasks to talk to a running Hub.
#[derive(Clone)]
pub struct HubHandle {
    events: mpsc::UnboundedSender<HubEvent>,
    pub registry: Arc<Registry>,
}

impl HubHandle {
    pub async fn register(&self, session: SessionHandle) {
        self.registry.add(session.clone()).await;
        let _ = self.events.send(HubEvent::Register(session));
    }

    pub fn unregister(&self, session: SessionId) {
        let _ = self.events.send(HubEvent::Unregister(session));
    }

    pub fn dispatch(&self, inbound: Inbound) {
        let _ = self.events.send(HubEvent::Inbound(inbound));
    }
}

/// Spawns the Hub loop and returns a handle to it. `persistence` is shared
/// with whatever HTTP service owns room CRUD; this crate only ever reads
/// and updates through [`PersistencePort`].
pub fn spawn(persistence: Arc<dyn PersistencePort>) -> HubHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let (match_ended_tx, match_ended_rx) = mpsc::unbounded_channel();
    let registry = Arc::new(Registry::new());
    let handle = HubHandle {
        events: tx,
        registry: registry.clone(),
    };
    let hub = Hub {
        persistence,
        registry,
        runners: HashMap::new(),
        match_ended_tx,
    };
    tokio::spawn(hub.run(rx, match_ended_rx));
    handle
}

struct Hub {
    persistence: Arc<dyn PersistencePort>,
    registry: Arc<Registry>,
    runners: HashMap<RoomId, RunnerHandle>,
    /// Cloned into every [`runner::spawn`] call so tick-detected game-overs
    /// replay through this same serialization point.
    match_ended_tx: mpsc::UnboundedSender<MatchEnded>,
}

impl Hub {
    async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<HubEvent>,
        mut match_ended: mpsc::UnboundedReceiver<MatchEnded>,
    ) {
        let mut cleanup = tokio::time::interval(CLEANUP_SCAN_INTERVAL);
        loop {
            tokio::select! {
                event = events.recv() => {
                    match event {
                        Some(HubEvent::Register(session)) => {
                            self.registry
                                .broadcast_room(session.room_id(), self.room_update(session.room_id()).await)
                                .await;
                        }
                        Some(HubEvent::Unregister(id)) => self.on_disconnect(id).await,
                        Some(HubEvent::Inbound(inbound)) => self.on_inbound(inbound).await,
                        None => return,
                    }
                }
                ended = match_ended.recv() => {
                    match ended {
                        Some(ended) => self.on_match_ended(ended.room_id).await,
                        None => return,
                    }
                }
                _ = cleanup.tick() => self.on_cleanup_tick().await,
            }
        }
    }

    async fn room_update(&self, room_id: &str) -> ServerMessage {
        match self.persistence.get_room(room_id).await {
            Ok(room) => ServerMessage::RoomUpdate {
                room: serde_json::json!({
                    "id": room.id,
                    "status": status_str(room.status),
                    "members": room.members.iter().map(|m| serde_json::json!({
                        "user_id": m.user,
                        "display_name": m.display_name,
                        "is_ready": m.is_ready,
                        "status": member_status_str(m.status),
                    })).collect::<Vec<_>>(),
                }),
            },
            Err(e) => {
                log::warn!("[hub] room_update lookup for {room_id} failed: {e}");
                ServerMessage::Error { error: e.to_string() }
            }
        }
    }

    async fn on_inbound(&mut self, inbound: Inbound) {
        let Inbound { session, room_id, user, message } = inbound;
        match message {
            ClientMessage::PlayerReady { ready } => self.on_player_ready(&room_id, user, ready).await,
            ClientMessage::StartGame => self.on_start_game(&room_id).await,
            ClientMessage::StartMultiplayerGame => self.on_start_multiplayer_game(&room_id).await,
            ClientMessage::MultiplayerInit { starting_level } => {
                if let Err(e) = self
                    .persistence
                    .update_room_settings(
                        &room_id,
                        vec![(
                            roomhub_db::STARTING_LEVEL_KEY.to_string(),
                            roomhub_db::SettingValue::Int(starting_level),
                        )],
                    )
                    .await
                {
                    log::warn!("[hub] multiplayerInit persistence error: {e}");
                }
            }
            ClientMessage::SetLevel { level } => {
                self.registry
                    .broadcast_room(&room_id, ServerMessage::LevelChanged { user_id: user, level })
                    .await;
            }
            ClientMessage::GameInput { action } => self.on_game_input(&room_id, user, &action).await,
            ClientMessage::GameState { score, state } => {
                self.on_game_state(&room_id, user, &state.to_string(), score).await
            }
            ClientMessage::PlayerFinished { score, lines } => {
                self.on_player_finished(&room_id, user, score, lines).await
            }
            ClientMessage::SpectateRequest => self.on_spectate_request(&room_id, user).await,
            ClientMessage::PlayerDisconnect { reason } => {
                log::info!("[hub] voluntary disconnect for user {user} in {room_id}: {reason}");
                self.on_disconnect(session).await;
            }
            ClientMessage::Heartbeat { .. } => {}
        }
    }

    async fn on_player_ready(&mut self, room_id: &str, user: UserId, ready: bool) {
        if let Err(e) = self.persistence.update_player_ready(room_id, user, ready).await {
            log::warn!("[hub] update_player_ready failed: {e}");
        }
        let update = self.room_update(room_id).await;
        self.registry.broadcast_room(room_id, update).await;

        let room = match self.persistence.get_room(room_id).await {
            Ok(room) => room,
            Err(_) => return,
        };
        if room.status == RoomStatus::Waiting
            && room.members.len() >= MIN_PLAYERS_TO_START
            && room.all_ready()
        {
            self.start_match(room_id).await;
        }
    }

    async fn on_start_game(&mut self, room_id: &str) {
        if let Err(e) = self
            .persistence
            .update_room_status(room_id, RoomStatus::Active)
            .await
        {
            self.registry
                .broadcast_room(room_id, ServerMessage::Error { error: e.to_string() })
                .await;
            return;
        }
        self.registry
            .broadcast_room(
                room_id,
                ServerMessage::GameStart {
                    timestamp: 0,
                    message: "game started".into(),
                },
            )
            .await;
    }

    async fn on_start_multiplayer_game(&mut self, room_id: &str) {
        self.start_match(room_id).await;
    }

    async fn start_match(&mut self, room_id: &str) {
        if let Err(e) = self.persistence.start_multiplayer_game(room_id).await {
            self.registry
                .broadcast_room(room_id, ServerMessage::Error { error: e.to_string() })
                .await;
            return;
        }
        let room = match self.persistence.get_room(room_id).await {
            Ok(room) => room,
            Err(e) => {
                log::warn!("[hub] get_room after start failed: {e}");
                return;
            }
        };
        let users: Vec<UserId> = room.members.iter().map(|m| m.user).collect();
        let handle = runner::spawn(
            room_id.to_string(),
            room.starting_level(),
            users,
            self.registry.clone(),
            self.match_ended_tx.clone(),
        );
        self.runners.insert(room_id.to_string(), handle);
        self.registry
            .broadcast_room(
                room_id,
                ServerMessage::MultiplayerGameStarted {
                    starting_level: room.starting_level(),
                    message: "multiplayer game started".into(),
                },
            )
            .await;
    }

    async fn on_game_input(&mut self, room_id: &str, user: UserId, action: &str) {
        let Some(runner) = self.runners.get(room_id) else {
            log::warn!("[hub] game_input for room {room_id} with no active runner");
            return;
        };
        let Some(parsed) = roomhub_engine::Action::parse(action) else {
            return;
        };
        let snapshot = {
            let mut games = runner.games.lock().await;
            let Some(game) = games.get_mut(&user) else {
                log::warn!("[hub] game_input for unknown player {user} in room {room_id}");
                return;
            };
            game.handle_input(parsed);
            game.snapshot()
        };
        self.registry
            .broadcast_room(
                room_id,
                ServerMessage::PlayerGameState { user_id: user, state: snapshot },
            )
            .await;
    }

    async fn on_game_state(&mut self, room_id: &str, user: UserId, state_blob: &str, score: u64) {
        if let Err(e) = self
            .persistence
            .update_player_game_state(room_id, user, state_blob, score)
            .await
        {
            log::warn!("[hub] update_player_game_state failed: {e}");
        }
        self.registry
            .broadcast_room(room_id, ServerMessage::PlayerUpdate { user_id: user, score })
            .await;
    }

    async fn on_player_finished(&mut self, room_id: &str, user: UserId, score: u64, _lines: u32) {
        let position = self
            .persistence
            .calculate_player_position(room_id, score)
            .await
            .unwrap_or(roomhub_core::ABANDONED_POSITION);
        if let Err(e) = self
            .persistence
            .finish_player_game(room_id, user, score, position)
            .await
        {
            log::warn!("[hub] finish_player_game failed: {e}");
        }
        let player_name = self
            .persistence
            .get_username_by_id(user)
            .await
            .unwrap_or_else(|_| format!("player-{user}"));
        self.registry
            .broadcast_room(
                room_id,
                ServerMessage::PlayerFinished { player_name, score, lines: _lines, position },
            )
            .await;
        self.check_match_completion(room_id).await;
    }

    async fn check_match_completion(&mut self, room_id: &str) {
        let Ok(total) = self.persistence.get_room_players(room_id).await else {
            return;
        };
        let finished = self
            .persistence
            .get_finished_player_count(room_id)
            .await
            .unwrap_or(0);
        if finished >= total.len() && !total.is_empty() {
            self.complete_match(room_id, RoomStatus::Completed).await;
        }
    }

    /// Runner observed a player enter game-over: per §4.5, the first-out
    /// rule ends the match for the whole room, not just that player. Every
    /// player still in the runner's map is finished here, ranked by score
    /// regardless of who actually topped out.
    async fn on_match_ended(&mut self, room_id: RoomId) {
        let Some(runner) = self.runners.remove(&room_id) else {
            return;
        };
        let mut standings: Vec<(UserId, u64)> = {
            let games = runner.games.lock().await;
            games.iter().map(|(&user, game)| (user, game.score())).collect()
        };
        standings.sort_by(|a, b| b.1.cmp(&a.1));

        for (position, (user, score)) in standings.into_iter().enumerate() {
            let position = position as u32 + 1;
            if let Err(e) = self
                .persistence
                .finish_player_game(&room_id, user, score, position)
                .await
            {
                log::warn!("[hub] finish_player_game during match-end failed: {e}");
            }
            let player_name = self
                .persistence
                .get_username_by_id(user)
                .await
                .unwrap_or_else(|_| format!("player-{user}"));
            self.registry
                .broadcast_room(
                    &room_id,
                    ServerMessage::PlayerFinished { player_name, score, lines: 0, position },
                )
                .await;
        }

        self.complete_match(&room_id, RoomStatus::Completed).await;
    }

    async fn complete_match(&mut self, room_id: &str, status: RoomStatus) {
        self.runners.remove(room_id);
        if let Err(e) = self.persistence.update_room_status(room_id, status).await {
            log::warn!("[hub] update_room_status(completed) failed: {e}");
        }
        let results = self
            .persistence
            .get_game_results(room_id)
            .await
            .unwrap_or_default()
            .into_iter()
            .map(crate::protocol::Standing::from)
            .collect();
        self.registry
            .broadcast_room(room_id, ServerMessage::GameComplete { results })
            .await;
        self.registry
            .broadcast_room(
                room_id,
                ServerMessage::MultiplayerGameEnded {
                    message: "multiplayer game ended".into(),
                },
            )
            .await;
    }

    async fn on_spectate_request(&mut self, room_id: &str, requester: UserId) {
        let Some(runner) = self.runners.get(room_id) else {
            self.registry
                .send_to_user(
                    room_id,
                    requester,
                    ServerMessage::SpectateError { error: "room is not active".into() },
                )
                .await;
            return;
        };
        let players = {
            let games = runner.games.lock().await;
            games.iter().map(|(&u, g)| (u, g.snapshot())).collect()
        };
        self.registry
            .send_to_user(room_id, requester, ServerMessage::SpectateData { players })
            .await;
    }

    async fn on_disconnect(&mut self, session: SessionId) {
        let Some(handle) = self.registry.session(session).await else {
            return;
        };
        let room_id = handle.room_id().clone();
        let user = handle.user();
        self.registry.remove(session).await;

        let active_match = self.runners.contains_key(&room_id);
        if !active_match {
            if let Err(e) = self
                .persistence
                .update_player_status(&room_id, user, MemberStatus::Disconnected)
                .await
            {
                log::warn!("[hub] update_player_status failed: {e}");
            }
            let update = self.room_update(&room_id).await;
            self.registry.broadcast_room(&room_id, update).await;
            return;
        }

        if let Err(e) = self
            .persistence
            .update_player_status(&room_id, user, MemberStatus::Disconnected)
            .await
        {
            log::warn!("[hub] update_player_status failed: {e}");
        }
        let player_name = self
            .persistence
            .get_username_by_id(user)
            .await
            .unwrap_or_else(|_| format!("player-{user}"));
        self.registry
            .broadcast_room(
                &room_id,
                ServerMessage::PlayerDisconnected {
                    player_name: player_name.clone(),
                    message: "player disconnected".into(),
                },
            )
            .await;
        if let Some(runner) = self.runners.remove(&room_id) {
            runner.stop();
        }
        self.registry
            .broadcast_room(
                &room_id,
                ServerMessage::MatchEnded {
                    reason: "player_disconnected".into(),
                    player_name,
                    message: "match ended".into(),
                },
            )
            .await;
        if let Err(e) = self
            .persistence
            .update_room_status(&room_id, RoomStatus::Finished)
            .await
        {
            log::warn!("[hub] update_room_status(finished) failed: {e}");
        }
    }

    async fn on_cleanup_tick(&mut self) {
        match self.persistence.cleanup_inactive_rooms(IDLE_ROOM_AGE).await {
            Ok(removed) if !removed.is_empty() => {
                for room_id in &removed {
                    self.registry
                        .broadcast_room(
                            room_id,
                            ServerMessage::RoomClosed { reason: "inactive_cleanup".into() },
                        )
                        .await;
                    for session in self.registry.sessions_in(room_id).await {
                        self.registry.remove(session).await;
                    }
                }
                self.registry
                    .broadcast_all(ServerMessage::RoomsUpdated {
                        removed_rooms: removed,
                        reason: "inactive_cleanup".into(),
                    })
                    .await;
            }
            Ok(_) => {}
            Err(e) => log::warn!("[hub] cleanup_inactive_rooms failed: {e}"),
        }
    }
}

fn status_str(status: RoomStatus) -> &'static str {
    match status {
        RoomStatus::Waiting => "waiting",
        RoomStatus::Active => "active",
        RoomStatus::Completed => "completed",
        RoomStatus::Finished => "finished",
    }
}

fn member_status_str(status: MemberStatus) -> &'static str {
    match status {
        MemberStatus::Joined => "joined",
        MemberStatus::Active => "active",
        MemberStatus::Disconnected => "disconnected",
        MemberStatus::Finished => "finished",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roomhub_db::MemoryPersistence;
    use std::time::SystemTime;

    fn sample_room(id: &str, members: Vec<(UserId, bool)>) -> roomhub_db::Room {
        roomhub_db::Room {
            id: id.to_string(),
            name: "room".into(),
            game_type: "tetris".into(),
            max_players: 2,
            creator: members.first().map(|m| m.0).unwrap_or(1),
            settings: Default::default(),
            created_at: SystemTime::now(),
            status: RoomStatus::Waiting,
            members: members
                .into_iter()
                .map(|(user, ready)| roomhub_db::RoomMember {
                    user,
                    display_name: format!("user-{user}"),
                    is_ready: ready,
                    status: MemberStatus::Joined,
                    score: 0,
                    position: None,
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn player_ready_does_not_start_with_one_member() {
        let db = Arc::new(MemoryPersistence::new());
        db.seed_room(sample_room("r1", vec![(1, false)])).await;
        let handle = spawn(db.clone());
        let (session, mut rx) = crate::session::channel(1, "r1".to_string());
        handle.register(session.clone()).await;
        handle.dispatch(Inbound {
            session: session.id(),
            room_id: "r1".into(),
            user: 1,
            message: ClientMessage::PlayerReady { ready: true },
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(db.get_room("r1").await.unwrap().status, RoomStatus::Waiting);
        while rx.try_recv().is_ok() {}
    }

    #[tokio::test]
    async fn player_ready_starts_match_once_all_ready() {
        let db = Arc::new(MemoryPersistence::new());
        db.seed_room(sample_room("r1", vec![(1, true), (2, false)])).await;
        let handle = spawn(db.clone());
        let (s1, _rx1) = crate::session::channel(1, "r1".to_string());
        let (s2, _rx2) = crate::session::channel(2, "r1".to_string());
        handle.register(s1.clone()).await;
        handle.register(s2.clone()).await;
        handle.dispatch(Inbound {
            session: s2.id(),
            room_id: "r1".into(),
            user: 2,
            message: ClientMessage::PlayerReady { ready: true },
        });
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(db.get_room("r1").await.unwrap().status, RoomStatus::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_room_cleanup_evicts_registered_sessions() {
        let db = Arc::new(MemoryPersistence::new());
        let mut room = sample_room("r1", vec![(1, false)]);
        room.created_at = SystemTime::now() - roomhub_core::IDLE_ROOM_AGE - Duration::from_secs(1);
        db.seed_room(room).await;
        let handle = spawn(db.clone());
        let (session, _rx) = crate::session::channel(1, "r1".to_string());
        handle.register(session.clone()).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(handle.registry.room_size("r1").await, 1);

        tokio::time::advance(roomhub_core::CLEANUP_SCAN_INTERVAL + Duration::from_millis(10)).await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(handle.registry.room_size("r1").await, 0);
        assert!(db.get_room("r1").await.is_err());
    }

    #[tokio::test]
    async fn set_level_broadcasts_level_changed_not_player_update() {
        let db = Arc::new(MemoryPersistence::new());
        db.seed_room(sample_room("r1", vec![(1, true)])).await;
        let handle = spawn(db.clone());
        let (session, mut rx) = crate::session::channel(1, "r1".to_string());
        handle.register(session.clone()).await;
        handle.dispatch(Inbound {
            session: session.id(),
            room_id: "r1".into(),
            user: 1,
            message: ClientMessage::SetLevel { level: 4 },
        });

        let mut saw_level_changed = false;
        for _ in 0..10 {
            tokio::time::sleep(Duration::from_millis(5)).await;
            while let Ok(msg) = rx.try_recv() {
                assert!(!matches!(msg, ServerMessage::PlayerUpdate { .. }));
                if let ServerMessage::LevelChanged { user_id, level } = msg {
                    assert_eq!(user_id, 1);
                    assert_eq!(level, 4);
                    saw_level_changed = true;
                }
            }
            if saw_level_changed {
                break;
            }
        }
        assert!(saw_level_changed, "expected a level_changed broadcast");
        assert_eq!(db.get_room("r1").await.unwrap().members[0].score, 0);
    }
}
