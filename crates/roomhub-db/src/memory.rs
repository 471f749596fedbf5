use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use roomhub_auth::UserId;
use roomhub_core::MIN_PLAYERS_TO_START;
use tokio::sync::RwLock;

use crate::port::{PersistenceError, PersistencePort, PersistenceResult};
use crate::records::{MemberStatus, Room, RoomId, RoomMember, RoomStatus, SettingValue, Standing};

/// `RwLock`-guarded in-process store. Always available, used in every test
/// and as the default for a single-process deployment.
#[derive(Default)]
pub struct MemoryPersistence {
    rooms: RwLock<HashMap<RoomId, Room>>,
    usernames: RwLock<HashMap<UserId, String>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test/seeding helper: not part of the persistence contract, since room
    /// creation is an HTTP-endpoint concern out of scope for this crate.
    pub async fn seed_room(&self, room: Room) {
        self.rooms.write().await.insert(room.id.clone(), room);
    }

    pub async fn seed_username(&self, user: UserId, name: impl Into<String>) {
        self.usernames.write().await.insert(user, name.into());
    }
}

#[async_trait::async_trait]
impl PersistencePort for MemoryPersistence {
    async fn get_room(&self, room_id: &str) -> PersistenceResult<Room> {
        self.rooms
            .read()
            .await
            .get(room_id)
            .cloned()
            .ok_or(PersistenceError::NotFound)
    }

    async fn update_player_ready(
        &self,
        room_id: &str,
        user: UserId,
        ready: bool,
    ) -> PersistenceResult<()> {
        let mut rooms = self.rooms.write().await;
        let room = rooms.get_mut(room_id).ok_or(PersistenceError::NotFound)?;
        let member = room
            .member_mut(user)
            .ok_or(PersistenceError::NotFound)?;
        member.is_ready = ready;
        Ok(())
    }

    async fn update_player_status(
        &self,
        room_id: &str,
        user: UserId,
        status: MemberStatus,
    ) -> PersistenceResult<()> {
        let mut rooms = self.rooms.write().await;
        let room = rooms.get_mut(room_id).ok_or(PersistenceError::NotFound)?;
        let member = room
            .member_mut(user)
            .ok_or(PersistenceError::NotFound)?;
        member.status = status;
        Ok(())
    }

    async fn update_player_game_state(
        &self,
        room_id: &str,
        user: UserId,
        _state_blob: &str,
        score: u64,
    ) -> PersistenceResult<()> {
        let mut rooms = self.rooms.write().await;
        let room = rooms.get_mut(room_id).ok_or(PersistenceError::NotFound)?;
        let member = room
            .member_mut(user)
            .ok_or(PersistenceError::NotFound)?;
        member.score = score.max(member.score);
        Ok(())
    }

    async fn update_room_status(&self, room_id: &str, status: RoomStatus) -> PersistenceResult<()> {
        let mut rooms = self.rooms.write().await;
        let room = rooms.get_mut(room_id).ok_or(PersistenceError::NotFound)?;
        room.status = status;
        Ok(())
    }

    async fn update_room_settings(
        &self,
        room_id: &str,
        settings: Vec<(String, SettingValue)>,
    ) -> PersistenceResult<()> {
        let mut rooms = self.rooms.write().await;
        let room = rooms.get_mut(room_id).ok_or(PersistenceError::NotFound)?;
        for (k, v) in settings {
            room.settings.insert(k, v);
        }
        Ok(())
    }

    async fn start_multiplayer_game(&self, room_id: &str) -> PersistenceResult<()> {
        let mut rooms = self.rooms.write().await;
        let room = rooms.get_mut(room_id).ok_or(PersistenceError::NotFound)?;
        if room.status != RoomStatus::Waiting {
            return Err(PersistenceError::PreconditionFailed(
                "room is not waiting".into(),
            ));
        }
        if room.members.len() < MIN_PLAYERS_TO_START {
            return Err(PersistenceError::PreconditionFailed(
                "not enough members".into(),
            ));
        }
        if !room.all_ready() {
            return Err(PersistenceError::PreconditionFailed(
                "not all members ready".into(),
            ));
        }
        room.status = RoomStatus::Active;
        Ok(())
    }

    async fn finish_player_game(
        &self,
        room_id: &str,
        user: UserId,
        score: u64,
        position: u32,
    ) -> PersistenceResult<()> {
        let mut rooms = self.rooms.write().await;
        let room = rooms.get_mut(room_id).ok_or(PersistenceError::NotFound)?;
        let member = room
            .member_mut(user)
            .ok_or(PersistenceError::NotFound)?;
        member.score = score;
        member.position = Some(position);
        member.status = MemberStatus::Finished;
        Ok(())
    }

    async fn calculate_player_position(&self, room_id: &str, score: u64) -> PersistenceResult<u32> {
        let rooms = self.rooms.read().await;
        let room = rooms.get(room_id).ok_or(PersistenceError::NotFound)?;
        let better = room
            .members
            .iter()
            .filter(|m| m.position.is_none() && m.score > score)
            .count();
        Ok(better as u32 + 1)
    }

    async fn get_finished_player_count(&self, room_id: &str) -> PersistenceResult<usize> {
        let rooms = self.rooms.read().await;
        let room = rooms.get(room_id).ok_or(PersistenceError::NotFound)?;
        Ok(room
            .members
            .iter()
            .filter(|m| m.status == MemberStatus::Finished)
            .count())
    }

    async fn get_room_players(&self, room_id: &str) -> PersistenceResult<Vec<UserId>> {
        let rooms = self.rooms.read().await;
        let room = rooms.get(room_id).ok_or(PersistenceError::NotFound)?;
        Ok(room.members.iter().map(|m| m.user).collect())
    }

    async fn get_game_results(&self, room_id: &str) -> PersistenceResult<Vec<Standing>> {
        let rooms = self.rooms.read().await;
        let room = rooms.get(room_id).ok_or(PersistenceError::NotFound)?;
        let mut standings: Vec<Standing> = room
            .members
            .iter()
            .map(|m| Standing {
                user: m.user,
                display_name: m.display_name.clone(),
                score: m.score,
                position: m.position.unwrap_or(roomhub_core::ABANDONED_POSITION),
            })
            .collect();
        standings.sort_by_key(|s| s.position);
        Ok(standings)
    }

    async fn get_username_by_id(&self, user: UserId) -> PersistenceResult<String> {
        self.usernames
            .read()
            .await
            .get(&user)
            .cloned()
            .ok_or(PersistenceError::NotFound)
    }

    async fn cleanup_inactive_rooms(&self, max_age: Duration) -> PersistenceResult<Vec<RoomId>> {
        let mut rooms = self.rooms.write().await;
        let now = SystemTime::now();
        let stale: Vec<RoomId> = rooms
            .values()
            .filter(|r| {
                r.status == RoomStatus::Waiting
                    && now
                        .duration_since(r.created_at)
                        .map(|age| age > max_age)
                        .unwrap_or(false)
            })
            .map(|r| r.id.clone())
            .collect();
        for id in &stale {
            rooms.remove(id);
        }
        Ok(stale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_room(id: &str, status: RoomStatus, members: Vec<RoomMember>) -> Room {
        Room {
            id: id.to_string(),
            name: "test room".to_string(),
            game_type: "tetris".to_string(),
            max_players: 2,
            creator: 1,
            settings: Default::default(),
            created_at: SystemTime::now(),
            status,
            members,
        }
    }

    fn member(user: UserId, ready: bool) -> RoomMember {
        RoomMember {
            user,
            display_name: format!("user-{user}"),
            is_ready: ready,
            status: MemberStatus::Joined,
            score: 0,
            position: None,
        }
    }

    #[tokio::test]
    async fn start_multiplayer_game_requires_two_ready_members() {
        let db = MemoryPersistence::new();
        db.seed_room(sample_room("r1", RoomStatus::Waiting, vec![member(1, true)]))
            .await;
        assert!(db.start_multiplayer_game("r1").await.is_err());

        db.seed_room(sample_room(
            "r2",
            RoomStatus::Waiting,
            vec![member(1, true), member(2, true)],
        ))
        .await;
        assert!(db.start_multiplayer_game("r2").await.is_ok());
        assert_eq!(db.get_room("r2").await.unwrap().status, RoomStatus::Active);
    }

    #[tokio::test]
    async fn start_multiplayer_game_rejects_unready_members() {
        let db = MemoryPersistence::new();
        db.seed_room(sample_room(
            "r1",
            RoomStatus::Waiting,
            vec![member(1, true), member(2, false)],
        ))
        .await;
        assert!(db.start_multiplayer_game("r1").await.is_err());
        assert_eq!(db.get_room("r1").await.unwrap().status, RoomStatus::Waiting);
    }

    #[tokio::test]
    async fn calculate_player_position_ranks_by_score_descending() {
        let db = MemoryPersistence::new();
        let mut low = member(2, true);
        low.score = 50;
        let mut high = member(1, true);
        high.score = 200;
        db.seed_room(sample_room("r1", RoomStatus::Active, vec![high, low]))
            .await;
        assert_eq!(db.calculate_player_position("r1", 300).await.unwrap(), 1);
        assert_eq!(db.calculate_player_position("r1", 100).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn cleanup_removes_only_stale_waiting_rooms() {
        let db = MemoryPersistence::new();
        let mut stale = sample_room("stale", RoomStatus::Waiting, vec![]);
        stale.created_at = SystemTime::now() - Duration::from_secs(600);
        db.seed_room(stale).await;
        db.seed_room(sample_room("fresh", RoomStatus::Waiting, vec![]))
            .await;
        let mut active = sample_room("active-old", RoomStatus::Active, vec![]);
        active.created_at = SystemTime::now() - Duration::from_secs(600);
        db.seed_room(active).await;

        let removed = db.cleanup_inactive_rooms(Duration::from_secs(300)).await.unwrap();
        assert_eq!(removed, vec!["stale".to_string()]);
        assert!(db.get_room("stale").await.is_err());
        assert!(db.get_room("fresh").await.is_ok());
        assert!(db.get_room("active-old").await.is_ok());
    }

    #[tokio::test]
    async fn get_game_results_sorts_by_position_with_abandonment_last() {
        let db = MemoryPersistence::new();
        let mut a = member(1, true);
        a.position = Some(2);
        a.score = 100;
        let mut b = member(2, true);
        b.position = Some(1);
        b.score = 500;
        let mut c = member(3, true);
        c.position = None;
        db.seed_room(sample_room("r1", RoomStatus::Completed, vec![a, b, c]))
            .await;
        let results = db.get_game_results("r1").await.unwrap();
        assert_eq!(results[0].user, 2);
        assert_eq!(results[1].user, 1);
        assert_eq!(results[2].position, roomhub_core::ABANDONED_POSITION);
    }
}
