use std::fmt;
use std::time::Duration;

use roomhub_auth::UserId;

use crate::records::{MemberStatus, Room, RoomId, RoomStatus, SettingValue, Standing};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistenceError {
    NotFound,
    PreconditionFailed(String),
    Backend(String),
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistenceError::NotFound => write!(f, "not found"),
            PersistenceError::PreconditionFailed(msg) => write!(f, "precondition failed: {msg}"),
            PersistenceError::Backend(msg) => write!(f, "persistence backend error: {msg}"),
        }
    }
}

impl std::error::Error for PersistenceError {}

pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// The narrow interface the Hub calls to read room metadata and persist
/// ready/score/status transitions. See SPEC_FULL.md §4.7.
///
/// Every operation that participates in a decision boundary (starting a
/// match, finishing a player) returns a `Result` the Hub must respect by
/// not advancing in-memory state on error. Operations that are pure
/// side-effect recording (score updates, settings writes) are still
/// fallible, but the Hub's policy (SPEC_FULL.md §7) is to log and continue
/// rather than roll back authoritative in-memory state.
#[async_trait::async_trait]
pub trait PersistencePort: Send + Sync {
    async fn get_room(&self, room_id: &str) -> PersistenceResult<Room>;
    async fn update_player_ready(
        &self,
        room_id: &str,
        user: UserId,
        ready: bool,
    ) -> PersistenceResult<()>;
    async fn update_player_status(
        &self,
        room_id: &str,
        user: UserId,
        status: MemberStatus,
    ) -> PersistenceResult<()>;
    async fn update_player_game_state(
        &self,
        room_id: &str,
        user: UserId,
        state_blob: &str,
        score: u64,
    ) -> PersistenceResult<()>;
    async fn update_room_status(&self, room_id: &str, status: RoomStatus) -> PersistenceResult<()>;
    async fn update_room_settings(
        &self,
        room_id: &str,
        settings: Vec<(String, SettingValue)>,
    ) -> PersistenceResult<()>;
    /// Atomically validates match-start preconditions (status = waiting,
    /// member count >= minimum, all ready) and transitions to `active`.
    async fn start_multiplayer_game(&self, room_id: &str) -> PersistenceResult<()>;
    async fn finish_player_game(
        &self,
        room_id: &str,
        user: UserId,
        score: u64,
        position: u32,
    ) -> PersistenceResult<()>;
    async fn calculate_player_position(&self, room_id: &str, score: u64) -> PersistenceResult<u32>;
    async fn get_finished_player_count(&self, room_id: &str) -> PersistenceResult<usize>;
    async fn get_room_players(&self, room_id: &str) -> PersistenceResult<Vec<UserId>>;
    async fn get_game_results(&self, room_id: &str) -> PersistenceResult<Vec<Standing>>;
    async fn get_username_by_id(&self, user: UserId) -> PersistenceResult<String>;
    async fn cleanup_inactive_rooms(&self, max_age: Duration) -> PersistenceResult<Vec<RoomId>>;
}
