//! Postgres-backed [`PersistencePort`], available behind the `postgres`
//! feature. Plain parameterized SQL through `tokio_postgres`, implemented
//! directly on `Arc<Client>` the same way the teacher repo's history and
//! auth repositories are — not the binary `COPY` bulk-loading machinery,
//! which has no counterpart in this row-at-a-time workload.
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use roomhub_auth::UserId;
use tokio_postgres::Client;

use crate::port::{PersistenceError, PersistencePort, PersistenceResult};
use crate::records::{MemberStatus, Room, RoomId, RoomMember, RoomStatus, SettingValue, Standing};

pub const ROOMS: &str = "rooms";
pub const ROOM_MEMBERS: &str = "room_members";
pub const ROOM_SETTINGS: &str = "room_settings";

fn member_status_to_str(status: MemberStatus) -> &'static str {
    match status {
        MemberStatus::Joined => "joined",
        MemberStatus::Active => "active",
        MemberStatus::Disconnected => "disconnected",
        MemberStatus::Finished => "finished",
    }
}

fn member_status_from_str(s: &str) -> MemberStatus {
    match s {
        "active" => MemberStatus::Active,
        "disconnected" => MemberStatus::Disconnected,
        "finished" => MemberStatus::Finished,
        _ => MemberStatus::Joined,
    }
}

fn room_status_to_str(status: RoomStatus) -> &'static str {
    match status {
        RoomStatus::Waiting => "waiting",
        RoomStatus::Active => "active",
        RoomStatus::Completed => "completed",
        RoomStatus::Finished => "finished",
    }
}

fn room_status_from_str(s: &str) -> RoomStatus {
    match s {
        "active" => RoomStatus::Active,
        "completed" => RoomStatus::Completed,
        "finished" => RoomStatus::Finished,
        _ => RoomStatus::Waiting,
    }
}

fn pg_err(e: tokio_postgres::Error) -> PersistenceError {
    PersistenceError::Backend(e.to_string())
}

/// Thin wrapper so `PgPersistence` can carry its own connection without
/// colliding with `impl PersistencePort for Arc<Client>` elsewhere in the
/// crate graph.
pub struct PgPersistence {
    client: Arc<Client>,
}

impl PgPersistence {
    pub fn new(client: Arc<Client>) -> Self {
        Self { client }
    }

    async fn load_members(&self, room_id: &str) -> Result<Vec<RoomMember>, tokio_postgres::Error> {
        let rows = self
            .client
            .query(
                const_format::concatcp!(
                    "SELECT user_id, display_name, is_ready, status, score, position FROM ",
                    ROOM_MEMBERS,
                    " WHERE room_id = $1"
                ),
                &[&room_id],
            )
            .await?;
        Ok(rows
            .iter()
            .map(|row| RoomMember {
                user: row.get::<_, i64>(0),
                display_name: row.get(1),
                is_ready: row.get(2),
                status: member_status_from_str(row.get::<_, &str>(3)),
                score: row.get::<_, i64>(4) as u64,
                position: row.get::<_, Option<i32>>(5).map(|p| p as u32),
            })
            .collect())
    }

    /// Only integer-valued settings round-trip today (`starting_level` is
    /// the sole consumer). Text settings are a real variant of
    /// [`SettingValue`] but have no column here yet; `update_room_settings`
    /// skips them rather than silently dropping data of a type it claims to
    /// store.
    async fn load_settings(
        &self,
        room_id: &str,
    ) -> Result<BTreeMap<String, SettingValue>, tokio_postgres::Error> {
        let rows = self
            .client
            .query(
                const_format::concatcp!(
                    "SELECT key, value FROM ",
                    ROOM_SETTINGS,
                    " WHERE room_id = $1"
                ),
                &[&room_id],
            )
            .await?;
        Ok(rows
            .iter()
            .map(|row| {
                (
                    row.get::<_, String>(0),
                    SettingValue::Int(row.get::<_, i64>(1)),
                )
            })
            .collect())
    }
}

#[async_trait::async_trait]
impl PersistencePort for PgPersistence {
    async fn get_room(&self, room_id: &str) -> PersistenceResult<Room> {
        let row = self
            .client
            .query_opt(
                const_format::concatcp!(
                    "SELECT id, name, game_type, max_players, creator, created_at, status FROM ",
                    ROOMS,
                    " WHERE id = $1"
                ),
                &[&room_id],
            )
            .await
            .map_err(pg_err)?
            .ok_or(PersistenceError::NotFound)?;
        let members = self.load_members(room_id).await.map_err(pg_err)?;
        let settings = self.load_settings(room_id).await.map_err(pg_err)?;
        Ok(Room {
            id: row.get(0),
            name: row.get(1),
            game_type: row.get(2),
            max_players: row.get::<_, i32>(3) as usize,
            creator: row.get(4),
            settings,
            created_at: row.get::<_, std::time::SystemTime>(5),
            status: room_status_from_str(row.get::<_, &str>(6)),
            members,
        })
    }

    async fn update_player_ready(
        &self,
        room_id: &str,
        user: UserId,
        ready: bool,
    ) -> PersistenceResult<()> {
        self.client
            .execute(
                const_format::concatcp!(
                    "UPDATE ",
                    ROOM_MEMBERS,
                    " SET is_ready = $1 WHERE room_id = $2 AND user_id = $3"
                ),
                &[&ready, &room_id, &user],
            )
            .await
            .map_err(pg_err)
            .map(|_| ())
    }

    async fn update_player_status(
        &self,
        room_id: &str,
        user: UserId,
        status: MemberStatus,
    ) -> PersistenceResult<()> {
        self.client
            .execute(
                const_format::concatcp!(
                    "UPDATE ",
                    ROOM_MEMBERS,
                    " SET status = $1 WHERE room_id = $2 AND user_id = $3"
                ),
                &[&member_status_to_str(status), &room_id, &user],
            )
            .await
            .map_err(pg_err)
            .map(|_| ())
    }

    async fn update_player_game_state(
        &self,
        room_id: &str,
        user: UserId,
        _state_blob: &str,
        score: u64,
    ) -> PersistenceResult<()> {
        // No column for the blob yet; only score is authoritative on this
        // adapter's schema today.
        self.client
            .execute(
                const_format::concatcp!(
                    "UPDATE ",
                    ROOM_MEMBERS,
                    " SET score = $1 WHERE room_id = $2 AND user_id = $3"
                ),
                &[&(score as i64), &room_id, &user],
            )
            .await
            .map_err(pg_err)
            .map(|_| ())
    }

    async fn update_room_status(&self, room_id: &str, status: RoomStatus) -> PersistenceResult<()> {
        self.client
            .execute(
                const_format::concatcp!("UPDATE ", ROOMS, " SET status = $1 WHERE id = $2"),
                &[&room_status_to_str(status), &room_id],
            )
            .await
            .map_err(pg_err)
            .map(|_| ())
    }

    async fn update_room_settings(
        &self,
        room_id: &str,
        settings: Vec<(String, SettingValue)>,
    ) -> PersistenceResult<()> {
        for (key, value) in settings {
            let SettingValue::Int(value) = value else {
                log::warn!("[pg] skipping non-integer room setting {key}: no column for it yet");
                continue;
            };
            self.client
                .execute(
                    const_format::concatcp!(
                        "INSERT INTO ",
                        ROOM_SETTINGS,
                        " (room_id, key, value) VALUES ($1, $2, $3) ",
                        "ON CONFLICT (room_id, key) DO UPDATE SET value = excluded.value"
                    ),
                    &[&room_id, &key, &value],
                )
                .await
                .map_err(pg_err)?;
        }
        Ok(())
    }

    async fn start_multiplayer_game(&self, room_id: &str) -> PersistenceResult<()> {
        let room = self.get_room(room_id).await?;
        if room.status != RoomStatus::Waiting {
            return Err(PersistenceError::PreconditionFailed(
                "room is not waiting".into(),
            ));
        }
        if room.members.len() < roomhub_core::MIN_PLAYERS_TO_START {
            return Err(PersistenceError::PreconditionFailed(
                "not enough members".into(),
            ));
        }
        if !room.all_ready() {
            return Err(PersistenceError::PreconditionFailed(
                "not all members ready".into(),
            ));
        }
        self.update_room_status(room_id, RoomStatus::Active).await
    }

    async fn finish_player_game(
        &self,
        room_id: &str,
        user: UserId,
        score: u64,
        position: u32,
    ) -> PersistenceResult<()> {
        self.client
            .execute(
                const_format::concatcp!(
                    "UPDATE ",
                    ROOM_MEMBERS,
                    " SET score = $1, position = $2, status = 'finished' WHERE room_id = $3 AND user_id = $4"
                ),
                &[&(score as i64), &(position as i32), &room_id, &user],
            )
            .await
            .map_err(pg_err)
            .map(|_| ())
    }

    async fn calculate_player_position(&self, room_id: &str, score: u64) -> PersistenceResult<u32> {
        let row = self
            .client
            .query_one(
                const_format::concatcp!(
                    "SELECT count(*) FROM ",
                    ROOM_MEMBERS,
                    " WHERE room_id = $1 AND position IS NULL AND score > $2"
                ),
                &[&room_id, &(score as i64)],
            )
            .await
            .map_err(pg_err)?;
        Ok(row.get::<_, i64>(0) as u32 + 1)
    }

    async fn get_finished_player_count(&self, room_id: &str) -> PersistenceResult<usize> {
        let row = self
            .client
            .query_one(
                const_format::concatcp!(
                    "SELECT count(*) FROM ",
                    ROOM_MEMBERS,
                    " WHERE room_id = $1 AND status = 'finished'"
                ),
                &[&room_id],
            )
            .await
            .map_err(pg_err)?;
        Ok(row.get::<_, i64>(0) as usize)
    }

    async fn get_room_players(&self, room_id: &str) -> PersistenceResult<Vec<UserId>> {
        Ok(self
            .load_members(room_id)
            .await
            .map_err(pg_err)?
            .into_iter()
            .map(|m| m.user)
            .collect())
    }

    async fn get_game_results(&self, room_id: &str) -> PersistenceResult<Vec<Standing>> {
        let mut members = self.load_members(room_id).await.map_err(pg_err)?;
        members.sort_by_key(|m| m.position.unwrap_or(roomhub_core::ABANDONED_POSITION));
        Ok(members
            .into_iter()
            .map(|m| Standing {
                user: m.user,
                display_name: m.display_name,
                score: m.score,
                position: m.position.unwrap_or(roomhub_core::ABANDONED_POSITION),
            })
            .collect())
    }

    async fn get_username_by_id(&self, user: UserId) -> PersistenceResult<String> {
        self.client
            .query_opt("SELECT username FROM users WHERE id = $1", &[&user])
            .await
            .map_err(pg_err)?
            .map(|row| row.get(0))
            .ok_or(PersistenceError::NotFound)
    }

    async fn cleanup_inactive_rooms(&self, max_age: Duration) -> PersistenceResult<Vec<RoomId>> {
        let rows = self
            .client
            .query(
                const_format::concatcp!(
                    "DELETE FROM ",
                    ROOMS,
                    " WHERE status = 'waiting' AND created_at < now() - ($1 || ' seconds')::interval RETURNING id"
                ),
                &[&(max_age.as_secs() as f64)],
            )
            .await
            .map_err(pg_err)?;
        Ok(rows.iter().map(|row| row.get(0)).collect())
    }
}
