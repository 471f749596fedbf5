//! In-memory index of live sessions and rooms (C4). Mutated only by the Hub;
//! read under a reader lock by broadcast helpers, matching §5's "Room
//! Registry is the only cross-task shared structure."
use std::collections::{HashMap, HashSet};

use roomhub_db::RoomId;
use tokio::sync::RwLock;

use crate::protocol::ServerMessage;
use crate::session::{SessionHandle, SessionId, UserId};

#[derive(Default)]
pub struct Registry {
    sessions: RwLock<HashMap<SessionId, SessionHandle>>,
    rooms: RwLock<HashMap<RoomId, HashSet<SessionId>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, session: SessionHandle) {
        let id = session.id();
        let room = session.room_id().clone();
        self.sessions.write().await.insert(id, session);
        self.rooms.write().await.entry(room).or_default().insert(id);
    }

    /// Removes a session from both indexes. Idempotent: removing an already
    /// absent session is a no-op, matching the Connection Endpoint's
    /// idempotent-closure requirement.
    pub async fn remove(&self, id: SessionId) {
        let Some(session) = self.sessions.write().await.remove(&id) else {
            return;
        };
        let mut rooms = self.rooms.write().await;
        if let Some(members) = rooms.get_mut(session.room_id()) {
            members.remove(&id);
            if members.is_empty() {
                rooms.remove(session.room_id());
            }
        }
    }

    pub async fn session(&self, id: SessionId) -> Option<SessionHandle> {
        self.sessions.read().await.get(&id).cloned()
    }

    pub async fn room_size(&self, room_id: &str) -> usize {
        self.rooms
            .read()
            .await
            .get(room_id)
            .map(HashSet::len)
            .unwrap_or(0)
    }

    pub async fn room_ids(&self) -> Vec<RoomId> {
        self.rooms.read().await.keys().cloned().collect()
    }

    /// All session ids currently indexed under `room_id`, for callers that
    /// need to evict them individually (e.g. closing out an idle room).
    pub async fn sessions_in(&self, room_id: &str) -> Vec<SessionId> {
        self.rooms
            .read()
            .await
            .get(room_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Sends `msg` to every session currently in `room_id`. Sessions whose
    /// outbound queue is full are evicted on the spot — broadcast never
    /// blocks on a slow reader.
    pub async fn broadcast_room(&self, room_id: &str, msg: ServerMessage) {
        let targets: Vec<SessionId> = self
            .rooms
            .read()
            .await
            .get(room_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        let mut stuck = Vec::new();
        {
            let sessions = self.sessions.read().await;
            for id in targets {
                if let Some(session) = sessions.get(&id)
                    && session.send(msg.clone()).is_err()
                {
                    stuck.push(id);
                }
            }
        }
        for id in stuck {
            log::warn!("[registry] evicting stuck session {id}");
            self.remove(id).await;
        }
    }

    pub async fn broadcast_all(&self, msg: ServerMessage) {
        let targets: Vec<SessionId> = self.sessions.read().await.keys().copied().collect();
        let mut stuck = Vec::new();
        {
            let sessions = self.sessions.read().await;
            for id in targets {
                if let Some(session) = sessions.get(&id)
                    && session.send(msg.clone()).is_err()
                {
                    stuck.push(id);
                }
            }
        }
        for id in stuck {
            self.remove(id).await;
        }
    }

    /// Delivers to the first live session belonging to `user`, if any.
    pub async fn send_to_user(&self, room_id: &str, user: UserId, msg: ServerMessage) {
        let target = {
            let rooms = self.rooms.read().await;
            let sessions = self.sessions.read().await;
            rooms.get(room_id).and_then(|set| {
                set.iter()
                    .find(|id| sessions.get(id).map(|s| s.user() == user).unwrap_or(false))
                    .copied()
            })
        };
        if let Some(id) = target {
            let stuck = {
                let sessions = self.sessions.read().await;
                sessions
                    .get(&id)
                    .map(|s| s.send(msg).is_err())
                    .unwrap_or(false)
            };
            if stuck {
                self.remove(id).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::channel;

    #[tokio::test]
    async fn add_then_remove_clears_both_indexes() {
        let registry = Registry::new();
        let (handle, _rx) = channel(1, "r1".to_string());
        let id = handle.id();
        registry.add(handle).await;
        assert_eq!(registry.room_size("r1").await, 1);
        registry.remove(id).await;
        assert_eq!(registry.room_size("r1").await, 0);
        assert!(registry.session(id).await.is_none());
    }

    #[tokio::test]
    async fn broadcast_room_reaches_every_member_but_not_other_rooms() {
        let registry = Registry::new();
        let (a, mut a_rx) = channel(1, "r1".to_string());
        let (b, mut b_rx) = channel(2, "r1".to_string());
        let (c, mut c_rx) = channel(3, "r2".to_string());
        registry.add(a).await;
        registry.add(b).await;
        registry.add(c).await;

        registry
            .broadcast_room("r1", ServerMessage::Error { error: "hi".into() })
            .await;

        assert!(a_rx.try_recv().is_ok());
        assert!(b_rx.try_recv().is_ok());
        assert!(c_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let registry = Registry::new();
        let (handle, _rx) = channel(1, "r1".to_string());
        let id = handle.id();
        registry.add(handle).await;
        registry.remove(id).await;
        registry.remove(id).await;
    }
}
