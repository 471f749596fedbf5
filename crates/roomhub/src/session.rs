//! Per-connection actor (C3). A `Session` is exclusively owned by its
//! Connection Endpoint's reader/writer task pair; the Hub and Registry only
//! ever touch the cheap, cloneable [`SessionHandle`] half of it.
use roomhub_core::{ID, OUTBOUND_QUEUE_CAPACITY};
use roomhub_db::RoomId;
use tokio::sync::mpsc;

use crate::protocol::ServerMessage;

pub type UserId = roomhub_auth::UserId;

/// Marker type for [`ID<Session>`] — arena-style identity, never constructed.
pub struct Session;

pub type SessionId = ID<Session>;

/// Raised when a session's outbound queue could not accept a message. The
/// caller's policy (see [`crate::registry::Registry::broadcast_room`]) is to
/// evict the session, never to block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStuck;

/// The Hub/Registry-facing half of a connection. Sending never blocks: a
/// full queue means the client isn't draining fast enough and the session
/// is evicted rather than letting a slow reader stall every other room.
#[derive(Clone)]
pub struct SessionHandle {
    id: SessionId,
    user: UserId,
    room_id: RoomId,
    outbound: mpsc::Sender<ServerMessage>,
}

impl SessionHandle {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn user(&self) -> UserId {
        self.user
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    pub fn send(&self, message: ServerMessage) -> Result<(), SessionStuck> {
        self.outbound.try_send(message).map_err(|_| SessionStuck)
    }
}

/// Constructs a handle plus the bounded receiver its writer loop drains.
/// Capacity is fixed at [`OUTBOUND_QUEUE_CAPACITY`]; this is the sole
/// backpressure boundary in the system.
pub fn channel(
    user: UserId,
    room_id: RoomId,
) -> (SessionHandle, mpsc::Receiver<ServerMessage>) {
    let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
    let handle = SessionHandle {
        id: ID::default(),
        user,
        room_id,
        outbound: tx,
    };
    (handle, rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_succeeds_while_queue_has_room() {
        let (handle, mut rx) = channel(1, "room1".to_string());
        assert!(handle.send(ServerMessage::Error { error: "x".into() }).is_ok());
        assert!(rx.recv().await.is_some());
    }

    #[test]
    fn overflow_reports_stuck_instead_of_blocking() {
        let (handle, _rx) = channel(1, "room1".to_string());
        for _ in 0..OUTBOUND_QUEUE_CAPACITY {
            handle
                .send(ServerMessage::Error { error: "x".into() })
                .unwrap();
        }
        assert_eq!(
            handle.send(ServerMessage::Error { error: "x".into() }),
            Err(SessionStuck)
        );
    }

    #[test]
    fn two_sessions_get_distinct_ids() {
        let (a, _) = channel(1, "r".to_string());
        let (b, _) = channel(1, "r".to_string());
        assert_ne!(a.id(), b.id());
    }
}
