//! Real-time multiplayer coordination: wire protocol, client sessions, the
//! room registry, the Room Hub event loop, and the per-room Match Runner.
//! The Connection Endpoint (HTTP upgrade, read/write deadlines) lives in the
//! `roomhub-server` binary crate, which is the only consumer of this one.
mod hub;
mod protocol;
mod registry;
mod runner;
mod session;

pub use hub::{HubHandle, Inbound, spawn};
pub use protocol::{ClientMessage, Envelope, ProtocolError, ServerMessage, Standing};
pub use registry::Registry;
pub use session::{Session, SessionHandle, SessionId, SessionStuck, UserId, channel};
