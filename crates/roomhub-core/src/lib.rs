//! Core identifiers, traits, and timing constants shared across the room hub workspace.
#![allow(dead_code)]

// ============================================================================
// TRAITS
// ============================================================================
/// Unique identifier trait for domain entities.
pub trait Unique<T = Self> {
    fn id(&self) -> ID<T>;
}

// ============================================================================
// IDENTITY TYPES
// ============================================================================
use std::cmp::Ordering;
use std::fmt::Debug;
use std::fmt::Display;
use std::fmt::Formatter;
use std::hash::Hash;
use std::hash::Hasher;
use std::marker::PhantomData;

/// Generic ID wrapper providing compile-time type safety over uuid::Uuid.
pub struct ID<T> {
    inner: uuid::Uuid,
    marker: PhantomData<T>,
}

impl<T> ID<T> {
    pub fn inner(&self) -> uuid::Uuid {
        self.inner
    }
    /// Cast ID<T> to ID<U> while preserving the underlying UUID.
    pub fn cast<U>(self) -> ID<U> {
        ID {
            inner: self.inner,
            marker: PhantomData,
        }
    }
}

impl<T> From<ID<T>> for uuid::Uuid {
    fn from(id: ID<T>) -> Self {
        id.inner()
    }
}
impl<T> From<uuid::Uuid> for ID<T> {
    fn from(inner: uuid::Uuid) -> Self {
        Self {
            inner,
            marker: PhantomData,
        }
    }
}

impl<T> Default for ID<T> {
    fn default() -> Self {
        Self {
            inner: uuid::Uuid::now_v7(),
            marker: PhantomData,
        }
    }
}

impl<T> Copy for ID<T> {}
impl<T> Clone for ID<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Eq for ID<T> {}
impl<T> PartialEq for ID<T> {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}

impl<T> Ord for ID<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.inner.cmp(&other.inner)
    }
}
impl<T> PartialOrd for ID<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Hash for ID<T> {
    fn hash<H>(&self, state: &mut H)
    where
        H: Hasher,
    {
        self.inner.hash(state);
    }
}

impl<T> Debug for ID<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ID").field(&self.inner).finish()
    }
}
impl<T> Display for ID<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.inner, f)
    }
}

// ============================================================================
// CONCURRENCY / TIMING CONSTANTS (see SPEC_FULL.md §5)
// ============================================================================
use std::time::Duration;

/// A session is considered dead if no readable data (including a pong) arrives
/// within this window.
pub const READ_DEADLINE: Duration = Duration::from_secs(60);
/// A single outbound frame (including a ping) must be written within this window.
pub const WRITE_DEADLINE: Duration = Duration::from_secs(10);
/// Interval between server-initiated pings on an idle connection.
pub const PING_INTERVAL: Duration = Duration::from_secs(54);
/// A `waiting` room older than this is eligible for idle cleanup.
pub const IDLE_ROOM_AGE: Duration = Duration::from_secs(5 * 60);
/// Legacy reconnect grace window; only consulted when no Match Runner owns the room.
pub const DISCONNECT_GRACE: Duration = Duration::from_secs(30);
/// Interval between idle-room cleanup sweeps.
pub const CLEANUP_SCAN_INTERVAL: Duration = Duration::from_secs(60);
/// Match Runner tick rate (20 Hz).
pub const TICK_INTERVAL: Duration = Duration::from_millis(50);
/// Maximum bytes accepted for a single inbound frame.
pub const MAX_FRAME_BYTES: usize = 512;
/// Capacity of a Session's outbound queue before it is considered stuck.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 256;
/// Minimum members required before a room can auto-start.
pub const MIN_PLAYERS_TO_START: usize = 2;
/// Maximum members a room accepts (tetris is in scope at 2).
pub const MAX_PLAYERS_PER_ROOM: usize = 2;
/// Finishing-position sentinel for a player who abandoned or disconnected.
pub const ABANDONED_POSITION: u32 = 999;

// ============================================================================
// RUNTIME UTILITIES
// ============================================================================
/// Initialize dual logging (terminal + file) with timestamped log files.
#[cfg(feature = "server")]
pub fn log() {
    std::fs::create_dir_all("logs").expect("create logs directory");
    let config = simplelog::ConfigBuilder::new()
        .set_location_level(log::LevelFilter::Off)
        .set_target_level(log::LevelFilter::Off)
        .set_thread_level(log::LevelFilter::Off)
        .build();
    let time = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("time moves slow")
        .as_secs();
    let file = simplelog::WriteLogger::new(
        log::LevelFilter::Debug,
        config.clone(),
        std::fs::File::create(format!("logs/{}.log", time)).expect("create log file"),
    );
    let term = simplelog::TermLogger::new(
        log::LevelFilter::Info,
        config.clone(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );
    simplelog::CombinedLogger::init(vec![term, file]).expect("initialize logger");
}

/// Register Ctrl+C handler for immediate (non-graceful) termination.
#[cfg(feature = "server")]
pub fn kys() {
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.unwrap();
        println!();
        log::warn!("interrupt received, shutting down");
        std::process::exit(0);
    });
}
