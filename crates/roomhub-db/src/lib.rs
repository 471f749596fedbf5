//! The narrow persistence interface the Room Hub calls, plus two
//! implementations: an always-available in-memory store and an optional
//! Postgres adapter.
//!
//! ## Implementations
//!
//! - [`MemoryPersistence`] — always available, used by every test.
//! - [`PgPersistence`] — behind the `postgres` feature; plain parameterized
//!   SQL over `tokio_postgres`, not the binary COPY-protocol machinery the
//!   wider ecosystem also shows for bulk analytical loads.
mod memory;
mod port;
mod records;

#[cfg(feature = "postgres")]
mod pg;

pub use memory::MemoryPersistence;
pub use port::{PersistenceError, PersistencePort, PersistenceResult};
pub use records::{
    DEFAULT_STARTING_LEVEL, MemberStatus, Room, RoomId, RoomMember, RoomStatus, STARTING_LEVEL_KEY,
    SettingValue, Standing,
};

#[cfg(feature = "postgres")]
pub use pg::PgPersistence;

/// Establishes a database connection from `DB_URL`. Panics if the variable
/// is unset or the connection fails — acceptable at a binary's startup
/// path, never inside library code.
#[cfg(feature = "postgres")]
pub async fn connect() -> std::sync::Arc<tokio_postgres::Client> {
    log::info!("connecting to database");
    let tls = tokio_postgres::tls::NoTls;
    let url = std::env::var("DB_URL").expect("DB_URL must be set");
    let (client, connection) = tokio_postgres::connect(&url, tls)
        .await
        .expect("database connection failed");
    tokio::spawn(connection);
    std::sync::Arc::new(client)
}
