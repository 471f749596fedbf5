//! Connection Endpoint binary: reads configuration from the environment,
//! wires the Hub to a persistence backend, and serves the WebSocket upgrade
//! route.
pub mod connection;

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::middleware::Logger;
use actix_web::{App, HttpResponse, HttpServer, Responder, web};
use anyhow::Context;
use roomhub_auth::{AuthPort, StaticAuthPort};
use roomhub_db::{MemoryPersistence, PersistencePort};

async fn health() -> impl Responder {
    HttpResponse::Ok().body("ok")
}

/// Builds the `AuthPort` for this process. Production deployments supply
/// long-lived tokens out of band (`ROOMHUB_TOKENS=token:user,token:user`);
/// an empty table means every connection is rejected, which is the safe
/// default for an unconfigured environment.
fn auth_from_env() -> Arc<dyn AuthPort> {
    let mut auth = StaticAuthPort::new();
    if let Ok(pairs) = std::env::var("ROOMHUB_TOKENS") {
        for pair in pairs.split(',').filter(|s| !s.is_empty()) {
            if let Some((token, user)) = pair.split_once(':')
                && let Ok(user) = user.parse()
            {
                auth = auth.with_token(token, user);
            }
        }
    }
    Arc::new(auth)
}

#[cfg(feature = "postgres")]
async fn persistence_from_env() -> Arc<dyn PersistencePort> {
    if std::env::var("DB_URL").is_ok() {
        let client = roomhub_db::connect().await;
        return Arc::new(roomhub_db::PgPersistence::new(client));
    }
    log::warn!("DB_URL not set, falling back to in-memory persistence");
    Arc::new(MemoryPersistence::new())
}

#[cfg(not(feature = "postgres"))]
async fn persistence_from_env() -> Arc<dyn PersistencePort> {
    Arc::new(MemoryPersistence::new())
}

#[rustfmt::skip]
pub async fn run() -> anyhow::Result<()> {
    roomhub_core::log();
    roomhub_core::kys();
    let auth = web::Data::new(auth_from_env());
    let persistence = persistence_from_env().await;
    let hub = web::Data::new(roomhub::spawn(persistence));
    let bind_addr = std::env::var("BIND_ADDR").context("BIND_ADDR must be set")?;
    log::info!("starting room hub server on {bind_addr}");
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::new("%r %s %Ts"))
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allow_any_method()
                    .allow_any_header(),
            )
            .app_data(auth.clone())
            .app_data(hub.clone())
            .route("/health", web::get().to(health))
            .route("/ws/room/{room_id}", web::get().to(connection::enter))
    })
    .workers(4)
    .bind(bind_addr)
    .context("failed to bind room hub server")?
    .run()
    .await
    .context("room hub server exited with an error")
}
