//! Connection Endpoint (C2): upgrades an inbound request on
//! `/ws/room/{room_id}` to a bidirectional frame stream, authenticates via
//! the `token` query parameter, and bridges the socket to the Hub through a
//! freshly minted [`roomhub::SessionHandle`].
use std::collections::HashMap;
use std::sync::Arc;

use actix_web::{HttpRequest, HttpResponse, Responder, web};
use futures::StreamExt;
use roomhub::{ClientMessage, HubHandle, Inbound, ServerMessage, SessionHandle};
use roomhub_auth::AuthPort;
use roomhub_core::{PING_INTERVAL, READ_DEADLINE, WRITE_DEADLINE};
use tokio::sync::mpsc;

pub async fn enter(
    hub: web::Data<HubHandle>,
    auth: web::Data<Arc<dyn AuthPort>>,
    path: web::Path<String>,
    query: web::Query<HashMap<String, String>>,
    body: web::Payload,
    req: HttpRequest,
) -> impl Responder {
    let room_id = path.into_inner();
    let Some(token) = query.get("token") else {
        log::info!("[ws] rejected connection to {room_id}: missing token");
        return HttpResponse::Unauthorized()
            .body("missing token")
            .map_into_right_body();
    };
    let user = match auth.authenticate(token).await {
        Ok(user) => user,
        Err(e) => {
            log::info!("[ws] rejected connection to {room_id}: {e}");
            return HttpResponse::Unauthorized()
                .body(e.to_string())
                .map_into_right_body();
        }
    };

    match actix_ws::handle(&req, body) {
        Ok((response, session, stream)) => {
            let (handle, outbound) = roomhub::channel(user, room_id.clone());
            hub.register(handle.clone()).await;
            let _ = handle.send(ServerMessage::Connected { user_id: user, room_id });
            tokio::spawn(bridge(handle, outbound, session, stream, hub.get_ref().clone()));
            response.map_into_left_body()
        }
        Err(e) => HttpResponse::InternalServerError()
            .body(e.to_string())
            .map_into_right_body(),
    }
}

async fn bridge(
    handle: SessionHandle,
    mut outbound: mpsc::Receiver<ServerMessage>,
    mut session: actix_ws::Session,
    mut stream: actix_ws::MessageStream,
    hub: HubHandle,
) {
    let mut read_deadline = Box::pin(tokio::time::sleep(READ_DEADLINE));
    let mut ping_ticker = tokio::time::interval(PING_INTERVAL);

    loop {
        tokio::select! {
            biased;
            msg = outbound.recv() => match msg {
                Some(message) => {
                    if write(&mut session, message.to_json()).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            frame = stream.next() => match frame {
                Some(Ok(actix_ws::Message::Text(text))) => {
                    read_deadline.as_mut().reset(tokio::time::Instant::now() + READ_DEADLINE);
                    dispatch(&hub, &handle, text.as_bytes());
                }
                Some(Ok(actix_ws::Message::Ping(bytes))) => {
                    read_deadline.as_mut().reset(tokio::time::Instant::now() + READ_DEADLINE);
                    if session.pong(&bytes).await.is_err() {
                        break;
                    }
                }
                Some(Ok(actix_ws::Message::Pong(_))) => {
                    read_deadline.as_mut().reset(tokio::time::Instant::now() + READ_DEADLINE);
                }
                Some(Ok(actix_ws::Message::Close(_))) | Some(Err(_)) | None => break,
                _ => continue,
            },
            _ = ping_ticker.tick() => {
                if session.ping(b"").await.is_err() {
                    break;
                }
            }
            () = &mut read_deadline => {
                log::info!("[ws] read deadline expired for user {}", handle.user());
                break;
            }
        }
    }
    hub.unregister(handle.id());
    log::debug!("[ws] session {} closed", handle.id());
}

async fn write(session: &mut actix_ws::Session, text: String) -> Result<(), actix_ws::Closed> {
    match tokio::time::timeout(WRITE_DEADLINE, session.text(text)).await {
        Ok(result) => result,
        Err(_) => Err(actix_ws::Closed),
    }
}

fn dispatch(hub: &HubHandle, handle: &SessionHandle, frame: &[u8]) {
    match ClientMessage::decode(frame) {
        Ok(message) => hub.dispatch(Inbound {
            session: handle.id(),
            room_id: handle.room_id().clone(),
            user: handle.user(),
            message,
        }),
        Err(e) => log::warn!("[ws] dropping malformed message from {}: {}", handle.user(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;
    use actix_web::{App, test};
    use roomhub_auth::StaticAuthPort;
    use roomhub_db::MemoryPersistence;

    #[actix_web::test]
    async fn missing_token_is_rejected_before_registration() {
        let auth: Arc<dyn AuthPort> = Arc::new(StaticAuthPort::new());
        let hub = roomhub::spawn(Arc::new(MemoryPersistence::new()));
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(auth))
                .app_data(web::Data::new(hub.clone()))
                .route("/ws/room/{room_id}", web::get().to(enter)),
        )
        .await;

        let req = test::TestRequest::get().uri("/ws/room/r1").to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(hub.registry.room_size("r1").await, 0);
    }
}
