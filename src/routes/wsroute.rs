//! WebSocket route: handshake authentication and the per-connection actor.
//!
//! The handshake fails closed: no credential, or a credential that does not
//! verify, refuses the connection before any session state exists. After
//! authentication the actor only parses frames and forwards them to the
//! transport-free handlers.

use crate::error::AppError;
use crate::middleware::auth::verify_credential;
use crate::session::ConnectionId;
use crate::state::AppState;
use crate::websocket::handlers;
use crate::websocket::message_types::{WsInboundEvent, WsOutboundEvent};
use actix::{Actor, ActorContext, AsyncContext, Handler, Message as ActixMessage, StreamHandler};
use actix_web::{get, web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use serde::Deserialize;
use std::time::{Duration, Instant};
use uuid::Uuid;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
}

/// Text pushed to this connection (broadcasts, error events).
#[derive(ActixMessage)]
#[rtype(result = "()")]
struct OutboundText(String);

pub struct WsSession {
    conn: ConnectionId,
    user_id: Uuid,
    state: AppState,
    hb: Instant,
}

impl WsSession {
    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.hb) > CLIENT_TIMEOUT {
                tracing::warn!(conn = %act.conn, "heartbeat timed out, disconnecting");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!(conn = %self.conn, user_id = %self.user_id, "websocket session started");
        self.hb(ctx);
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        tracing::info!(conn = %self.conn, user_id = %self.user_id, "websocket session stopped");
        let state = self.state.clone();
        let conn = self.conn;
        actix::spawn(async move {
            handlers::disconnect(&state, conn).await;
        });
    }
}

impl Handler<OutboundText> for WsSession {
    type Result = ();

    fn handle(&mut self, msg: OutboundText, ctx: &mut Self::Context) {
        ctx.text(msg.0);
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(payload)) => {
                self.hb = Instant::now();
                ctx.pong(&payload);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(text)) => match serde_json::from_str::<WsInboundEvent>(&text) {
                Ok(event) => {
                    let state = self.state.clone();
                    let conn = self.conn;
                    let user_id = self.user_id;
                    actix::spawn(async move {
                        if let Err(e) = handlers::handle_event(&state, conn, user_id, event).await {
                            tracing::debug!(%conn, %user_id, error = %e, "event rejected");
                            state
                                .registry
                                .send_to(
                                    conn,
                                    WsOutboundEvent::Error {
                                        message: e.to_string(),
                                    }
                                    .to_wire(),
                                )
                                .await;
                        }
                    });
                }
                Err(e) => {
                    tracing::warn!(conn = %self.conn, error = %e, "unparseable event");
                    ctx.text(
                        WsOutboundEvent::Error {
                            message: "malformed event".into(),
                        }
                        .to_wire(),
                    );
                }
            },
            Ok(ws::Message::Binary(_)) => {
                tracing::warn!(conn = %self.conn, "binary frames not supported");
            }
            Ok(ws::Message::Close(reason)) => {
                tracing::info!(conn = %self.conn, ?reason, "close frame received");
                ctx.stop();
            }
            _ => {}
        }
    }
}

/// Raw credential from connection metadata: `Authorization: Bearer`, the
/// `token` cookie, or a `token` query parameter.
fn extract_credential(req: &HttpRequest, params: &WsParams) -> Option<String> {
    req.headers()
        .get(actix_web::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::to_string)
        .or_else(|| req.cookie("token").map(|c| c.value().to_string()))
        .or_else(|| params.token.clone())
}

#[get("/ws")]
pub async fn ws_handler(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
    query: web::Query<WsParams>,
) -> Result<HttpResponse, Error> {
    let params = query.into_inner();

    let Some(token) = extract_credential(&req, &params) else {
        tracing::warn!("websocket connection refused: no credential");
        return Err(AppError::InvalidCredentialFormat.into());
    };

    let user_id = verify_credential(&token, &state.config.jwt_secret).map_err(|e| {
        tracing::warn!(error = %e, "websocket connection refused");
        Error::from(e)
    })?;

    let conn = ConnectionId::new();
    let session = WsSession {
        conn,
        user_id,
        state: state.as_ref().clone(),
        hb: Instant::now(),
    };
    let (addr, resp) = ws::WsResponseBuilder::new(session, &req, stream).start_with_addr()?;

    // Session state exists only once the upgrade succeeded; a refused
    // upgrade leaves nothing registered.
    let mut rx = handlers::handshake(&state, conn, user_id).await;

    // Bridge the registry's channel into the actor mailbox. Ends when the
    // registry drops the sender on disconnect.
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            addr.do_send(OutboundText(msg));
        }
    });

    Ok(resp)
}
