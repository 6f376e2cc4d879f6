use std::time::{Duration, Instant};

use actix::prelude::*;
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use log::{debug, warn};

use crate::app_state::AppState;
use crate::auth::AuthenticatedUser;
use crate::chat_server::{ChatServer, Connect, Disconnect, WsMessage};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

/// One live connection. Push-only: clients post through the REST endpoint.
pub struct WebSocketConnection {
    pub user_id: String,
    pub hb: Instant,
    pub server: Addr<ChatServer>,
}

impl WebSocketConnection {
    pub fn new(user_id: String, server: Addr<ChatServer>) -> Self {
        Self {
            user_id,
            hb: Instant::now(),
            server,
        }
    }

    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.hb) > CLIENT_TIMEOUT {
                warn!("WebSocket heartbeat failed for user {}, disconnecting", act.user_id);
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }
}

impl Actor for WebSocketConnection {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.hb(ctx);
        self.server
            .send(Connect {
                user_id: self.user_id.clone(),
                addr: ctx.address().recipient(),
            })
            .into_actor(self)
            .then(|res, act, ctx| {
                if res.is_err() {
                    warn!("User {} could not register with the chat server", act.user_id);
                    ctx.stop();
                }
                fut::ready(())
            })
            .wait(ctx);
    }

    fn stopped(&mut self, ctx: &mut Self::Context) {
        self.server.do_send(Disconnect {
            user_id: self.user_id.clone(),
            addr: ctx.address().recipient(),
        });
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WebSocketConnection {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(_)) | Ok(ws::Message::Binary(_)) => {
                debug!("Ignoring inbound frame from user {}", self.user_id);
            }
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            Err(e) => {
                warn!("WebSocket error for user {}: {}", self.user_id, e);
                ctx.stop();
            }
            _ => {}
        }
    }
}

impl Handler<WsMessage> for WebSocketConnection {
    type Result = ();

    fn handle(&mut self, msg: WsMessage, ctx: &mut Self::Context) {
        ctx.text(msg.0);
    }
}

// GET /ws
pub async fn ws_index(
    req: HttpRequest,
    stream: web::Payload,
    data: web::Data<AppState>,
    user: AuthenticatedUser,
) -> Result<HttpResponse, Error> {
    ws::start(
        WebSocketConnection::new(user.0, data.chat_server.clone()),
        &req,
        stream,
    )
}
