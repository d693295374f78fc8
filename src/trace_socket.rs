// src/trace_socket.rs

//! WebSocket feed of the actions sent to the device. Every action is pushed
//! as a JSON text message, e.g. `{"pos":50,"spd":30}`.

use actix::{Actor, ActorContext, AsyncContext, StreamHandler};
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use log::{error, info, warn};
use tokio_stream::wrappers::ReceiverStream;

use crate::manager::Manager;
use crate::protocol::action::Action;

pub struct TraceSocket {
    actions: Option<ReceiverStream<Action>>,
}

impl TraceSocket {
    pub fn new(actions: ReceiverStream<Action>) -> Self {
        Self {
            actions: Some(actions),
        }
    }
}

impl Actor for TraceSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        if let Some(actions) = self.actions.take() {
            ctx.add_stream(actions);
        }
    }
}

impl StreamHandler<Action> for TraceSocket {
    fn handle(&mut self, action: Action, ctx: &mut Self::Context) {
        match serde_json::to_string(&action) {
            Ok(json) => ctx.text(json),
            Err(e) => error!("Error encoding trace action: {}", e),
        }
    }

    // The manager drops subscribers that fall behind.
    fn finished(&mut self, ctx: &mut Self::Context) {
        warn!("Trace subscription ended, closing socket");
        ctx.close(Some(ws::CloseReason {
            code: ws::CloseCode::Away,
            description: Some("trace ended".to_string()),
        }));
        ctx.stop();
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for TraceSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => ctx.pong(&msg),
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            Err(e) => {
                warn!("WebSocket protocol error: {}", e);
                ctx.stop();
            }
            _ => {}
        }
    }
}

pub async fn handle_ws_start(
    req: HttpRequest,
    stream: web::Payload,
    manager: web::Data<Manager>,
) -> Result<HttpResponse, Error> {
    info!("Trace socket connection attempt");
    match ws::start(TraceSocket::new(manager.trace()), &req, stream) {
        Ok(response) => {
            info!("Trace socket connection established");
            Ok(response)
        }
        Err(e) => {
            error!("WebSocket error: {}", e);
            Err(e)
        }
    }
}
