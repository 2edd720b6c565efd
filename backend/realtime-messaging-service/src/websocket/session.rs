use actix::{Actor, ActorContext, AsyncContext, StreamHandler};
use actix_web_actors::ws;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;

use crate::config::WsConfig;
use crate::error::AppError;
use crate::metrics;

use super::message_types::{encode_frame, events, ErrorPayload, WsInboundEvent};
use super::{ConnectionHandle, ConnectionId, EventRouter, RegistryError};

/// Queue an inbound event for the connection's consumer without waiting
pub fn enqueue_inbound(
    inbound: &mpsc::Sender<WsInboundEvent>,
    id: ConnectionId,
    event: WsInboundEvent,
) -> Result<(), RegistryError> {
    inbound.try_send(event).map_err(|e| match e {
        mpsc::error::TrySendError::Full(_) => RegistryError::QueueFull(id),
        mpsc::error::TrySendError::Closed(_) => RegistryError::Closed(id),
    })
}

/// WebSocket actor for one registered connection.
///
/// Inbound events are queued to a single consumer task so they are handled
/// in the order the client sent them. The queue is bounded; a client that
/// outruns it gets an `error` frame and is disconnected. Outbound frames
/// arrive through the connection's bounded queue and are written as text
/// frames.
pub struct WsSession {
    handle: ConnectionHandle,
    router: EventRouter,
    outbound: Option<mpsc::Receiver<String>>,
    inbound: Option<mpsc::Sender<WsInboundEvent>>,
    inbound_capacity: usize,
    snapshot: Option<JoinHandle<()>>,
    hb: Instant,
    heartbeat_interval: Duration,
    client_timeout: Duration,
}

impl WsSession {
    pub fn new(
        handle: ConnectionHandle,
        outbound: mpsc::Receiver<String>,
        router: EventRouter,
        snapshot: JoinHandle<()>,
        config: &WsConfig,
    ) -> Self {
        Self {
            handle,
            router,
            outbound: Some(outbound),
            inbound: None,
            inbound_capacity: config.inbound_queue_capacity.max(1),
            snapshot: Some(snapshot),
            hb: Instant::now(),
            heartbeat_interval: config.heartbeat_interval,
            client_timeout: config.client_timeout,
        }
    }

    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(self.heartbeat_interval, |act, ctx| {
            if Instant::now().duration_since(act.hb) > act.client_timeout {
                tracing::warn!(
                    connection_id = %act.handle.id(),
                    "WebSocket heartbeat failed, disconnecting"
                );
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    fn start_inbound_consumer(&mut self) {
        let (tx, mut rx) = mpsc::channel::<WsInboundEvent>(self.inbound_capacity);
        self.inbound = Some(tx);

        let router = self.router.clone();
        let handle = self.handle.clone();
        actix::spawn(async move {
            while let Some(event) = rx.recv().await {
                router.handle(&handle, event).await;
            }
        });
    }

    fn queue(&self, event: WsInboundEvent, ctx: &mut ws::WebsocketContext<Self>) {
        let Some(inbound) = self.inbound.as_ref() else {
            ctx.stop();
            return;
        };
        match enqueue_inbound(inbound, self.handle.id(), event) {
            Ok(()) => {}
            Err(RegistryError::QueueFull(_)) => {
                tracing::warn!(
                    connection_id = %self.handle.id(),
                    capacity = self.inbound_capacity,
                    "inbound queue full, disconnecting"
                );
                metrics::record_ws_event("overflow");
                // Written directly; the outbound queue is not drained once stopping
                let payload = ErrorPayload::from_app_error(&AppError::InboundOverflow, None);
                if let Ok(frame) = encode_frame(events::ERROR, &payload) {
                    ctx.text(frame);
                }
                ctx.close(Some(ws::CloseReason {
                    code: ws::CloseCode::Policy,
                    description: Some("inbound queue full".to_string()),
                }));
                ctx.stop();
            }
            Err(_) => ctx.stop(),
        }
    }

    fn reject(&self, reason: String) {
        metrics::record_ws_event("invalid");
        EventRouter::reject(&self.handle, &AppError::BadRequest(reason), None);
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::debug!(
            user = %self.handle.user(),
            connection_id = %self.handle.id(),
            "WebSocket session started"
        );

        self.hb(ctx);
        if let Some(outbound) = self.outbound.take() {
            ctx.add_stream(ReceiverStream::new(outbound));
        }
        self.start_inbound_consumer();
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        if let Some(snapshot) = self.snapshot.take() {
            snapshot.abort();
        }
        // Closing the queue ends the consumer after pending events drain
        self.inbound.take();

        let router = self.router.clone();
        let handle = self.handle.clone();
        actix::spawn(async move {
            router.on_disconnect(&handle).await;
        });
    }
}

/// Outbound frames queued by the registry
impl StreamHandler<String> for WsSession {
    fn handle(&mut self, frame: String, ctx: &mut Self::Context) {
        ctx.text(frame);
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(text)) => {
                self.hb = Instant::now();
                match serde_json::from_str::<WsInboundEvent>(&text) {
                    Ok(event) => self.queue(event, ctx),
                    Err(e) => self.reject(format!("invalid event: {e}")),
                }
            }
            Ok(ws::Message::Binary(_)) => {
                self.reject("binary frames are not supported".to_string());
            }
            Ok(ws::Message::Close(reason)) => {
                tracing::debug!(connection_id = %self.handle.id(), ?reason, "close received");
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                ctx.stop();
            }
            Ok(ws::Message::Nop) => {}
            Err(e) => {
                tracing::warn!(
                    connection_id = %self.handle.id(),
                    error = %e,
                    "WebSocket protocol error"
                );
                ctx.stop();
            }
        }
    }
}
