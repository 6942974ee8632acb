//! Relay WebSocket handler.
//!
//! Owns the persistent bidirectional connection for one call: accepts the
//! upgrade, emits the configuration frame, runs the heartbeat loop, receives
//! inbound events and fans them out without blocking the receive loop, and
//! performs ordered teardown. Generation-triggering events run as separate
//! tasks so a newer interaction request can start while an older generation
//! is still streaming; the session's supersession check gates every frame.

use axum::{
    Extension,
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::{select, time::sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::llm::{ResponseEngine, ResponseFrame};
use crate::middleware::ClientIp;
use crate::session::{CallSession, InteractionKind, InteractionRequest};
use crate::state::AppState;

use super::messages::{FrameRoute, GenerationTrigger, InboundEvent, OutboundFrame};

/// Buffered outbound frames between producer tasks and the socket sender.
const CHANNEL_BUFFER_SIZE: usize = 256;

/// Terminal apology sent when handling one inbound frame faults.
const FRAME_FAULT_APOLOGY: &str = "I encountered an error. Please try again.";

/// Relay WebSocket handler.
///
/// Upgrades the HTTP connection to a WebSocket for one call. Exactly one
/// connection is allowed per call id; a duplicate is rejected before the
/// upgrade with 409.
pub async fn relay_handler(
    ws: WebSocketUpgrade,
    Path(call_id): Path<String>,
    State(state): State<Arc<AppState>>,
    client_ip: Option<Extension<ClientIp>>,
) -> Response {
    let ip = client_ip.map(|Extension(ClientIp(ip))| ip);

    if !state.try_register_call(&call_id) {
        warn!(call_id = %call_id, "rejecting duplicate connection for active call");
        if let Some(ip) = ip {
            state.release_connection(ip);
        }
        return (StatusCode::CONFLICT, "call already has an active connection").into_response();
    }

    info!(call_id = %call_id, "relay connection upgrade requested");
    ws.on_upgrade(move |socket| handle_relay_socket(socket, state, call_id, ip))
}

/// Drive one call connection from accept to teardown.
async fn handle_relay_socket(
    socket: WebSocket,
    state: Arc<AppState>,
    call_id: String,
    client_ip: Option<std::net::IpAddr>,
) {
    let connection_id = uuid::Uuid::new_v4();
    info!(call_id = %call_id, %connection_id, "relay connection established");

    let (mut sink, mut receiver) = socket.split();
    let (frame_tx, mut frame_rx) = mpsc::channel::<FrameRoute>(CHANNEL_BUFFER_SIZE);

    // Dedicated sender task: everything outbound funnels through one writer
    // so cancellation can never leave a partially written frame behind.
    let sender_task = tokio::spawn(async move {
        while let Some(route) = frame_rx.recv().await {
            match route {
                FrameRoute::Outgoing(frame) => {
                    let json = match serde_json::to_string(&frame) {
                        Ok(json) => json,
                        Err(e) => {
                            warn!(error = %e, "failed to serialize outbound frame");
                            continue;
                        }
                    };
                    if sink.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                FrameRoute::Close => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    let session = state.new_session();
    let engine = state.engine();
    let cancel = CancellationToken::new();
    let mut generations: JoinSet<()> = JoinSet::new();

    // Declare reconnect support and ask for the call-details event.
    if frame_tx
        .send(FrameRoute::Outgoing(OutboundFrame::config()))
        .await
        .is_err()
    {
        warn!(call_id = %call_id, "connection closed before configuration frame");
    }

    // Heartbeat loop for the life of the connection.
    let heartbeat = {
        let frame_tx = frame_tx.clone();
        let interval = state.config.heartbeat_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if frame_tx
                    .send(FrameRoute::Outgoing(OutboundFrame::heartbeat()))
                    .await
                    .is_err()
                {
                    break;
                }
            }
        })
    };

    let receive_timeout = state.config.receive_timeout();
    loop {
        select! {
            inbound = receiver.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        handle_text_frame(
                            &text,
                            &session,
                            &engine,
                            &frame_tx,
                            &cancel,
                            &mut generations,
                        )
                        .await;
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!(call_id = %call_id, "peer closed the connection");
                        break;
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                        // Transport-level keepalive; axum answers pings itself.
                    }
                    Some(Ok(Message::Binary(_))) => {
                        debug!(call_id = %call_id, "ignoring unexpected binary frame");
                    }
                    Some(Err(e)) => {
                        warn!(call_id = %call_id, error = %e, "receive failed; closing connection");
                        break;
                    }
                    None => {
                        info!(call_id = %call_id, "peer disconnected");
                        break;
                    }
                }
            }
            _ = sleep(receive_timeout) => {
                // No inbound traffic within the window: probe the peer. A
                // refused probe means the sender task (and thus the socket)
                // is gone.
                debug!(call_id = %call_id, "receive timeout; probing peer");
                if frame_tx
                    .send(FrameRoute::Outgoing(OutboundFrame::heartbeat()))
                    .await
                    .is_err()
                {
                    warn!(call_id = %call_id, "connection dead after timeout probe");
                    break;
                }
            }
        }
    }

    // Ordered teardown: stop the heartbeat, cancel in-flight generations and
    // await them, flush the session, then close the socket. Errors past this
    // point are logged only.
    cancel.cancel();
    heartbeat.abort();
    while generations.join_next().await.is_some() {}

    session.finalize().await;

    let _ = frame_tx.send(FrameRoute::Close).await;
    drop(frame_tx);
    let _ = sender_task.await;

    state.release_call(&call_id);
    if let Some(ip) = client_ip {
        state.release_connection(ip);
    }
    info!(call_id = %call_id, %connection_id, "relay connection closed");
}

/// Parse and dispatch one inbound text frame. Faults emit an apologetic
/// terminal response for the frame's response id instead of crashing the
/// connection.
async fn handle_text_frame(
    text: &str,
    session: &Arc<CallSession>,
    engine: &Arc<ResponseEngine>,
    frame_tx: &mpsc::Sender<FrameRoute>,
    cancel: &CancellationToken,
    generations: &mut JoinSet<()>,
) {
    let raw: serde_json::Value = match serde_json::from_str(text) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(error = %e, "inbound frame is not valid JSON");
            return;
        }
    };

    let event: InboundEvent = match serde_json::from_value(raw.clone()) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "failed to parse inbound event");
            let response_id = InboundEvent::fallback_response_id(&raw);
            let _ = frame_tx
                .send(FrameRoute::Outgoing(OutboundFrame::Response(
                    ResponseFrame::terminal(response_id, FRAME_FAULT_APOLOGY),
                )))
                .await;
            return;
        }
    };

    if let Err(e) = event.validate_size() {
        warn!(error = %e, "inbound event failed validation");
        let response_id = InboundEvent::fallback_response_id(&raw);
        let _ = frame_tx
            .send(FrameRoute::Outgoing(OutboundFrame::Response(
                ResponseFrame::terminal(response_id, FRAME_FAULT_APOLOGY),
            )))
            .await;
        return;
    }

    match event {
        InboundEvent::CallDetails(details) => {
            debug!(call_id = ?details.call.call_id, "call details received");
            session.apply_call_details(
                details.call.call_id.as_deref(),
                details.call.dynamic_variables.as_ref(),
            );
            let greeting = session.draft_begin_message();
            let _ = frame_tx
                .send(FrameRoute::Outgoing(OutboundFrame::Response(greeting)))
                .await;
        }
        InboundEvent::PingPong { timestamp } => {
            let _ = frame_tx
                .send(FrameRoute::Outgoing(OutboundFrame::pong(timestamp)))
                .await;
        }
        InboundEvent::UpdateOnly => {
            // Transcript refresh only; no reply.
        }
        InboundEvent::ResponseRequired(trigger) => {
            spawn_generation(
                InteractionKind::ResponseRequired,
                trigger,
                session,
                engine,
                frame_tx,
                cancel,
                generations,
            );
        }
        InboundEvent::ReminderRequired(trigger) => {
            spawn_generation(
                InteractionKind::ReminderRequired,
                trigger,
                session,
                engine,
                frame_tx,
                cancel,
                generations,
            );
        }
        InboundEvent::Unknown => {
            debug!("ignoring unrecognized interaction type");
        }
    }
}

/// Start one generation task. The response id is marked as started before
/// the task spawns so supersession takes effect in arrival order.
fn spawn_generation(
    kind: InteractionKind,
    trigger: GenerationTrigger,
    session: &Arc<CallSession>,
    engine: &Arc<ResponseEngine>,
    frame_tx: &mpsc::Sender<FrameRoute>,
    cancel: &CancellationToken,
    generations: &mut JoinSet<()>,
) {
    let request = InteractionRequest {
        kind,
        response_id: trigger.response_id,
        transcript: trigger.transcript,
    };
    session.begin_response(request.response_id);

    let session = Arc::clone(session);
    let engine = Arc::clone(engine);
    let frame_tx = frame_tx.clone();
    let cancel = cancel.clone();

    generations.spawn(async move {
        let response_id = request.response_id;
        debug!(response_id, ?kind, "generation started");

        let context = session.prompt_context();
        let identity = session.identity();
        let stream = engine.draft_response(request, context, identity);
        tokio::pin!(stream);

        loop {
            select! {
                _ = cancel.cancelled() => {
                    debug!(response_id, "generation cancelled at teardown");
                    break;
                }
                frame = stream.next() => {
                    let Some(frame) = frame else { break };
                    // Supersession: checked immediately before every emission.
                    if !session.is_current(response_id) {
                        debug!(
                            response_id,
                            latest = session.latest_response_id(),
                            "abandoning superseded generation"
                        );
                        break;
                    }
                    if frame_tx
                        .send(FrameRoute::Outgoing(OutboundFrame::Response(frame)))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
            }
        }
    });
}
