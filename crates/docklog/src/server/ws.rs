//! The client duplex channel: a WebSocket carrying JSON frames.
//!
//! On connect, the client is subscribed with the match-all filter and
//! receives the container-set snapshot followed by the initial log snapshot.
//! A `filter` frame from the client atomically replaces the subscription's
//! filter (snapshot replay included); a malformed frame keeps the current
//! filter and may be answered with a single error frame.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, warn};

use crate::filter::FilterSpec;
use crate::state::SharedState;

use super::wire::{ClientFrame, ServerFrame};

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: SharedState) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    // The hub queues the initial log snapshot on subscribe; the container
    // snapshot goes out first, directly.
    let (handle, mut frames) = state.hub.subscribe(FilterSpec::match_all());
    let containers = ServerFrame::Containers {
        containers: state.container_snapshot(),
    };
    if send_frame(&mut ws_tx, &containers).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => break,

            frame = frames.recv() => match frame {
                Some(frame) => {
                    if send_frame(&mut ws_tx, &ServerFrame::from(frame)).await.is_err() {
                        break;
                    }
                }
                // Hub side closed (unsubscribed elsewhere).
                None => break,
            },

            incoming = ws_rx.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<ClientFrame>(&text) {
                        Ok(frame) => {
                            let spec = frame
                                .into_spec(|names| state.resolve_container_names(names));
                            debug!(subscriber_id = handle.id(), "filter replaced");
                            state.hub.update_filter(handle.id(), spec);
                        }
                        Err(e) => {
                            // Current filter is kept; one error frame back.
                            warn!(error = %e, "malformed client frame");
                            let error = ServerFrame::Error {
                                message: format!("invalid filter frame: {e}"),
                            };
                            if send_frame(&mut ws_tx, &error).await.is_err() {
                                break;
                            }
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => continue, // ping/pong/binary
                Some(Err(e)) => {
                    debug!(error = %e, "websocket error");
                    break;
                }
            },
        }
    }
    // Dropping the handle unsubscribes and cancels delivery.
}

async fn send_frame(
    ws_tx: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    frame: &ServerFrame,
) -> Result<(), axum::Error> {
    let text = serde_json::to_string(frame).unwrap_or_default();
    ws_tx.send(Message::Text(text.into())).await
}
