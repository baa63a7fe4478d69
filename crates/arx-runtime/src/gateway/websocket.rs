use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};

use arx_core::event::Event;

use super::server::AppState;

/// `GET /admin/api/v1/realtime`
///
/// Streams every hub event to the client as one JSON text frame.
pub async fn realtime_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Encode an event as a text frame body.
pub fn event_frame(event: &Event) -> Option<String> {
    match serde_json::to_string(event) {
        Ok(json) => Some(json),
        Err(e) => {
            tracing::warn!(kind = %event.kind(), error = %e, "Failed to encode event");
            None
        }
    }
}

/// Pump events to one client until it disconnects or a send fails.
///
/// The subscription is dropped on return, which removes it from the hub.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let mut subscription = state.events.subscribe();
    let subscriber = subscription.id();

    tracing::debug!(%subscriber, "Realtime client connected");

    loop {
        tokio::select! {
            event = subscription.recv() => {
                let Some(event) = event else {
                    let _ = ws_sender.send(Message::Close(None)).await;
                    break;
                };
                let Some(json) = event_frame(&event) else { continue };
                if ws_sender.send(Message::Text(json.into())).await.is_err() {
                    tracing::debug!(%subscriber, "Realtime send failed, dropping client");
                    break;
                }
            }
            incoming = ws_receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    tracing::debug!(%subscriber, error = %e, "Realtime receive failed");
                    break;
                }
                // Pings are answered by the transport; other client frames carry no meaning.
                Some(Ok(_)) => {}
            },
        }
    }

    tracing::debug!(
        %subscriber,
        dropped = subscription.dropped(),
        "Realtime client disconnected"
    );
}
