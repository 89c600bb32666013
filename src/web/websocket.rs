use axum::{
    extract::{
        ws::{Message, Utf8Bytes, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
};
use futures_util::stream::StreamExt;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::web::auth::{authenticate_ws_connection, AuthenticatedUser};
use crate::web::models::websocket_models::ClientMessage;
use crate::web::AppState;

/// Outbound messages queued per connection before the pipeline considers
/// the client stalled.
const OUTBOUND_QUEUE_SIZE: usize = 64;

#[derive(Deserialize, Debug)]
pub struct WebSocketAuthQuery {
    token: Option<String>,
}

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<WebSocketAuthQuery>,
) -> impl IntoResponse {
    let user = match authenticate_ws_connection(query.token, &app_state.config.jwt_secret) {
        Ok(user) => user,
        Err(e) => return e.into_response(),
    };

    info!(user = %user.username, "User authenticated for WebSocket connection.");
    ws.on_upgrade(move |socket| handle_socket(socket, app_state, user))
}

async fn handle_socket(mut socket: WebSocket, app_state: Arc<AppState>, user: AuthenticatedUser) {
    // Every push to this client flows through one bounded queue, so
    // per-connection delivery order is the order messages were queued.
    let (outbound_tx, mut outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_SIZE);
    let handle = app_state.registry.register(outbound_tx);
    let connection_id = handle.id();
    info!(user = %user.username, connection_id = %connection_id, "WebSocket connection established.");

    loop {
        tokio::select! {
            // Pump queued pipeline messages out to the socket.
            outbound = outbound_rx.recv() => {
                let Some(message) = outbound else {
                    // Registry dropped the sender: we were removed after a
                    // delivery failure. Close the socket.
                    break;
                };
                let json = match serde_json::to_string(&message) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!(connection_id = %connection_id, error = %e, "Failed to serialize push message.");
                        continue;
                    }
                };
                if socket.send(Message::Text(Utf8Bytes::from(json))).await.is_err() {
                    debug!(connection_id = %connection_id, "Send failed; client disconnected.");
                    break;
                }
            }
            // Handle subscription commands and socket control frames.
            incoming = socket.next() => {
                let Some(Ok(message)) = incoming else {
                    debug!(connection_id = %connection_id, "Client stream ended.");
                    break;
                };
                match message {
                    Message::Text(text) => {
                        handle_client_message(&app_state, connection_id, text.as_str()).await;
                    }
                    Message::Ping(payload) => {
                        if socket.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Message::Pong(_) => {}
                    Message::Binary(_) => {
                        debug!(connection_id = %connection_id, "Ignoring binary frame.");
                    }
                    Message::Close(_) => {
                        debug!(connection_id = %connection_id, "Client sent close frame.");
                        break;
                    }
                }
            }
        }
    }

    // Disconnect implies leave-all.
    app_state.registry.remove_connection(connection_id);
    info!(user = %user.username, connection_id = %connection_id, "WebSocket connection closed.");
}

async fn handle_client_message(
    app_state: &AppState,
    connection_id: crate::server::registry::ConnectionId,
    text: &str,
) {
    let parsed: Result<ClientMessage, _> = serde_json::from_str(text);
    match parsed {
        Ok(ClientMessage::SubscribeSite { site_id }) => {
            if app_state.sites.get(&site_id).is_none() {
                warn!(connection_id = %connection_id, site_id, "Subscribe to unknown site ignored.");
                return;
            }
            app_state.registry.join(connection_id, &site_id).await;
        }
        Ok(ClientMessage::UnsubscribeSite { site_id }) => {
            app_state.registry.leave(connection_id, &site_id);
        }
        Ok(ClientMessage::SubscribeGlobal) => {
            app_state.registry.subscribe_global(connection_id);
        }
        Err(e) => {
            debug!(connection_id = %connection_id, error = %e, "Unparseable client message ignored.");
        }
    }
}
