//! WebSocket connection handler
//!
//! Handles individual client connections: handshake validation, router
//! registration, and the per-connection loop that moves frames between the
//! socket and the session.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, StatusCode};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::client::Client;
use crate::error::{AppError, HandshakeError};
use crate::server::RelayState;
use crate::session::{ConnectionSession, HandshakeRequest, ReceiveOutcome};

/// Handle a new TCP connection
///
/// Validates the upgrade request before accepting it, registers the session
/// with the router, then runs until either side closes.
pub async fn handle_connection(stream: TcpStream, state: RelayState) -> Result<(), AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    debug!("New TCP connection from {}", peer_addr);

    // Validate during the HTTP upgrade so a rejected client never sees a WebSocket
    let mut validated: Option<Result<ConnectionSession, HandshakeError>> = None;
    let callback = |request: &Request, response: Response| {
        let handshake = HandshakeRequest::from_parts(
            request.uri().path(),
            request.uri().query(),
            request
                .headers()
                .get(AUTHORIZATION)
                .and_then(|value| value.to_str().ok()),
        );
        let result =
            ConnectionSession::handshake(state.directory.as_ref(), &handshake, state.room_keys);
        let accepted = result.is_ok();
        validated = Some(result);

        if accepted {
            Ok(response)
        } else {
            Err(rejection())
        }
    };
    let upgrade = tokio_tungstenite::accept_hdr_async(stream, callback).await;

    let (ws_stream, mut session) = match (upgrade, validated) {
        (Ok(ws_stream), Some(Ok(session))) => (ws_stream, session),
        (Err(_), Some(Err(reason))) => {
            info!("Rejected connection from {}: {}", peer_addr, reason);
            return Ok(());
        }
        (Err(e), _) => return Err(e.into()),
        (Ok(_), _) => {
            // the callback always runs before a successful upgrade
            error!("Upgrade from {} completed without validation", peer_addr);
            return Ok(());
        }
    };

    // Create channel for router -> session events
    let (outbox_tx, mut outbox) = mpsc::channel(state.outbox_size);

    state
        .router
        .register(
            session.room().clone(),
            Client::new(session.id(), session.owner().clone(), outbox_tx),
        )
        .await?;

    // The router acknowledges on the outbox before any broadcast can reach it
    match outbox.recv().await {
        Some(event) => {
            session.dispatch(event);
        }
        None => return Err(AppError::RouterClosed),
    }
    if !session.is_open() {
        warn!("Session {} was not acknowledged, closing", session.id());
        let _ = state
            .router
            .deregister(session.room().clone(), session.id())
            .await;
        return Ok(());
    }

    info!(
        "Session {} ({} -> {}) open in {} from {}",
        session.id(),
        session.owner(),
        session.target(),
        session.room(),
        peer_addr
    );

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    loop {
        tokio::select! {
            frame = ws_receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    match session.receive(&text, &state).await {
                        Ok(ReceiveOutcome::Delivered(message)) => {
                            debug!("Session {} delivered message {}", session.id(), message.id);
                        }
                        Ok(outcome) => {
                            debug!("Session {} dropped frame: {:?}", session.id(), outcome);
                        }
                        Err(e) => {
                            error!("Session {} lost the router: {}", session.id(), e);
                            break;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) => {
                    debug!("Session {} sent close frame", session.id());
                    break;
                }
                Some(Ok(Message::Ping(_))) => {
                    // Pong is handled automatically by tungstenite
                    debug!("Ping from {}", session.id());
                }
                Some(Ok(Message::Pong(_))) => {
                    debug!("Pong from {}", session.id());
                }
                Some(Ok(_)) => {
                    // Binary or other message types - ignore
                }
                Some(Err(e)) => {
                    warn!("WebSocket error for {}: {}", session.id(), e);
                    break;
                }
                None => break,
            },
            event = outbox.recv() => {
                let Some(event) = event else {
                    debug!("Router dropped session {}", session.id());
                    break;
                };
                let Some(chat) = session.dispatch(event) else {
                    continue;
                };
                match serde_json::to_string(&chat) {
                    Ok(json) => {
                        if ws_sender.send(Message::Text(json.into())).await.is_err() {
                            debug!("WebSocket send failed for {}", session.id());
                            break;
                        }
                    }
                    Err(e) => {
                        // Continue - don't break on serialization errors
                        error!("Failed to serialize message: {}", e);
                    }
                }
            }
        }
    }

    if let Some(room) = session.close() {
        let _ = state.router.deregister(room, session.id()).await;
    }
    let _ = ws_sender.close().await;

    info!("Session {} closed", session.id());

    Ok(())
}

/// Response for a refused upgrade; carries no reason
fn rejection() -> ErrorResponse {
    let mut response = ErrorResponse::new(None);
    *response.status_mut() = StatusCode::FORBIDDEN;
    response
}
