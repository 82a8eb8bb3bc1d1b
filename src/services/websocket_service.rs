//! WebSocket connection lifecycle and broadcast fan-out.
//!
//! One task per connection reads frames and dispatches them onto the core
//! handlers; a dedicated writer task drains the outbound channel so
//! broadcasts never block on a slow reader. Failures are reported only to
//! the initiating connection; payloads are broadcast room-wide.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dto::ws::{ClientMessage, ServerMessage},
    services::room_service,
    state::{Departure, SharedRegistry},
};

const IDENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Handle the full lifecycle for an individual game client connection.
pub async fn handle_socket(registry: SharedRegistry, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we
    // await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let initial_message = match tokio::time::timeout(IDENT_TIMEOUT, receiver.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => text,
        Ok(Some(Ok(Message::Close(_)))) => {
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Ok(_))) => {
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Err(err))) => {
            warn!(error = %err, "websocket receive error");
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(None) | Err(_) => {
            warn!("websocket identification timed out");
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    let connection_id = Uuid::new_v4();
    match ClientMessage::from_json_str(&initial_message) {
        Ok(ClientMessage::Identification { name, avatar }) => {
            match registry.register_connection(connection_id, name, avatar, outbound_tx.clone()) {
                Ok(user) => info!(id = %connection_id, name = %user.name, "client identified"),
                Err(err) => {
                    warn!(id = %connection_id, error = %err, "failed to register connection");
                    send_message(&outbound_tx, &ServerMessage::from_error(&err));
                    let _ = outbound_tx.send(Message::Close(None));
                    finalize(writer_task, outbound_tx).await;
                    return;
                }
            }
        }
        Ok(_) => {
            warn!("first message was not identification");
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Err(err) => {
            warn!(error = %err, "failed to parse identification message");
            send_message(&outbound_tx, &ServerMessage::from_error(&err));
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
    }

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => match ClientMessage::from_json_str(&text) {
                Ok(ClientMessage::LeaveRoom) => {
                    handle_departure(&registry, room_service::leave(&registry, connection_id).await);
                    break;
                }
                Ok(action) => {
                    if let Err(err) = dispatch(&registry, connection_id, action, &outbound_tx).await
                    {
                        send_message(&outbound_tx, &ServerMessage::from_error(&err));
                    }
                }
                Err(err) => {
                    warn!(id = %connection_id, error = %err, "rejected client message");
                    send_message(&outbound_tx, &ServerMessage::from_error(&err));
                }
            },
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) => {}
            Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(id = %connection_id, error = %err, "websocket error");
                break;
            }
        }
    }

    // Runs for abrupt disconnects as well; a no-op after an explicit leave.
    handle_departure(&registry, room_service::leave(&registry, connection_id).await);
    info!(id = %connection_id, "client disconnected");

    finalize(writer_task, outbound_tx).await;
}

/// Route one client action onto the core and broadcast its outcome.
async fn dispatch(
    registry: &SharedRegistry,
    connection_id: Uuid,
    action: ClientMessage,
    outbound_tx: &mpsc::UnboundedSender<Message>,
) -> Result<(), crate::error::ServiceError> {
    match action {
        ClientMessage::CreateRoom => {
            let room_id = room_service::create_room(registry, connection_id)?;
            send_message(outbound_tx, &ServerMessage::RoomCreated { room_id });
        }
        ClientMessage::JoinRoom { room_id } => {
            let (user, members) = room_service::join_room(registry, connection_id, room_id).await?;
            broadcast(registry, &members, &ServerMessage::AddPeer { user });
        }
        ClientMessage::SetPlaylist { playlist } => {
            let (playlist, members) =
                room_service::set_playlist(registry, connection_id, playlist).await?;
            broadcast(registry, &members, &ServerMessage::PlaylistSet { playlist });
        }
        ClientMessage::StartGame { total_rounds } => {
            let (start, members) =
                room_service::start_game(registry, connection_id, total_rounds).await?;
            broadcast(registry, &members, &ServerMessage::StartRound(start));
        }
        ClientMessage::RoundEnded { round_number } => {
            let (end, next, members) =
                room_service::round_ended(registry, connection_id, round_number).await?;
            broadcast(
                registry,
                &members,
                &ServerMessage::RoundEnded {
                    end,
                    game_over: next.is_none(),
                },
            );
            if let Some(start) = next {
                broadcast(registry, &members, &ServerMessage::StartRound(start));
            }
        }
        ClientMessage::Identification { .. } => {
            warn!(id = %connection_id, "ignoring duplicate identification message");
        }
        // LeaveRoom is handled by the socket loop so it can close the
        // connection; Unknown is skipped for forward compatibility.
        ClientMessage::LeaveRoom | ClientMessage::Unknown => {}
    }
    Ok(())
}

/// Close the outbound channel and wait for the writer task to drain.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}

/// Announce a departure to the members left behind.
fn handle_departure(registry: &SharedRegistry, departure: Option<Departure>) {
    let Some(departure) = departure else { return };
    broadcast(
        registry,
        &departure.remaining,
        &ServerMessage::RemovePeer {
            user: departure.user,
        },
    );
}

/// Push a message to every listed member that is still connected.
fn broadcast(registry: &SharedRegistry, members: &[Uuid], message: &ServerMessage) {
    for member in members {
        if let Some(tx) = registry.sender(*member) {
            send_message(&tx, message);
        }
    }
}

/// Serialize a payload and push it onto a connection's writer channel.
///
/// A closed channel only means the client is mid-disconnect; its own socket
/// task cleans the registry up, so the failure is merely logged.
fn send_message(tx: &mpsc::UnboundedSender<Message>, message: &ServerMessage) {
    let payload = match serde_json::to_string(message) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(error = %err, "failed to serialize server message");
            return;
        }
    };

    if tx.send(Message::Text(payload.into())).is_err() {
        warn!("dropping message for disconnecting client");
    }
}
