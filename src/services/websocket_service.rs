use std::{sync::Arc, time::Duration};

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dto::{
        room::{SyncState, TextMessage, Welcome},
        ws::{ClientMessage, JoinRequest, ServerMessage},
    },
    error::ServiceError,
    state::{Room, SharedState, player::Departure},
};

const IDENT_TIMEOUT: Duration = Duration::from_secs(10);
/// A room can close between lookup and join; retry with a fresh one.
const JOIN_ATTEMPTS: usize = 3;

/// Failure while serving one inbound frame.
///
/// Distinct from `ServiceError`, which is reported back to the sender while
/// the connection stays open.
#[derive(Debug, Error)]
enum SessionError {
    /// Writer channel closed - connection should be terminated immediately.
    #[error("connection closed")]
    ConnectionClosed,
    /// Rejected by the room.
    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// Handle the full lifecycle of a player WebSocket connection.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
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
            warn!("websocket join timed out");
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    let join = match ClientMessage::from_json_str(&initial_message) {
        Ok(ClientMessage::Join(join)) => join,
        Ok(_) => {
            warn!("first message was not a join");
            reject(&outbound_tx, "the first message must be a join");
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Err(err) => {
            warn!(error = %err, "failed to parse or validate join message");
            reject(&outbound_tx, &err);
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    let player_id = Uuid::new_v4().to_string();
    let (room, room_rx, sync) = match join_room(&state, &player_id, join).await {
        Ok(joined) => joined,
        Err(err) => {
            warn!(error = %err, "join rejected");
            reject(&outbound_tx, &err.to_string());
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };
    info!(player = %player_id, room = %room.code(), "player connected");

    let welcome = ServerMessage::Welcome(Welcome {
        player_id: player_id.clone(),
        state: sync,
    });
    if send_message_to_websocket(&outbound_tx, &welcome).is_ok() {
        let forwarder = tokio::spawn(forward_room_messages(
            room.clone(),
            room_rx,
            outbound_tx.clone(),
            player_id.clone(),
        ));

        while let Some(message) = receiver.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    debug!(player = %player_id, payload = %text, "received player message");

                    let result = match ClientMessage::from_json_str(&text) {
                        Ok(message) => handle_message(&room, &player_id, message, &outbound_tx).await,
                        Err(err) => {
                            warn!(player = %player_id, error = %err, "failed to parse or validate player message");
                            send_error(&outbound_tx, err)
                        }
                    };
                    match result {
                        Ok(()) => {}
                        Err(SessionError::ConnectionClosed) => {
                            info!(player = %player_id, "connection closed while replying, terminating");
                            break;
                        }
                        Err(SessionError::Service(err)) => {
                            debug!(player = %player_id, error = %err, "player action rejected");
                            if send_error(&outbound_tx, err.to_string()).is_err() {
                                break;
                            }
                        }
                    }
                }
                Ok(Message::Ping(payload)) => {
                    let _ = outbound_tx.send(Message::Pong(payload));
                }
                Ok(Message::Close(frame)) => {
                    info!(player = %player_id, "player closed the connection");
                    let _ = outbound_tx.send(Message::Close(frame));
                    break;
                }
                Ok(Message::Binary(_)) => {}
                Ok(Message::Pong(_)) => {}
                Err(err) => {
                    warn!(player = %player_id, error = %err, "websocket error");
                    break;
                }
            }
        }

        forwarder.abort();
    }

    if room.remove_player(&player_id).await == Departure::Emptied {
        state.registry().remove_if_closed(room.code());
    }
    info!(player = %player_id, room = %room.code(), "player disconnected");

    finalize(writer_task, outbound_tx).await;
}

/// Join (or create) the requested room, subscribing before the roster changes
/// so no broadcast is missed.
async fn join_room(
    state: &SharedState,
    player_id: &str,
    join: JoinRequest,
) -> Result<(Arc<Room>, broadcast::Receiver<ServerMessage>, SyncState), ServiceError> {
    let JoinRequest {
        room: code,
        name,
        avatar,
        account_id,
    } = join;
    let name = name.trim().to_string();

    for _ in 0..JOIN_ATTEMPTS {
        let room = state.registry().get_or_create(&code);
        let room_rx = room.subscribe();
        match room
            .add_player(player_id, name.clone(), avatar.clone(), account_id.clone())
            .await
        {
            Ok(sync) => return Ok((room, room_rx, sync)),
            Err(err) if room.is_closed() => {
                debug!(room = %room.code(), error = %err, "room closed while joining; retrying");
            }
            Err(err) => return Err(err),
        }
    }

    Err(ServiceError::InvalidState(format!(
        "room `{code}` is closing; try again"
    )))
}

/// Dispatch one inbound message to the room.
async fn handle_message(
    room: &Arc<Room>,
    player_id: &str,
    message: ClientMessage,
    tx: &mpsc::UnboundedSender<Message>,
) -> Result<(), SessionError> {
    match message {
        ClientMessage::Join(_) => {
            warn!(player = %player_id, "ignoring duplicate join message");
        }
        ClientMessage::StartGame => {
            room.start_game(player_id).await?;
        }
        ClientMessage::SubmitAnswer { value, mode } => {
            room.submit_answer(player_id, &value, mode).await?;
        }
        ClientMessage::VotePause => room.toggle_pause(player_id).await,
        ClientMessage::VoteSkip => room.vote_skip(player_id).await,
        ClientMessage::RequestSync => {
            let sync = room.sync_state().await;
            send_message_to_websocket(tx, &ServerMessage::SyncState(sync))?;
        }
        ClientMessage::ReturnToLobby => room.return_to_lobby(player_id).await,
        ClientMessage::CancelGame => room.cancel_game(player_id).await?,
        ClientMessage::ForceEndRound => room.force_end_round(player_id).await?,
        ClientMessage::UpdateSettings { settings } => {
            room.update_settings(player_id, settings).await?;
        }
        ClientMessage::SetReady { ready } => room.set_ready(player_id, ready).await,
    }
    Ok(())
}

/// Relay room broadcasts to one socket until either side goes away.
async fn forward_room_messages(
    room: Arc<Room>,
    mut room_rx: broadcast::Receiver<ServerMessage>,
    tx: mpsc::UnboundedSender<Message>,
    player_id: String,
) {
    loop {
        let message = match room_rx.recv().await {
            Ok(message) => message,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(player = %player_id, skipped, "player lagged behind room broadcasts; resyncing");
                ServerMessage::SyncState(room.sync_state().await)
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };
        if send_message_to_websocket(&tx, &message).is_err() {
            break;
        }
    }
}

fn send_error(
    tx: &mpsc::UnboundedSender<Message>,
    message: impl Into<String>,
) -> Result<(), SessionError> {
    send_message_to_websocket(tx, &ServerMessage::Error(TextMessage::new(message)))
}

/// Report why the connection is refused, then close it.
fn reject(tx: &mpsc::UnboundedSender<Message>, reason: &str) {
    let _ = send_error(tx, reason);
    let _ = tx.send(Message::Close(None));
}

/// Serialize a payload and push it onto the provided WebSocket sender.
///
/// Serialization failures are logged and swallowed; only a closed writer
/// channel is reported.
fn send_message_to_websocket<T>(
    tx: &mpsc::UnboundedSender<Message>,
    value: &T,
) -> Result<(), SessionError>
where
    T: ?Sized + serde::Serialize + std::fmt::Debug,
{
    let payload = match serde_json::to_string(value) {
        Ok(p) => p,
        Err(err) => {
            warn!(error = %err, "failed to serialize message `{value:?}`");
            return Ok(());
        }
    };

    tx.send(Message::Text(payload.into()))
        .map_err(|_| SessionError::ConnectionClosed)
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_sent_as_json_text() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        send_error(&tx, "only the host can start the game").unwrap();

        let Some(Message::Text(text)) = rx.try_recv().ok() else {
            panic!("expected a text frame");
        };
        let json: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["message"], "only the host can start the game");
    }

    #[test]
    fn closed_writer_is_reported() {
        let (tx, rx) = mpsc::unbounded_channel::<Message>();
        drop(rx);
        assert!(matches!(
            send_error(&tx, "gone"),
            Err(SessionError::ConnectionClosed)
        ));
    }

    #[test]
    fn rejection_closes_the_socket() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        reject(&tx, "the first message must be a join");
        assert!(matches!(rx.try_recv(), Ok(Message::Text(_))));
        assert!(matches!(rx.try_recv(), Ok(Message::Close(None))));
    }
}
