//! WebSocket transport between clients and session workers.
//!
//! Each socket gets a dedicated writer task fed by an unbounded queue, so
//! workers can broadcast without awaiting slow clients. The first frame on a
//! socket must identify a session (`join-game` or `host-join`) within a
//! timeout; afterwards frames are translated into worker commands.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    dto::ws::{ClientMessage, ServerMessage},
    services::session_worker::Command,
    state::{SharedState, registry::SessionHandle, session::ConnectionHandle},
};

/// How long a fresh socket gets to identify a session.
const IDENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Drive one WebSocket connection until it closes.
pub async fn handle_socket(socket: WebSocket, state: SharedState) {
    let (sink, mut stream) = socket.split();
    let connection_id = Uuid::new_v4();
    let (tx, rx) = mpsc::unbounded_channel::<ServerMessage>();
    let writer = tokio::spawn(write_frames(sink, rx));

    let conn = ConnectionHandle {
        id: connection_id,
        tx,
    };

    let session =
        match tokio::time::timeout(IDENT_TIMEOUT, identify(&mut stream, &state, &conn)).await {
            Ok(Some(session)) => session,
            Ok(None) => {
                drop(conn);
                let _ = writer.await;
                return;
            }
            Err(_) => {
                conn.send(ServerMessage::Error {
                    code: "invalid-input".to_string(),
                    message: "no identification received in time".to_string(),
                });
                debug!(connection = %connection_id, "identification timed out");
                drop(conn);
                let _ = writer.await;
                return;
            }
        };

    while let Some(frame) = stream.next().await {
        let message = match frame {
            Ok(Message::Text(text)) => match ClientMessage::from_json_str(&text) {
                Ok(message) => message,
                Err(err) => {
                    conn.send(ServerMessage::Error {
                        code: "invalid-input".to_string(),
                        message: format!("malformed frame: {err}"),
                    });
                    continue;
                }
            },
            Ok(Message::Close(_)) => break,
            // Pings are answered by axum; binary frames are not part of the
            // protocol.
            Ok(_) => continue,
            Err(err) => {
                debug!(connection = %connection_id, error = %err, "socket error");
                break;
            }
        };

        if let Some(command) = translate(message, connection_id, &conn) {
            if session.commands.send(command).is_err() {
                break;
            }
        }
    }

    let _ = session.commands.send(Command::Disconnected { connection_id });
    drop(conn);
    let _ = writer.await;
    debug!(connection = %connection_id, "socket closed");
}

/// Read frames until one identifies a session, then forward the join.
async fn identify(
    stream: &mut SplitStream<WebSocket>,
    state: &SharedState,
    conn: &ConnectionHandle,
) -> Option<SessionHandle> {
    while let Some(frame) = stream.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => continue,
        };
        let message = match ClientMessage::from_json_str(&text) {
            Ok(message) => message,
            Err(err) => {
                conn.send(ServerMessage::Error {
                    code: "invalid-input".to_string(),
                    message: format!("malformed frame: {err}"),
                });
                continue;
            }
        };

        match message {
            ClientMessage::JoinGame { pin, player_name } => {
                let Some(session) = state.registry().lookup_by_pin(&pin) else {
                    conn.send(ServerMessage::Error {
                        code: "not-found".to_string(),
                        message: format!("no session with pin {pin}"),
                    });
                    continue;
                };
                let _ = session.commands.send(Command::Join {
                    player_name,
                    conn: conn.clone(),
                });
                return Some(session);
            }
            ClientMessage::HostJoin { pin, host_token } => {
                let Some(session) = state.registry().lookup_by_pin(&pin) else {
                    conn.send(ServerMessage::Error {
                        code: "not-found".to_string(),
                        message: format!("no session with pin {pin}"),
                    });
                    continue;
                };
                let _ = session.commands.send(Command::HostAttach {
                    host_token,
                    conn: conn.clone(),
                });
                return Some(session);
            }
            _ => {
                conn.send(ServerMessage::Error {
                    code: "invalid-state-transition".to_string(),
                    message: "identify with join-game or host-join first".to_string(),
                });
            }
        }
    }
    None
}

/// Map an identified client's frame to a worker command.
fn translate(
    message: ClientMessage,
    connection_id: Uuid,
    conn: &ConnectionHandle,
) -> Option<Command> {
    match message {
        ClientMessage::JoinGame { .. } | ClientMessage::HostJoin { .. } => {
            conn.send(ServerMessage::Error {
                code: "invalid-state-transition".to_string(),
                message: "connection is already bound to a session".to_string(),
            });
            None
        }
        ClientMessage::LeaveGame => Some(Command::Leave { connection_id }),
        ClientMessage::StartGame => Some(Command::Start { connection_id }),
        ClientMessage::SubmitAnswer {
            question_id,
            answer_id,
            client_elapsed_ms,
        } => Some(Command::SubmitAnswer {
            connection_id,
            question_id,
            answer_id,
            client_elapsed_ms,
        }),
        ClientMessage::NextQuestion => Some(Command::Advance { connection_id }),
        ClientMessage::EndGame => Some(Command::End { connection_id }),
        ClientMessage::Unknown => {
            conn.send(ServerMessage::Error {
                code: "invalid-input".to_string(),
                message: "unrecognized message type".to_string(),
            });
            None
        }
    }
}

/// Serialize and write outbound frames until the queue closes.
async fn write_frames(
    mut sink: SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<ServerMessage>,
) {
    while let Some(message) = rx.recv().await {
        let payload = match serde_json::to_string(&message) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(error = %err, "failed to serialize outbound frame");
                continue;
            }
        };
        if sink.send(Message::Text(payload.into())).await.is_err() {
            break;
        }
    }
    let _ = sink.close().await;
}
