use crate::{
    models::websocket::{ ClientMessage, ServerMessage },
    resolver::QueryResolver,
    session::{ CredentialState, Session, SessionError },
};
use futures::{ Sink, SinkExt, StreamExt };
use log::{ info, warn, error };
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{ AsyncRead, AsyncWrite };
use tokio_tungstenite::{ tungstenite::{ self, protocol::Message }, WebSocketStream };
const MAX_MESSAGE_SIZE: usize = 1 * 1024 * 1024;

fn encode(msg: &ServerMessage) -> Message {
    let json = serde_json
        ::to_string(msg)
        .unwrap_or_else(|e| format!(r#"{{"type":"error","message":"encoding failed: {}"}}"#, e));
    Message::Text(json)
}

async fn send<T>(tx: &mut T, msg: &ServerMessage) -> Result<(), tungstenite::Error>
    where T: Sink<Message, Error = tungstenite::Error> + Unpin
{
    tx.send(encode(msg)).await
}

/// True when the message will reach the resolver, so the client should be told
/// a reply is on its way before it is awaited.
fn starts_processing(session: &Session, message: &ClientMessage) -> bool {
    match message {
        ClientMessage::Chat { content } =>
            session.state() == CredentialState::Ready && !content.trim().is_empty(),
        _ => false,
    }
}

/// Replies produced for one client message, in send order.
async fn handle_client_message(
    session: &mut Session,
    resolver: &QueryResolver,
    message: ClientMessage
) -> Vec<ServerMessage> {
    match message {
        ClientMessage::Chat { content } => {
            if content.trim().is_empty() {
                return Vec::new();
            }
            let reply = match session.submit(resolver, &content).await {
                Ok(turn) =>
                    ServerMessage::Response {
                        content: turn.text.clone(),
                        timestamp: turn.created_at.timestamp(),
                    },
                Err(SessionError::CredentialRequired) =>
                    ServerMessage::CredentialRequired {
                        message: resolver.prompts().credential_notice.clone(),
                    },
                Err(e) => ServerMessage::Error { message: e.to_string() },
            };
            vec![reply]
        }
        ClientMessage::SetCredential { key } =>
            match session.set_credential(&key) {
                Ok(()) =>
                    vec![ServerMessage::CredentialAccepted {
                        message: "API key set. You can now chat with the AI assistant!".to_string(),
                    }],
                Err(e) => vec![ServerMessage::Error { message: e.to_string() }],
            }
        ClientMessage::SkipCredential => {
            session.skip_credential();
            vec![ServerMessage::CredentialAccepted {
                message: "Continuing without an API key. Basic responses are available.".to_string(),
            }]
        }
    }
}

pub async fn handle_connection<S>(
    peer: SocketAddr,
    websocket: WebSocketStream<S>,
    resolver: Arc<QueryResolver>,
    mut session: Session
)
    where S: AsyncRead + AsyncWrite + Unpin
{
    info!("New WebSocket connection: {} (session {})", peer, session.id());

    let (mut tx, mut rx) = websocket.split();

    let welcome = ServerMessage::Welcome {
        session_id: session.id(),
        greeting: resolver.prompts().greeting.clone(),
        quick_questions: resolver.prompts().quick_questions.clone(),
        credential_required: session.state() == CredentialState::Prompting,
    };
    if let Err(e) = send(&mut tx, &welcome).await {
        error!("Failed to send welcome to {}: {}", peer, e);
        return;
    }

    while let Some(msg) = rx.next().await {
        match msg {
            Ok(message) => {
                if message.len() > MAX_MESSAGE_SIZE {
                    warn!(
                        "Message from {} exceeds size limit ({} > {})",
                        peer,
                        message.len(),
                        MAX_MESSAGE_SIZE
                    );
                    let error_msg = ServerMessage::Error {
                        message: "Message too large".to_string(),
                    };
                    if send(&mut tx, &error_msg).await.is_err() {
                        error!("Failed to send size limit error to {}", peer);
                    }
                    break;
                }

                match message {
                    Message::Text(text) => {
                        let replies = match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(client_msg) => {
                                if starts_processing(&session, &client_msg) {
                                    if let Err(e) = send(&mut tx, &ServerMessage::Processing).await {
                                        error!("Error sending processing status to {}: {}", peer, e);
                                        break;
                                    }
                                }
                                handle_client_message(&mut session, &resolver, client_msg).await
                            }
                            Err(e) => {
                                warn!("Failed to parse message from {}: {}", peer, e);
                                vec![ServerMessage::Error {
                                    message: format!("Failed to parse message: {}", e),
                                }]
                            }
                        };
                        let mut sent = true;
                        for reply in &replies {
                            if let Err(e) = send(&mut tx, reply).await {
                                error!("Error sending message to {}: {}", peer, e);
                                sent = false;
                                break;
                            }
                        }
                        if !sent {
                            break;
                        }
                    }
                    Message::Close(_) => {
                        info!("Received close frame from {}", peer);
                        break;
                    }
                    Message::Ping(ping_data) => {
                        if tx.send(Message::Pong(ping_data)).await.is_err() {
                            error!("Failed to send pong to {}", peer);
                            break;
                        }
                    }
                    Message::Pong(_) => {}
                    Message::Binary(_) => {
                        warn!("Ignoring binary message from {}", peer);
                    }
                    Message::Frame(_) => {}
                }
            }
            Err(e) => {
                match e {
                    | tungstenite::Error::ConnectionClosed
                    | tungstenite::Error::Protocol(_)
                    | tungstenite::Error::Utf8 => {
                        info!("WebSocket connection closed or protocol error for {}: {}", peer, e);
                    }
                    tungstenite::Error::Io(ref io_err) if
                        io_err.kind() == std::io::ErrorKind::ConnectionReset
                    => {
                        info!("WebSocket connection reset by peer {}", peer);
                    }
                    tungstenite::Error::Capacity(ref cap_err) => {
                        error!("WebSocket capacity error for {}: {}", peer, cap_err);
                        let error_msg = ServerMessage::Error {
                            message: "Server capacity error".to_string(),
                        };
                        if let Err(e_inner) = send(&mut tx, &error_msg).await {
                            error!("Failed to send capacity error to {}: {}", peer, e_inner);
                        }
                    }
                    _ => {
                        error!("Error receiving message from {}: {}", peer, e);
                    }
                }
                break;
            }
        }
    }
    info!(
        "WebSocket connection closed for {} (session {}, {} turns)",
        peer,
        session.id(),
        session.turns().len()
    );
}
