//! WebSocket streaming API.

#![allow(missing_docs)]

use std::collections::HashMap;

use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use mozo_core::{RealtimeEvent, Staff, WireEvent, topics};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::middleware::AppState;

/// Streaming query parameters.
#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    /// API token, for clients that cannot set headers on the upgrade.
    pub token: Option<String>,
}

/// Client-to-server message.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Connect to a channel: `business` (staff) or `table` with `params.tableId`.
    Connect {
        channel: String,
        id: String,
        #[serde(default)]
        params: serde_json::Value,
    },
    Disconnect {
        id: String,
    },
}

/// Server-to-client message.
#[derive(Debug, Serialize)]
#[serde(tag = "type", content = "body", rename_all = "camelCase")]
pub enum ServerMessage {
    Connected {
        id: String,
    },
    /// The channel could not be joined.
    Rejected {
        id: String,
        reason: String,
    },
    Channel {
        id: String,
        #[serde(flatten)]
        event: WireEvent,
    },
}

/// WebSocket handler for streaming.
pub async fn streaming_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<StreamQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    debug!("New streaming connection");

    ws.on_upgrade(move |socket| handle_socket(socket, query, state))
}

async fn authenticate(state: &AppState, token: &str) -> Option<Staff> {
    let user = match state.user_repository.find_by_token(token).await {
        Ok(Some(user)) => user,
        Ok(None) => return None,
        Err(e) => {
            warn!(error = %e, "Streaming auth failed");
            return None;
        }
    };

    match state.profile_service.staff(user).await {
        Ok(staff) if staff.ensure_profile().is_ok() => Some(staff),
        Ok(_) => None,
        Err(e) => {
            warn!(error = %e, "Streaming profile lookup failed");
            None
        }
    }
}

/// Handle a WebSocket connection.
async fn handle_socket(socket: WebSocket, query: StreamQuery, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    let staff = match &query.token {
        Some(token) => authenticate(&state, token).await,
        None => None,
    };

    info!(user_id = ?staff.as_ref().map(Staff::id), "Streaming connection established");

    let mut events = state.events.subscribe();
    // connection id -> topic
    let mut connected: HashMap<String, String> = HashMap::new();

    loop {
        tokio::select! {
            msg = receiver.next() => {
                let Some(msg) = msg else { break };
                match msg {
                    Ok(Message::Text(text)) => {
                        let reply = match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(client_msg) => {
                                handle_client_message(client_msg, &mut connected, staff.as_ref())
                            }
                            Err(e) => {
                                warn!(error = %e, "Failed to parse client message");
                                None
                            }
                        };
                        if let Some(reply) = reply
                            && send(&mut sender, &reply).await.is_err()
                        {
                            break;
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(Message::Ping(data)) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        debug!(error = %e, "WebSocket error");
                        break;
                    }
                }
            }

            event = events.recv() => {
                match event {
                    Ok(event) => {
                        if forward(&mut sender, &connected, &event).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Streaming subscriber lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    info!("Streaming connection closed");
}

type WsSender = futures::stream::SplitSink<WebSocket, Message>;

async fn send(sender: &mut WsSender, msg: &ServerMessage) -> Result<(), axum::Error> {
    let json = serde_json::to_string(msg).unwrap_or_default();
    sender.send(Message::Text(json.into())).await
}

async fn forward(
    sender: &mut WsSender,
    connected: &HashMap<String, String>,
    event: &RealtimeEvent,
) -> Result<(), axum::Error> {
    for (id, topic) in connected {
        if event.matches_topic(topic) {
            let msg = ServerMessage::Channel {
                id: id.clone(),
                event: event.to_wire(),
            };
            send(sender, &msg).await?;
        }
    }
    Ok(())
}

/// Resolve a client message into a subscription change.
fn handle_client_message(
    msg: ClientMessage,
    connected: &mut HashMap<String, String>,
    staff: Option<&Staff>,
) -> Option<ServerMessage> {
    match msg {
        ClientMessage::Connect {
            channel,
            id,
            params,
        } => {
            let topic = match channel.as_str() {
                "business" => match staff {
                    Some(staff) => topics::business(staff.business_id()),
                    None => {
                        return Some(ServerMessage::Rejected {
                            id,
                            reason: "staff authentication required".to_string(),
                        });
                    }
                },
                "table" => match params.get("tableId").and_then(|v| v.as_str()) {
                    Some(table_id) => topics::table(table_id),
                    None => {
                        return Some(ServerMessage::Rejected {
                            id,
                            reason: "tableId is required".to_string(),
                        });
                    }
                },
                other => {
                    return Some(ServerMessage::Rejected {
                        id,
                        reason: format!("unknown channel: {other}"),
                    });
                }
            };

            debug!(topic = %topic, id = %id, "Channel connected");
            connected.insert(id.clone(), topic);
            Some(ServerMessage::Connected { id })
        }
        ClientMessage::Disconnect { id } => {
            connected.remove(&id);
            debug!(id = %id, "Channel disconnected");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mozo_core::{Profile, SilencePayload};
    use mozo_db::entities::user;

    fn staff() -> Staff {
        Staff {
            user: user::Model {
                id: "w1".to_string(),
                business_id: "b1".to_string(),
                name: "Ana".to_string(),
                email: "ana@example.com".to_string(),
                role: user::UserRole::Waiter,
                api_token: "token".to_string(),
                created_at: chrono::Utc::now().fixed_offset(),
                updated_at: None,
            },
            profile: Profile::None,
        }
    }

    fn connect(channel: &str, params: serde_json::Value) -> ClientMessage {
        ClientMessage::Connect {
            channel: channel.to_string(),
            id: "1".to_string(),
            params,
        }
    }

    #[test]
    fn test_business_channel_requires_staff() {
        let mut connected = HashMap::new();

        let reply = handle_client_message(
            connect("business", serde_json::Value::Null),
            &mut connected,
            None,
        );
        assert!(matches!(reply, Some(ServerMessage::Rejected { .. })));
        assert!(connected.is_empty());

        let reply = handle_client_message(
            connect("business", serde_json::Value::Null),
            &mut connected,
            Some(&staff()),
        );
        assert!(matches!(reply, Some(ServerMessage::Connected { .. })));
        assert_eq!(connected["1"], "business:b1");
    }

    #[test]
    fn test_table_channel_is_public() {
        let mut connected = HashMap::new();

        handle_client_message(
            connect("table", serde_json::json!({"tableId": "t5"})),
            &mut connected,
            None,
        );
        assert_eq!(connected["1"], "table:t5");

        handle_client_message(
            ClientMessage::Disconnect {
                id: "1".to_string(),
            },
            &mut connected,
            None,
        );
        assert!(connected.is_empty());
    }

    #[test]
    fn test_client_message_parsing() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{"type":"connect","body":{"channel":"table","id":"a","params":{"tableId":"t5"}}}"#,
        )
        .unwrap();
        assert!(matches!(msg, ClientMessage::Connect { .. }));
    }

    #[test]
    fn test_channel_message_shape() {
        let msg = ServerMessage::Channel {
            id: "a".to_string(),
            event: WireEvent::Silence(SilencePayload {
                table_id: "t5".to_string(),
                silenced: false,
                reason: None,
                expires_at: None,
            }),
        };

        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "channel");
        assert_eq!(json["body"]["id"], "a");
        assert_eq!(json["body"]["type"], "silence");
        assert_eq!(json["body"]["body"]["table_id"], "t5");
    }
}
