use serde::{Deserialize, Serialize};

use crate::models::{UserId, UserSummary};

/// First frame a client sends after connecting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum AuthRequest {
    Register { username: String, password: String },
    Login { username: String, password: String },
}

/// Chat frame sent by an authenticated client.
/// A missing (or null) `receiver_id` addresses the global room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSend {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_id: Option<UserId>,
}

/// Frames sent FROM server TO client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Outcome of a register or login attempt
    AuthResponse { success: bool, message: String },

    /// Every registered user, not just the ones currently online
    UserList { users: Vec<UserSummary> },

    /// A chat message, live or replayed from history
    Message(ChatMessage),
}

impl ServerEvent {
    pub fn auth_ok(message: impl Into<String>) -> Self {
        Self::AuthResponse {
            success: true,
            message: message.into(),
        }
    }

    pub fn auth_failed(message: impl Into<String>) -> Self {
        Self::AuthResponse {
            success: false,
            message: message.into(),
        }
    }
}

/// Payload of a `message` frame, discriminated by `chat_type`.
///
/// Live frames leave `timestamp` empty; replayed history fills it with the
/// stored server time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "chat_type")]
pub enum ChatMessage {
    #[serde(rename = "global")]
    Global {
        username: String,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<String>,
    },

    #[serde(rename = "dm")]
    Direct {
        username: String,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<String>,
        sender_id: UserId,
        receiver_id: UserId,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_auth_actions() {
        let req: AuthRequest =
            serde_json::from_str(r#"{"action":"login","username":"alice","password":"pw1"}"#)
                .unwrap();
        assert_eq!(
            req,
            AuthRequest::Login {
                username: "alice".into(),
                password: "pw1".into(),
            }
        );
    }

    #[test]
    fn rejects_unknown_action() {
        let res = serde_json::from_str::<AuthRequest>(
            r#"{"action":"delete","username":"alice","password":"pw1"}"#,
        );
        assert!(res.is_err());
    }

    #[test]
    fn rejects_auth_without_password() {
        let res = serde_json::from_str::<AuthRequest>(r#"{"action":"login","username":"alice"}"#);
        assert!(res.is_err());
    }

    #[test]
    fn chat_send_receiver_is_optional() {
        let global: ChatSend = serde_json::from_str(r#"{"content":"hi"}"#).unwrap();
        assert_eq!(global.receiver_id, None);

        let null: ChatSend = serde_json::from_str(r#"{"content":"hi","receiver_id":null}"#).unwrap();
        assert_eq!(null.receiver_id, None);

        let dm: ChatSend = serde_json::from_str(r#"{"content":"hi","receiver_id":7}"#).unwrap();
        assert_eq!(dm.receiver_id, Some(7));

        assert!(serde_json::from_str::<ChatSend>(r#"{"receiver_id":7}"#).is_err());
    }

    #[test]
    fn direct_message_wire_shape() {
        let event = ServerEvent::Message(ChatMessage::Direct {
            username: "alice".into(),
            content: "hi".into(),
            timestamp: None,
            sender_id: 1,
            receiver_id: 2,
        });

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "message",
                "chat_type": "dm",
                "username": "alice",
                "content": "hi",
                "sender_id": 1,
                "receiver_id": 2,
            })
        );
    }

    #[test]
    fn replayed_global_message_carries_timestamp() {
        let event = ServerEvent::Message(ChatMessage::Global {
            username: "bob".into(),
            content: "morning".into(),
            timestamp: Some("2026-10-19 08:00:00.000000".into()),
        });

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "message");
        assert_eq!(value["chat_type"], "global");
        assert_eq!(value["timestamp"], "2026-10-19 08:00:00.000000");
        assert!(value.get("sender_id").is_none());
    }

    #[test]
    fn user_list_wire_shape() {
        let event = ServerEvent::UserList {
            users: vec![UserSummary {
                id: 1,
                username: "alice".into(),
            }],
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({"type": "user_list", "users": [{"id": 1, "username": "alice"}]})
        );
    }

    #[test]
    fn unknown_event_tag_is_rejected() {
        let res = serde_json::from_str::<ServerEvent>(r#"{"type":"typing","user_id":1}"#);
        assert!(res.is_err());
    }
}
