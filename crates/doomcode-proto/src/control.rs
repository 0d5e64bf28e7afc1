//! Plaintext control frames (§4.4, §6) and the relay's error-code catalog.
//!
//! Control frames are the only thing the relay itself originates or
//! terminates. They never carry ciphertext; the `action` field is what
//! disambiguates them from envelope frames on the shared transport (see
//! [`crate::frame`]).

use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::model::Role;

/// Error codes the relay returns in `error` control frames (§6, §7).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    SessionNotFound,
    AlreadyConnected,
    NotJoined,
    InternalError,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorCode::SessionNotFound => "SESSION_NOT_FOUND",
            ErrorCode::AlreadyConnected => "ALREADY_CONNECTED",
            ErrorCode::NotJoined => "NOT_JOINED",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        };
        f.write_str(s)
    }
}

/// Plaintext control frames shared by both transport directions (§4.4, §6).
///
/// Tagged on `action`; client-originated and relay-originated variants share
/// one enum because they share one transport and one decode path.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ControlFrame {
    /// Client → relay. Controller only; allocates a fresh session.
    Create { public_key: String },

    /// Client → relay. Join an existing session in the given role.
    Join {
        session_id: String,
        role: Role,
        public_key: String,
    },

    /// Client → relay. Equivalent to closing the connection.
    Leave,

    /// Client → relay. Operator acknowledges delivery up to `last_message_id`.
    Ack {
        session_id: String,
        last_message_id: String,
    },

    /// Client → relay. Request the current queue depth for a session.
    QueueStatus { session_id: String },

    /// Relay → client. Reply to `create`.
    SessionCreated { session_id: String },

    /// Relay → client. Reply to a successful `join`.
    SessionJoined {
        #[serde(skip_serializing_if = "Option::is_none")]
        peer_public_key: Option<String>,
    },

    /// Relay → client. The peer side of a session just joined.
    PeerConnected {
        peer_public_key: String,
        peer_type: Role,
    },

    /// Relay → client. The peer side of a session just disconnected.
    PeerDisconnected { peer_type: Role },

    /// Relay → client. Reply to `queue_status`, and unsolicited before replay
    /// (§8, "offline queue and drain").
    #[serde(rename = "queue_status")]
    QueueStatusReply {
        queued_messages: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        oldest_timestamp: Option<i64>,
    },

    /// Relay → client. Any rejected operation.
    Error { code: ErrorCode, message: String },

    /// Relay → client. Liveness probe of an incumbent slot-holder (§4.4).
    /// Superseded on the wire by native transport ping where the transport
    /// offers one (§9 open question); kept so a non-native transport still
    /// has a way to express the same probe.
    Ping,
}

/// `ControlFrame` is internally tagged on `action`, but two variants share the
/// tag `"queue_status"`: the client's request (`QueueStatus`, declared first)
/// and the relay's reply (`QueueStatusReply`). A derived `Deserialize` always
/// resolves a tag to the first-declared matching variant, so every
/// `queue_status` frame — including replies, which carry no `sessionId` at
/// all — would be (mis)parsed as a request and fail. Disambiguate the same
/// way `frame.rs` tells control frames from envelope frames: by field
/// presence, before handing off to the derive machinery.
///
/// This shadow mirrors `ControlFrame` field-for-field but gives the request
/// variant its own unambiguous wire tag, so the derived `Deserialize` below
/// never has to choose between two variants for one tag.
#[derive(Deserialize)]
#[serde(tag = "action", rename_all = "snake_case", rename_all_fields = "camelCase")]
enum ControlFrameShadow {
    Create {
        public_key: String,
    },
    Join {
        session_id: String,
        role: Role,
        public_key: String,
    },
    Leave,
    Ack {
        session_id: String,
        last_message_id: String,
    },
    #[serde(rename = "queue_status_request")]
    QueueStatus {
        session_id: String,
    },
    SessionCreated {
        session_id: String,
    },
    SessionJoined {
        #[serde(default)]
        peer_public_key: Option<String>,
    },
    PeerConnected {
        peer_public_key: String,
        peer_type: Role,
    },
    PeerDisconnected {
        peer_type: Role,
    },
    #[serde(rename = "queue_status")]
    QueueStatusReply {
        queued_messages: usize,
        #[serde(default)]
        oldest_timestamp: Option<i64>,
    },
    Error {
        code: ErrorCode,
        message: String,
    },
    Ping,
}

impl From<ControlFrameShadow> for ControlFrame {
    fn from(shadow: ControlFrameShadow) -> Self {
        match shadow {
            ControlFrameShadow::Create { public_key } => ControlFrame::Create { public_key },
            ControlFrameShadow::Join {
                session_id,
                role,
                public_key,
            } => ControlFrame::Join {
                session_id,
                role,
                public_key,
            },
            ControlFrameShadow::Leave => ControlFrame::Leave,
            ControlFrameShadow::Ack {
                session_id,
                last_message_id,
            } => ControlFrame::Ack {
                session_id,
                last_message_id,
            },
            ControlFrameShadow::QueueStatus { session_id } => {
                ControlFrame::QueueStatus { session_id }
            }
            ControlFrameShadow::SessionCreated { session_id } => {
                ControlFrame::SessionCreated { session_id }
            }
            ControlFrameShadow::SessionJoined { peer_public_key } => {
                ControlFrame::SessionJoined { peer_public_key }
            }
            ControlFrameShadow::PeerConnected {
                peer_public_key,
                peer_type,
            } => ControlFrame::PeerConnected {
                peer_public_key,
                peer_type,
            },
            ControlFrameShadow::PeerDisconnected { peer_type } => {
                ControlFrame::PeerDisconnected { peer_type }
            }
            ControlFrameShadow::QueueStatusReply {
                queued_messages,
                oldest_timestamp,
            } => ControlFrame::QueueStatusReply {
                queued_messages,
                oldest_timestamp,
            },
            ControlFrameShadow::Error { code, message } => ControlFrame::Error { code, message },
            ControlFrameShadow::Ping => ControlFrame::Ping,
        }
    }
}

impl<'de> Deserialize<'de> for ControlFrame {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let mut value = Value::deserialize(deserializer)?;

        // A `queue_status` frame with no `queuedMessages` field is the
        // client's request; retag it so the shadow enum's derive sees a
        // unique tag per variant. A reply is already unambiguous as-is.
        let is_request = value.get("action").and_then(Value::as_str) == Some("queue_status")
            && value.get("queuedMessages").is_none();
        if is_request {
            match value.as_object_mut() {
                Some(obj) => {
                    obj.insert(
                        "action".to_string(),
                        Value::String("queue_status_request".to_string()),
                    );
                }
                None => return Err(de::Error::custom("control frame must be a JSON object")),
            }
        }

        ControlFrameShadow::deserialize(value)
            .map(ControlFrame::from)
            .map_err(de::Error::custom)
    }
}

impl ControlFrame {
    pub fn session_not_found(message: impl Into<String>) -> Self {
        ControlFrame::Error {
            code: ErrorCode::SessionNotFound,
            message: message.into(),
        }
    }

    pub fn already_connected(message: impl Into<String>) -> Self {
        ControlFrame::Error {
            code: ErrorCode::AlreadyConnected,
            message: message.into(),
        }
    }

    pub fn not_joined(message: impl Into<String>) -> Self {
        ControlFrame::Error {
            code: ErrorCode::NotJoined,
            message: message.into(),
        }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        ControlFrame::Error {
            code: ErrorCode::InternalError,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_roundtrips_with_action_tag() {
        let frame = ControlFrame::Create {
            public_key: "abc".into(),
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["action"], "create");
        let back: ControlFrame = serde_json::from_value(json).unwrap();
        assert_eq!(back, frame);
    }

    #[test]
    fn queue_status_reply_shares_action_name_with_request() {
        let request = ControlFrame::QueueStatus {
            session_id: "s1".into(),
        };
        let reply = ControlFrame::QueueStatusReply {
            queued_messages: 3,
            oldest_timestamp: Some(100),
        };
        let request_json = serde_json::to_value(&request).unwrap();
        let reply_json = serde_json::to_value(&reply).unwrap();
        assert_eq!(request_json["action"], "queue_status");
        assert_eq!(reply_json["action"], "queue_status");
    }

    #[test]
    fn decodes_queue_status_request_and_reply_despite_shared_tag() {
        let request = ControlFrame::QueueStatus {
            session_id: "s1".into(),
        };
        let reply = ControlFrame::QueueStatusReply {
            queued_messages: 3,
            oldest_timestamp: Some(100),
        };

        let decoded_request: ControlFrame =
            serde_json::from_value(serde_json::to_value(&request).unwrap()).unwrap();
        let decoded_reply: ControlFrame =
            serde_json::from_value(serde_json::to_value(&reply).unwrap()).unwrap();

        assert_eq!(decoded_request, request);
        assert_eq!(decoded_reply, reply);
    }

    #[test]
    fn decodes_queue_status_reply_with_no_oldest_timestamp() {
        let json = serde_json::json!({
            "action": "queue_status",
            "queuedMessages": 0,
        });
        let frame: ControlFrame = serde_json::from_value(json).unwrap();
        assert_eq!(
            frame,
            ControlFrame::QueueStatusReply {
                queued_messages: 0,
                oldest_timestamp: None,
            }
        );
    }

    #[test]
    fn session_joined_omits_absent_peer_key() {
        let frame = ControlFrame::SessionJoined {
            peer_public_key: None,
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert!(json.get("peerPublicKey").is_none() || json.get("peer_public_key").is_none());
    }

    #[test]
    fn error_code_display_matches_wire_form() {
        assert_eq!(ErrorCode::SessionNotFound.to_string(), "SESSION_NOT_FOUND");
        assert_eq!(ErrorCode::AlreadyConnected.to_string(), "ALREADY_CONNECTED");
    }

    #[test]
    fn decodes_relay_originated_error_frame() {
        let json = serde_json::json!({
            "action": "error",
            "code": "SESSION_NOT_FOUND",
            "message": "no such session",
        });
        let frame: ControlFrame = serde_json::from_value(json).unwrap();
        assert_eq!(
            frame,
            ControlFrame::Error {
                code: ErrorCode::SessionNotFound,
                message: "no such session".into(),
            }
        );
    }
}
