use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{GroupId, MessageId, UserId};

/// Serialized envelope shared by every connection a message is pushed to.
pub type Payload = Arc<str>;

/// Top-level frame pushed over a live connection: `{"data": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PushEnvelope {
    pub data: PushMessage,
}

/// `{"type": "private" | "group", "message": {...}}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "message", rename_all = "lowercase")]
pub enum PushMessage {
    Private(PrivatePush),
    Group(GroupPush),
}

/// Private messages are addressed with `from` / `to`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PrivatePush {
    pub id: MessageId,
    pub from: UserId,
    pub to: UserId,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub sender: SenderProfile,
}

/// Group messages are addressed with `senderId` / `groupId`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GroupPush {
    pub id: MessageId,
    pub sender_id: UserId,
    pub group_id: GroupId,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub sender: SenderProfile,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SenderProfile {
    pub id: UserId,
    pub username: String,
    pub avatar: String,
}

impl PushEnvelope {
    pub fn private(message: PrivatePush) -> Self {
        Self {
            data: PushMessage::Private(message),
        }
    }

    pub fn group(message: GroupPush) -> Self {
        Self {
            data: PushMessage::Group(message),
        }
    }

    /// Serialize once; the result is cloned by reference for each target.
    pub fn to_payload(&self) -> Result<Payload, serde_json::Error> {
        serde_json::to_string(self).map(Payload::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn sender(id: UserId) -> SenderProfile {
        SenderProfile {
            id,
            username: "alice".into(),
            avatar: "a.png".into(),
        }
    }

    #[test]
    fn test_private_envelope_field_names() {
        let from = UserId::generate();
        let to = UserId::generate();
        let envelope = PushEnvelope::private(PrivatePush {
            id: MessageId::generate(),
            from,
            to,
            content: "hello".into(),
            timestamp: Utc::now(),
            sender: sender(from),
        });

        let json: Value = serde_json::from_str(&envelope.to_payload().unwrap()).unwrap();
        assert_eq!(json["data"]["type"], "private");
        let message = &json["data"]["message"];
        assert_eq!(message["from"], from.to_hex());
        assert_eq!(message["to"], to.to_hex());
        assert_eq!(message["content"], "hello");
        assert_eq!(message["sender"]["username"], "alice");
        assert!(message.get("senderId").is_none());
        assert!(message.get("groupId").is_none());
        assert!(message["timestamp"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn test_group_envelope_field_names() {
        let sender_id = UserId::generate();
        let group_id = GroupId::generate();
        let envelope = PushEnvelope::group(GroupPush {
            id: MessageId::generate(),
            sender_id,
            group_id,
            content: "hi all".into(),
            timestamp: Utc::now(),
            sender: sender(sender_id),
        });

        let json: Value = serde_json::from_str(&envelope.to_payload().unwrap()).unwrap();
        assert_eq!(json["data"]["type"], "group");
        let message = &json["data"]["message"];
        assert_eq!(message["senderId"], sender_id.to_hex());
        assert_eq!(message["groupId"], group_id.to_hex());
        assert!(message.get("from").is_none());
        assert!(message.get("to").is_none());
    }
}
