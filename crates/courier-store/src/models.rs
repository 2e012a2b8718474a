//! Domain model structs persisted in the SQLite database.
//!
//! Every struct derives `Serialize` so it can be returned directly by the
//! HTTP layer; field names follow the camelCase JSON contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use courier_shared::types::{
    FriendshipId, FriendshipStatus, GroupId, MemberRole, MembershipId, MessageId, UserId,
    UserStatus,
};

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A user profile. Credentials live elsewhere.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub avatar: String,
    /// Explicit presence field. Not tied to live connections.
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial profile update; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub email: Option<String>,
    pub avatar: Option<String>,
    pub status: Option<UserStatus>,
}

// ---------------------------------------------------------------------------
// Friendship
// ---------------------------------------------------------------------------

/// Friendship edge. Stored with a fixed orientation but looked up in both.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Friendship {
    pub id: FriendshipId,
    pub user_id: UserId,
    pub friend_id: UserId,
    pub status: FriendshipStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Friendship {
    /// The endpoint of this edge that is not `me`.
    pub fn other(&self, me: UserId) -> UserId {
        if self.user_id == me {
            self.friend_id
        } else {
            self.user_id
        }
    }
}

// ---------------------------------------------------------------------------
// Group
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub description: String,
    pub avatar: String,
    pub creator_id: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewGroup {
    pub name: String,
    pub description: String,
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GroupMember {
    pub id: MembershipId,
    pub group_id: GroupId,
    pub user_id: UserId,
    pub role: MemberRole,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// Where a message is addressed. Exactly one of receiver or group.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessageTarget {
    Private {
        #[serde(rename = "receiverId")]
        receiver_id: UserId,
    },
    Group {
        #[serde(rename = "groupId")]
        group_id: GroupId,
    },
}

impl MessageTarget {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Private { .. } => "private",
            Self::Group { .. } => "group",
        }
    }
}

/// A stored message. Immutable apart from the `read` flag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    #[serde(flatten)]
    pub target: MessageTarget,
    pub sender_id: UserId,
    pub content: String,
    /// Assigned by the store at insert time (millisecond precision).
    pub timestamp: DateTime<Utc>,
    pub read: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub sender_id: UserId,
    pub target: MessageTarget,
    pub content: String,
}
