use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::constants::RECORD_ID_LEN;
use crate::error::IdError;

static RECORD_COUNTER: AtomicU32 = AtomicU32::new(0);

/// 12-byte record identifier, rendered as 24 hex characters.
///
/// Layout: 4-byte big-endian Unix seconds, 5 random bytes, 3-byte counter.
/// Freshly generated ids sort roughly by creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(pub [u8; RECORD_ID_LEN]);

impl RecordId {
    pub fn generate() -> Self {
        let secs = chrono::Utc::now().timestamp() as u32;
        let random: [u8; 5] = rand::random();
        let count = RECORD_COUNTER.fetch_add(1, Ordering::Relaxed);

        let mut bytes = [0u8; RECORD_ID_LEN];
        bytes[..4].copy_from_slice(&secs.to_be_bytes());
        bytes[4..9].copy_from_slice(&random);
        bytes[9..].copy_from_slice(&count.to_be_bytes()[1..]);
        Self(bytes)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, IdError> {
        if s.len() != RECORD_ID_LEN * 2 {
            return Err(IdError::Length(s.len()));
        }
        let bytes = hex::decode(s)?;
        let mut arr = [0u8; RECORD_ID_LEN];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

// Typed wrappers so a group id can never be passed where a user id is expected.
// They all serialize as the bare hex string.
macro_rules! record_id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub RecordId);

        impl $name {
            pub fn generate() -> Self {
                Self(RecordId::generate())
            }

            pub fn to_hex(&self) -> String {
                self.0.to_hex()
            }

            pub fn from_hex(s: &str) -> Result<Self, IdError> {
                RecordId::from_hex(s).map(Self)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_hex(s)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                Self::from_hex(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

record_id_type!(
    /// A user identity.
    UserId
);
record_id_type!(GroupId);
record_id_type!(MessageId);
record_id_type!(FriendshipId);
record_id_type!(MembershipId);

/// Server-generated identifier of one live connection. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Profile presence field. Set explicitly through profile updates only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Online,
    Offline,
    Away,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
            Self::Away => "away",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "online" => Some(Self::Online),
            "offline" => Some(Self::Offline),
            "away" => Some(Self::Away),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FriendshipStatus {
    Pending,
    Accepted,
    Rejected,
}

impl FriendshipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Admin,
    Member,
}

impl MemberRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Member => "member",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Self::Admin),
            "member" => Some(Self::Member),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_unique_and_parse_back() {
        let a = MessageId::generate();
        let b = MessageId::generate();
        assert_ne!(a, b);

        let hex = a.to_hex();
        assert_eq!(hex.len(), 24);
        assert_eq!(MessageId::from_hex(&hex).unwrap(), a);
    }

    #[test]
    fn test_malformed_ids_rejected() {
        assert_eq!(UserId::from_hex("abcd"), Err(IdError::Length(4)));
        assert!(UserId::from_hex("not-a-hex-value-at-all!!").is_err());
        assert!(UserId::from_hex("").is_err());
    }

    #[test]
    fn test_non_hex_of_valid_length_is_hex_error() {
        let err = UserId::from_hex("zz0000000000000000000000").unwrap_err();
        assert_eq!(
            err,
            IdError::Hex(hex::FromHexError::InvalidHexCharacter { c: 'z', index: 0 })
        );
        assert!(err.to_string().starts_with("Invalid id hex"));
    }

    #[test]
    fn test_uppercase_hex_accepted() {
        let id = GroupId::from_hex("65A1B2C3D4E5F60718293A4B").unwrap();
        assert_eq!(id.to_hex(), "65a1b2c3d4e5f60718293a4b");
    }

    #[test]
    fn test_id_serializes_as_hex_string() {
        let id = UserId::generate();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.to_hex()));
    }

    #[test]
    fn test_status_names() {
        assert_eq!(UserStatus::parse("away"), Some(UserStatus::Away));
        assert_eq!(UserStatus::parse("busy"), None);
        assert_eq!(MemberRole::Admin.as_str(), "admin");
        assert_eq!(
            FriendshipStatus::parse(FriendshipStatus::Rejected.as_str()),
            Some(FriendshipStatus::Rejected)
        );
    }
}
