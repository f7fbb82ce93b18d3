use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

id_newtype!(UserId);
id_newtype!(DeviceId);
id_newtype!(TransactionId);
id_newtype!(RoomId);
id_newtype!(GroupId);

/// Identity of the signed-in account on this client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub user_id: UserId,
    /// Absent only for half-initialised sessions.
    pub device_id: Option<DeviceId>,
}

/// Server-side view of one of the account's devices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub device_id: DeviceId,
    pub user_id: UserId,
    pub display_name: Option<String>,
    pub last_seen_ip: Option<String>,
    pub last_seen_at: Option<DateTime<Utc>>,
}

impl DeviceInfo {
    pub fn display_name_or_id(&self) -> &str {
        self.display_name
            .as_deref()
            .unwrap_or_else(|| self.device_id.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustLevel {
    Verified,
    Unverified,
    Blocked,
}

/// Crypto-store view of a device: its keys and how far we trust them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CryptoDeviceInfo {
    pub device_id: DeviceId,
    pub user_id: UserId,
    pub display_name: Option<String>,
    pub trust: TrustLevel,
    /// Algorithm-prefixed public keys, e.g. `ed25519:DEVICE`.
    pub keys: Vec<(String, String)>,
}

impl CryptoDeviceInfo {
    pub fn is_verified(&self) -> bool {
        self.trust == TrustLevel::Verified
    }

    /// Metadata-only projection used to show something before the server answers.
    pub fn to_device_info(&self) -> DeviceInfo {
        DeviceInfo {
            device_id: self.device_id.clone(),
            user_id: self.user_id.clone(),
            display_name: self.display_name.clone(),
            last_seen_ip: None,
            last_seen_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Membership {
    Invite,
    Join,
    Leave,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSummary {
    pub room_id: RoomId,
    pub display_name: String,
    pub membership: Membership,
    pub unread_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSummary {
    pub group_id: GroupId,
    pub display_name: String,
    pub membership: Membership,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SyncState {
    Idle,
    InitialSync,
    Running { after_pause: bool },
    Paused,
    Killing,
    Killed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pusher {
    pub push_key: String,
    pub app_id: String,
    pub app_display_name: Option<String>,
    pub device_display_name: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Presence {
    Online,
    #[default]
    Offline,
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub user_id: UserId,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub presence: Presence,
}

impl User {
    /// Stand-in published until the session has seen anything for `user_id`.
    pub fn placeholder(user_id: UserId) -> Self {
        Self {
            user_id,
            display_name: None,
            avatar_url: None,
            presence: Presence::default(),
        }
    }
}
