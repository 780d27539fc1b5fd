use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::ModelError;

/// Numeric permission level of a connected peer. Higher means more privileged.
pub type PermissionLevel = u32;

/// Identifier of a spawn task, assigned monotonically by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpawnTaskId(pub u64);

/// Identifier of a registered spawner, assigned monotonically by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpawnerId(pub u64);

macro_rules! numeric_id {
    ($ty:ident) => {
        impl $ty {
            #[inline]
            pub fn get(self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $ty {
            fn from(v: u64) -> Self {
                Self(v)
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $ty {
            type Err = ModelError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim()
                    .parse::<u64>()
                    .map(Self)
                    .map_err(|_| ModelError::InvalidId(s.to_string()))
            }
        }
    };
}

numeric_id!(SpawnTaskId);
numeric_id!(SpawnerId);

/// Network identity of a connected party (requester, worker or spawned process).
///
/// The transport decides what the string is: a connection id, a node name, a session token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for PeerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A caller as seen by the coordinator: who it is and what it may do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    pub id: PeerId,
    #[serde(default)]
    pub permission: PermissionLevel,
}

impl Peer {
    pub fn new(id: impl Into<PeerId>, permission: PermissionLevel) -> Self {
        Self {
            id: id.into(),
            permission,
        }
    }

    /// Peer with the lowest permission level.
    pub fn anonymous(id: impl Into<PeerId>) -> Self {
        Self::new(id, 0)
    }

    #[inline]
    pub fn has_permission(&self, required: PermissionLevel) -> bool {
        self.permission >= required
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_ids_parse_and_display() {
        let id: SpawnTaskId = " 42 ".parse().unwrap();
        assert_eq!(id, SpawnTaskId(42));
        assert_eq!(id.to_string(), "42");
        assert!("abc".parse::<SpawnerId>().is_err());
    }

    #[test]
    fn ids_serialize_transparently() {
        assert_eq!(serde_json::to_string(&SpawnerId(7)).unwrap(), "7");
        assert_eq!(serde_json::to_string(&PeerId::from("w-1")).unwrap(), "\"w-1\"");
    }

    #[test]
    fn permission_check_is_inclusive() {
        let peer = Peer::new("admin", 10);
        assert!(peer.has_permission(10));
        assert!(!peer.has_permission(11));
        assert!(Peer::anonymous("x").has_permission(0));
    }
}
