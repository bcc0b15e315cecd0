//! Identifier types shared by lookups, catalogs and permission keys

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Explicit runtime tag naming an item type
///
/// Tags are compared by name, so two tags built from the same string are the
/// same tag. Declare them once as constants next to the item type:
///
/// ```
/// use lazyref_core::TypeTag;
///
/// pub const USER: TypeTag = TypeTag::new("User");
/// assert_eq!(USER.name(), "User");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TypeTag(&'static str);

impl TypeTag {
    /// Create a tag from a static name
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    /// The tag's name
    pub const fn name(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Type-erased canonical identifier
///
/// Raw keys arrive in whatever representation the caller had at hand (a path
/// segment, a JSON number, a UUID). `GetsId` implementations normalise them
/// into the key type of their item; `CanonicalId` is the shared currency used
/// where keys of different item types meet, such as permission keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CanonicalId {
    /// Integer key
    Int(i64),
    /// UUID key
    Uuid(Uuid),
    /// Textual key
    Text(String),
}

impl fmt::Display for CanonicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CanonicalId::Int(v) => write!(f, "{}", v),
            CanonicalId::Uuid(v) => write!(f, "{}", v),
            CanonicalId::Text(v) => f.write_str(v),
        }
    }
}

impl From<i64> for CanonicalId {
    fn from(v: i64) -> Self {
        CanonicalId::Int(v)
    }
}

impl From<i32> for CanonicalId {
    fn from(v: i32) -> Self {
        CanonicalId::Int(v.into())
    }
}

impl From<u32> for CanonicalId {
    fn from(v: u32) -> Self {
        CanonicalId::Int(v.into())
    }
}

impl From<Uuid> for CanonicalId {
    fn from(v: Uuid) -> Self {
        CanonicalId::Uuid(v)
    }
}

impl From<String> for CanonicalId {
    fn from(v: String) -> Self {
        CanonicalId::Text(v)
    }
}

impl From<&str> for CanonicalId {
    fn from(v: &str) -> Self {
        CanonicalId::Text(v.to_string())
    }
}
