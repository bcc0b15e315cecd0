//! Approval and refusal payloads

use lazyref_core::Ref;
use serde::{Deserialize, Serialize};

pub use lazyref_core::Refused;

/// Marker for a granted permission, optionally saying why
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Approved {
    /// Human-readable reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Approved {
    /// Approval without a reason
    pub fn new() -> Self {
        Self { reason: None }
    }

    /// Approval with a reason
    pub fn because(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
        }
    }
}

impl From<Approved> for Ref<Approved> {
    fn from(approved: Approved) -> Self {
        Ref::Ready(approved)
    }
}
