//! Error types for deferred references
//!
//! `RefError` is the cause carried by a failed `Ref`. A pending result is
//! shared by every holder of the reference, so the error is cheaply clonable;
//! arbitrary storage-layer failures are kept behind an `Arc`.

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::Arc;
use thiserror::Error;

use crate::types::TypeTag;

/// Authorization denial carrying a human-readable reason
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Error)]
#[error("Refused: {reason}")]
pub struct Refused {
    /// Why the request was refused
    pub reason: String,
}

impl Refused {
    /// Create a refusal
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Failure cause of a reference
#[derive(Debug, Clone, Error)]
pub enum RefError {
    /// Permission denied
    #[error(transparent)]
    Refused(#[from] Refused),

    /// No lookup registered in the catalog for the tag
    #[error("No lookup registered for type {0}")]
    UnregisteredType(TypeTag),

    /// The catalog lookup registered for the tag has a different signature
    #[error("Lookup registered for type {tag} is not a {expected}")]
    TypeMismatch {
        tag: TypeTag,
        expected: &'static str,
    },

    /// A raw key could not be normalised
    #[error("Invalid {expected} id: {raw}")]
    InvalidId {
        expected: &'static str,
        raw: String,
    },

    /// Underlying lookup failure (storage, transport, timeout)
    #[error("Lookup failed: {0}")]
    Lookup(Arc<anyhow::Error>),

    /// A composed function or future panicked
    #[error("Computation panicked: {0}")]
    Panicked(String),

    /// The producer of a pending value went away before settling it
    #[error("Pending computation was dropped before settling")]
    Dropped,
}

impl RefError {
    /// Wrap any storage-layer error
    pub fn lookup<E>(err: E) -> Self
    where
        E: Into<anyhow::Error>,
    {
        RefError::Lookup(Arc::new(err.into()))
    }

    /// The refusal, if this is an authorization denial
    pub fn as_refused(&self) -> Option<&Refused> {
        match self {
            RefError::Refused(refused) => Some(refused),
            _ => None,
        }
    }

    /// Whether this is an authorization denial
    pub fn is_refused(&self) -> bool {
        self.as_refused().is_some()
    }

    pub(crate) fn panicked(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        RefError::Panicked(message)
    }
}

impl From<anyhow::Error> for RefError {
    fn from(err: anyhow::Error) -> Self {
        RefError::Lookup(Arc::new(err))
    }
}

impl From<futures::channel::oneshot::Canceled> for RefError {
    fn from(_: futures::channel::oneshot::Canceled) -> Self {
        RefError::Dropped
    }
}

/// Result type for reference operations
pub type Result<T> = std::result::Result<T, RefError>;
