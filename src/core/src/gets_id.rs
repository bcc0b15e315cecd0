//! Canonical id policies
//!
//! A `GetsId` is a pure normalisation policy for one item type: it extracts
//! the canonical key from a loaded item and converts raw keys of
//! possibly-wrong representation (a numeric id that arrived as text, say)
//! into that key type.

use std::any::type_name;
use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{RefError, Result};
use crate::types::CanonicalId;

/// Key types that can round-trip through `CanonicalId`
pub trait CanonicalKey: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static {
    /// Type-erased form of the key
    fn to_canonical(&self) -> CanonicalId;

    /// Normalise a raw key into this key type
    fn from_canonical(raw: &CanonicalId) -> Result<Self>;
}

fn invalid<K>(raw: &CanonicalId) -> RefError {
    RefError::InvalidId {
        expected: type_name::<K>(),
        raw: raw.to_string(),
    }
}

impl CanonicalKey for i64 {
    fn to_canonical(&self) -> CanonicalId {
        CanonicalId::Int(*self)
    }

    fn from_canonical(raw: &CanonicalId) -> Result<Self> {
        match raw {
            CanonicalId::Int(v) => Ok(*v),
            CanonicalId::Text(s) => s.trim().parse().map_err(|_| invalid::<i64>(raw)),
            CanonicalId::Uuid(_) => Err(invalid::<i64>(raw)),
        }
    }
}

impl CanonicalKey for String {
    fn to_canonical(&self) -> CanonicalId {
        CanonicalId::Text(self.clone())
    }

    fn from_canonical(raw: &CanonicalId) -> Result<Self> {
        Ok(raw.to_string())
    }
}

impl CanonicalKey for Uuid {
    fn to_canonical(&self) -> CanonicalId {
        CanonicalId::Uuid(*self)
    }

    fn from_canonical(raw: &CanonicalId) -> Result<Self> {
        match raw {
            CanonicalId::Uuid(v) => Ok(*v),
            CanonicalId::Text(s) => Uuid::parse_str(s.trim()).map_err(|_| invalid::<Uuid>(raw)),
            CanonicalId::Int(_) => Err(invalid::<Uuid>(raw)),
        }
    }
}

/// Canonical id policy for items of type `T`
pub trait GetsId<T>: Send + Sync + 'static {
    /// Canonical key type
    type Key: CanonicalKey;

    /// The key of a loaded item
    fn id_of(&self, item: &T) -> Self::Key;

    /// Normalise a raw key
    fn canonical(&self, raw: &CanonicalId) -> Result<Self::Key> {
        Self::Key::from_canonical(raw)
    }
}

impl<T, G: GetsId<T>> GetsId<T> for Arc<G> {
    type Key = G::Key;

    fn id_of(&self, item: &T) -> Self::Key {
        (**self).id_of(item)
    }

    fn canonical(&self, raw: &CanonicalId) -> Result<Self::Key> {
        (**self).canonical(raw)
    }
}

/// `GetsId` built from a key-extracting function
pub struct IdBy<F, K> {
    f: F,
    _key: PhantomData<fn() -> K>,
}

/// Policy extracting the key with `f` and normalising raw keys by key type
///
/// ```
/// use lazyref_core::{id_by, CanonicalId, GetsId};
///
/// struct User { id: i64 }
///
/// let ids = id_by(|u: &User| u.id);
/// assert_eq!(ids.id_of(&User { id: 3 }), 3);
/// assert_eq!(ids.canonical(&CanonicalId::from("3")).unwrap(), 3);
/// ```
pub fn id_by<T, K, F>(f: F) -> IdBy<F, K>
where
    F: Fn(&T) -> K + Send + Sync + 'static,
    K: CanonicalKey,
{
    IdBy {
        f,
        _key: PhantomData,
    }
}

impl<T, K, F> GetsId<T> for IdBy<F, K>
where
    F: Fn(&T) -> K + Send + Sync + 'static,
    K: CanonicalKey,
{
    type Key = K;

    fn id_of(&self, item: &T) -> K {
        (self.f)(item)
    }
}
