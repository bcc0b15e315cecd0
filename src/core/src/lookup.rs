//! Lookup functions with identity

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

use crate::gets_id::CanonicalKey;
use crate::lazy_id::LazyId;
use crate::reference::{Payload, Ref};

static NEXT_LOOK_UP_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a lookup function
///
/// Minted once per `LookUp::new`; clones of a lookup share it. Two lookups
/// with identical behaviour still have different identities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LookUpId(u64);

type LookUpFn<T, K> = dyn Fn(K) -> Ref<T> + Send + Sync;

/// A keyed lookup `K -> Ref<T>` supplied by the storage layer
///
/// The function may answer synchronously (ready, absent, failed) or return a
/// pending reference. It should not panic; if it does, the panic is captured
/// as a failed reference.
pub struct LookUp<T, K> {
    id: LookUpId,
    name: &'static str,
    f: Arc<LookUpFn<T, K>>,
}

impl<T: Payload, K: CanonicalKey> LookUp<T, K> {
    /// Wrap a lookup function, giving it a fresh identity
    pub fn new<F>(name: &'static str, f: F) -> Self
    where
        F: Fn(K) -> Ref<T> + Send + Sync + 'static,
    {
        Self {
            id: LookUpId(NEXT_LOOK_UP_ID.fetch_add(1, Ordering::Relaxed)),
            name,
            f: Arc::new(f),
        }
    }

    /// Identity of this lookup
    pub fn id(&self) -> LookUpId {
        self.id
    }

    /// Name used in logs
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Run the lookup
    pub fn call(&self, key: K) -> Ref<T> {
        trace!(look_up = self.name, ?key, "Invoking lookup");
        Ref::capture(|| (self.f)(key))
    }

    /// A lazy reference to the item under `key`
    pub fn lazy(&self, key: K) -> LazyId<T, K> {
        LazyId::of(key, self)
    }
}

impl<T, K> Clone for LookUp<T, K> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            name: self.name,
            f: Arc::clone(&self.f),
        }
    }
}

impl<T, K> PartialEq for LookUp<T, K> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T, K> Eq for LookUp<T, K> {}

impl<T, K> fmt::Debug for LookUp<T, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LookUp")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}
