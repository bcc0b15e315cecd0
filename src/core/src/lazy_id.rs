//! Lazy identity references
//!
//! A `LazyId` pairs a key with the lookup that resolves it. The key is known
//! up front, so the id is available without any suspension; the item is
//! looked up on first use and memoized for the lifetime of the instance.
//!
//! Equality is identity-based: same key and same lookup function (or same
//! catalog and type tag). Whether the memo has been filled never matters.

use std::fmt;
use std::hash::{Hash, Hasher};
use tracing::debug;

use crate::catalog::{CatalogId, LookupCatalog};
use crate::gets_id::CanonicalKey;
use crate::lookup::{LookUp, LookUpId};
use crate::memo::Memo;
use crate::reference::{Payload, Ref, Resolve};
use crate::types::TypeTag;

/// Where a `LazyId` gets its item from
pub(crate) enum Source<T, K> {
    Direct(LookUp<T, K>),
    Catalog {
        catalog: LookupCatalog,
        tag: TypeTag,
    },
}

impl<T, K> Clone for Source<T, K> {
    fn clone(&self) -> Self {
        match self {
            Source::Direct(look_up) => Source::Direct(look_up.clone()),
            Source::Catalog { catalog, tag } => Source::Catalog {
                catalog: catalog.clone(),
                tag: *tag,
            },
        }
    }
}

/// Identity of a `LazyId`'s lookup, used as the second half of cache keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceId {
    /// Bound directly to a lookup function
    LookUp(LookUpId),
    /// Bound through a catalog registration
    Catalog { catalog: CatalogId, tag: TypeTag },
}

/// Things whose canonical id is known without resolving them
pub trait ImmediateId {
    type Key: CanonicalKey;

    fn immediate_id(&self) -> Self::Key;
}

/// A key bound to a lookup, resolving on demand and memoizing the result
///
/// Share one instance (behind an `Arc`) to share its memo; `copy` makes a
/// fresh instance that will look the item up again.
pub struct LazyId<T, K> {
    key: K,
    source: Source<T, K>,
    memo: Memo<T>,
}

impl<T: Payload, K: CanonicalKey> LazyId<T, K> {
    /// Bind `key` to `look_up`
    pub fn of(key: K, look_up: &LookUp<T, K>) -> Self {
        Self {
            key,
            source: Source::Direct(look_up.clone()),
            memo: Memo::new(),
        }
    }

    pub(crate) fn through_catalog(key: K, catalog: LookupCatalog, tag: TypeTag) -> Self {
        Self {
            key,
            source: Source::Catalog { catalog, tag },
            memo: Memo::new(),
        }
    }

    /// A lazy id whose memo already holds `item`
    pub(crate) fn seeded(key: K, look_up: &LookUp<T, K>, item: T) -> Self {
        Self {
            key,
            source: Source::Direct(look_up.clone()),
            memo: Memo::settled(Ref::Ready(item)),
        }
    }

    /// The canonical key, available immediately
    pub fn id(&self) -> &K {
        &self.key
    }

    /// Identity of the bound lookup
    pub fn source_id(&self) -> SourceId {
        match &self.source {
            Source::Direct(look_up) => SourceId::LookUp(look_up.id()),
            Source::Catalog { catalog, tag } => SourceId::Catalog {
                catalog: catalog.id(),
                tag: *tag,
            },
        }
    }

    /// Same key and lookup, empty memo
    pub fn copy(&self) -> Self {
        Self {
            key: self.key.clone(),
            source: self.source.clone(),
            memo: Memo::new(),
        }
    }

    /// Whether the lookup has been started
    pub fn is_resolved(&self) -> bool {
        self.memo.is_begun()
    }
}

impl<T: Payload, K: CanonicalKey> Resolve<T> for LazyId<T, K> {
    fn resolve(&self) -> Ref<T> {
        self.memo.get_or_begin(|| {
            debug!(key = ?self.key, source = ?self.source_id(), "Resolving lazy id");
            match &self.source {
                Source::Direct(look_up) => look_up.call(self.key.clone()),
                Source::Catalog { catalog, tag } => catalog.resolve(*tag, self.key.clone()),
            }
        })
    }
}

impl<T: Payload, K: CanonicalKey> ImmediateId for LazyId<T, K> {
    type Key = K;

    fn immediate_id(&self) -> K {
        self.key.clone()
    }
}

impl<T: Payload, K: CanonicalKey> PartialEq for LazyId<T, K> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.source_id() == other.source_id()
    }
}

impl<T: Payload, K: CanonicalKey> Eq for LazyId<T, K> {}

impl<T: Payload, K: CanonicalKey> Hash for LazyId<T, K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
        self.source_id().hash(state);
    }
}

impl<T: Payload, K: CanonicalKey> fmt::Debug for LazyId<T, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyId")
            .field("key", &self.key)
            .field("source", &self.source_id())
            .field("memo", &self.memo)
            .finish()
    }
}
