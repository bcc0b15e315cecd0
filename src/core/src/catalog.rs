//! Runtime lookup catalog
//!
//! Maps explicit type tags to lookup functions so lazy ids can be minted
//! without holding the lookup itself. Registration is checked when a lazy id
//! resolves, not when it is created: startup code may race with early
//! construction.

use dashmap::DashMap;
use std::any::{type_name, Any};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::RefError;
use crate::gets_id::CanonicalKey;
use crate::lazy_id::LazyId;
use crate::lookup::LookUp;
use crate::reference::{Payload, Ref};
use crate::types::TypeTag;

static NEXT_CATALOG_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a catalog instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CatalogId(u64);

/// Registered lookup with its item type erased
struct Registration {
    look_up: Arc<dyn Any + Send + Sync>,
    signature: &'static str,
}

struct CatalogInner {
    id: CatalogId,
    look_ups: DashMap<TypeTag, Registration>,
}

/// Registry of lookup functions keyed by type tag
///
/// Cloning shares the registry; `new` creates an independent one with its own
/// identity.
#[derive(Clone)]
pub struct LookupCatalog {
    inner: Arc<CatalogInner>,
}

impl LookupCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CatalogInner {
                id: CatalogId(NEXT_CATALOG_ID.fetch_add(1, Ordering::Relaxed)),
                look_ups: DashMap::new(),
            }),
        }
    }

    /// Identity of this catalog
    pub fn id(&self) -> CatalogId {
        self.inner.id
    }

    /// Register the lookup for `tag`, replacing any previous one
    pub fn register_look_up<T, K>(&self, tag: TypeTag, look_up: LookUp<T, K>)
    where
        T: Payload,
        K: CanonicalKey,
    {
        let name = look_up.name();
        let registration = Registration {
            look_up: Arc::new(look_up),
            signature: type_name::<LookUp<T, K>>(),
        };

        match self.inner.look_ups.insert(tag, registration) {
            Some(previous) => debug!(
                "Replaced lookup for {} ({} -> {})",
                tag, previous.signature, name
            ),
            None => debug!("Registered lookup '{}' for {}", name, tag),
        }
    }

    /// A lazy id resolved through this catalog
    pub fn lazy_id<T, K>(&self, tag: TypeTag, key: K) -> LazyId<T, K>
    where
        T: Payload,
        K: CanonicalKey,
    {
        LazyId::through_catalog(key, self.clone(), tag)
    }

    /// Whether a lookup is registered for `tag`
    pub fn is_registered(&self, tag: TypeTag) -> bool {
        self.inner.look_ups.contains_key(&tag)
    }

    /// All registered tags, sorted
    pub fn registered_tags(&self) -> Vec<TypeTag> {
        let mut tags: Vec<TypeTag> = self.inner.look_ups.iter().map(|entry| *entry.key()).collect();
        tags.sort();
        tags
    }

    pub(crate) fn resolve<T, K>(&self, tag: TypeTag, key: K) -> Ref<T>
    where
        T: Payload,
        K: CanonicalKey,
    {
        // Clone out of the map so the lookup never runs under a shard lock
        let registered = match self.inner.look_ups.get(&tag) {
            Some(registration) => Arc::clone(&registration.look_up),
            None => {
                warn!("No lookup registered for {}", tag);
                return Ref::Failed(RefError::UnregisteredType(tag));
            }
        };

        match registered.downcast::<LookUp<T, K>>() {
            Ok(look_up) => look_up.call(key),
            Err(_) => {
                warn!("Lookup registered for {} has the wrong signature", tag);
                Ref::Failed(RefError::TypeMismatch {
                    tag,
                    expected: type_name::<LookUp<T, K>>(),
                })
            }
        }
    }
}

impl Default for LookupCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LookupCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LookupCatalog")
            .field("id", &self.inner.id)
            .field("tags", &self.registered_tags())
            .finish()
    }
}
