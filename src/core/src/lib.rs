//! # lazyref core
//!
//! Deferred references and identity-memoized lookups.
//!
//! ## Features
//!
//! - **`Ref<T>`**: ready, pending, absent or failed, with short-circuiting combinators
//! - **`LazyId<T, K>`**: a key bound to a lookup, resolved once on demand
//! - **`LookupCache`**: deduplicates lookups across independently built lazy ids
//! - **`LookupCatalog`**: registers lookups under explicit type tags
//! - **`GetsId`**: per-type canonical id policies
//!
//! ## Example
//!
//! ```rust
//! use lazyref_core::{LookUp, LookupCache, Ref, Resolve, Settled};
//!
//! let users = LookUp::new("users", |id: i64| {
//!     if id == 1 { Ref::ready("alice".to_string()) } else { Ref::absent() }
//! });
//!
//! let cache = LookupCache::new();
//! let greeting = cache
//!     .look_up(users.lazy(1))
//!     .map(|name| format!("hello, {}", name));
//!
//! assert!(matches!(greeting.fetch(), Settled::Ready(ref s) if s == "hello, alice"));
//! assert!(matches!(users.lazy(2).fetch(), Settled::Absent));
//! ```

pub mod types;
pub mod error;
pub mod reference;
pub mod memo;
pub mod gets_id;
pub mod lookup;
pub mod lazy_id;
pub mod cache;
pub mod catalog;

// Re-export commonly used types
pub use types::{CanonicalId, TypeTag};
pub use error::{RefError, Refused, Result};
pub use reference::{Payload, PendingHandle, Ref, Resolve, Settled};
pub use memo::Memo;
pub use gets_id::{id_by, CanonicalKey, GetsId, IdBy};
pub use lookup::{LookUp, LookUpId};
pub use lazy_id::{ImmediateId, LazyId, SourceId};
pub use cache::{CacheConfig, CacheStats, LookupCache, StatsCounter};
pub use catalog::{CatalogId, LookupCatalog};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
