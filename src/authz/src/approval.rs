//! Per-requester decision context
//!
//! An `Approval` belongs to one requester (typically one request or session).
//! It memoizes every permission decision it computes, so a rule asked many
//! times while building a response resolves once. Resolution functions get
//! the approval itself and may delegate with `prior.ask(other)`; delegated
//! decisions land in the same memo.
//!
//! Delegation must be acyclic. A perm that, directly or through others, asks
//! for its own decision key while resolving it blocks forever; this is not
//! detected.
//!
//! # Example
//!
//! ```rust
//! use lazyref_authz::{Approval, Approved, Perm, Refused};
//! use lazyref_core::{Ref, Settled};
//!
//! let admin: Perm<String> = Perm::unique("admin", |prior| {
//!     prior.who().flat_map(|who: String| {
//!         if who == "root" {
//!             Approved::because("superuser").into()
//!         } else {
//!             Refused::new("Not an administrator").into()
//!         }
//!     })
//! });
//!
//! let approval = Approval::new(Ref::ready("root".to_string()));
//! assert!(matches!(approval.ask(&admin).fetch(), Settled::Ready(_)));
//! assert!(matches!(approval.ask_boolean(&admin).fetch(), Settled::Ready(true)));
//! ```

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use lazyref_core::{CacheConfig, CacheStats, Memo, Payload, Ref, Settled, StatsCounter};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::decision::Approved;
use crate::perm::{Askable, DecisionKey, Perm, PermRequest};

struct ApprovalInner<U> {
    who: Ref<U>,
    decisions: DashMap<DecisionKey, Arc<Memo<Approved>>>,
    stats: StatsCounter,
}

/// Decision context for one requester
///
/// Cloning shares the decision memo.
pub struct Approval<U> {
    inner: Arc<ApprovalInner<U>>,
}

impl<U: Payload> Approval<U> {
    /// Create an approval for `who` with the default configuration
    pub fn new(who: Ref<U>) -> Self {
        Self::with_config(who, CacheConfig::default())
    }

    /// Create an approval for `who` with a custom configuration
    pub fn with_config(who: Ref<U>, config: CacheConfig) -> Self {
        Self {
            inner: Arc::new(ApprovalInner {
                who,
                decisions: DashMap::with_capacity(config.initial_capacity),
                stats: StatsCounter::new(config.track_stats),
            }),
        }
    }

    /// The requester
    pub fn who(&self) -> Ref<U> {
        self.inner.who.now()
    }

    /// Ask for a permission decision
    ///
    /// The first ask for a decision key runs the perm's resolution; every
    /// later ask for an equivalent key gets the stored reference, including
    /// concurrent asks while the first is still in flight.
    ///
    /// For a `cache_on_id` perm whose target id is not known up front, the
    /// result is pending until the target resolves and its id is known. An
    /// absent or failed target has no id; the perm is then resolved with it
    /// uncached.
    pub fn ask<R: Askable<U>>(&self, request: R) -> Ref<Approved> {
        let PermRequest { perm, target, id } = request.into_request();

        if let Some(key) = perm.key_without_target() {
            return self.decide(key, &perm, target);
        }

        if let Some(raw) = id {
            return match perm.key_from_id(&raw) {
                Ok(Some(key)) => self.decide(key, &perm, target),
                Ok(None) => self.resolve_uncached(&perm, target),
                Err(err) => Ref::Failed(err),
            };
        }

        if !perm.keyed_on_id() {
            return self.resolve_uncached(&perm, target);
        }

        match target.now() {
            Ref::Ready(item) => match perm.key_from_item(&item) {
                Some(key) => self.decide(key, &perm, Ref::Ready(item)),
                None => self.resolve_uncached(&perm, Ref::Ready(item)),
            },
            Ref::Pending(handle) => {
                let approval = self.clone();
                Ref::pending(async move {
                    match handle.await {
                        Settled::Ready(item) => {
                            let decided = match perm.key_from_item(&item) {
                                Some(key) => approval.decide(key, &perm, Ref::Ready(item)),
                                None => approval.resolve_uncached(&perm, Ref::Ready(item)),
                            };
                            decided.settle().await
                        }
                        other => approval.resolve_uncached(&perm, other.into()).settle().await,
                    }
                })
            }
            other => self.resolve_uncached(&perm, other),
        }
    }

    /// Ask for a permission decision as a flag
    ///
    /// Approved is `true`; refusals, other failures and absence are `false`.
    pub fn ask_boolean<R: Askable<U>>(&self, request: R) -> Ref<bool> {
        self.ask(request)
            .map(|_| true)
            .recover(|_| Ref::Ready(false))
            .or_if_none(false)
    }

    /// The stored decision for a request, without resolving anything
    ///
    /// `None` when the decision has not been asked for, or when its key
    /// cannot be known without resolving the target.
    pub fn decided<R: Askable<U>>(&self, request: R) -> Option<Ref<Approved>> {
        let PermRequest { perm, target, id } = request.into_request();

        let key = match (perm.key_without_target(), id) {
            (Some(key), _) => key,
            (None, Some(raw)) => perm.key_from_id(&raw).ok()??,
            (None, None) => match target.now() {
                Ref::Ready(item) => perm.key_from_item(&item)?,
                _ => return None,
            },
        };

        let memo = self.inner.decisions.get(&key).map(|memo| Arc::clone(memo.value()))?;
        memo.peek()
    }

    /// Number of decision keys asked for so far
    pub fn decision_count(&self) -> usize {
        self.inner.decisions.len()
    }

    /// Get decision cache statistics
    pub fn stats(&self) -> CacheStats {
        self.inner.stats.snapshot(self.decision_count())
    }

    fn decide<T: Payload>(&self, key: DecisionKey, perm: &Perm<U, T>, target: Ref<T>) -> Ref<Approved> {
        // Only the cell is taken under the shard lock; resolution may re-enter `ask`
        let memo = match self.inner.decisions.entry(key.clone()) {
            Entry::Occupied(occupied) => {
                trace!(perm = perm.name(), ?key, "Decision cache hit");
                self.inner.stats.hit();
                Arc::clone(occupied.get())
            }
            Entry::Vacant(vacant) => {
                self.inner.stats.miss();
                Arc::clone(vacant.insert(Arc::new(Memo::new())).value())
            }
        };

        memo.get_or_begin(|| {
            debug!(perm = perm.name(), ?key, "Resolving permission");
            perm.invoke(self, target)
        })
    }

    fn resolve_uncached<T: Payload>(&self, perm: &Perm<U, T>, target: Ref<T>) -> Ref<Approved> {
        debug!(perm = perm.name(), "Resolving permission uncached");
        perm.invoke(self, target)
    }
}

impl<U> Clone for Approval<U> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<U> fmt::Debug for Approval<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Approval")
            .field("decisions", &self.inner.decisions.len())
            .finish()
    }
}
