//! Permissions
//!
//! A `Perm` describes how to decide one kind of request: a resolution
//! function from the asking `Approval` and a target reference to a
//! `Ref<Approved>`. How an approval memoizes the decision depends on how the
//! perm was built:
//!
//! - `Perm::unique`: one decision per approval, keyed by the perm itself
//! - `Perm::cache_on_id`: one decision per perm and canonical target id
//! - `Perm::uncached`: resolved on every ask

use lazyref_core::{
    CanonicalId, CanonicalKey, GetsId, LazyId, Payload, Ref, Resolve, Result, TypeTag,
};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::approval::Approval;
use crate::decision::Approved;

static NEXT_PERM_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a permission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PermId(u64);

/// Target type and canonical id of a `cache_on_id` decision
///
/// Decisions are stored per perm, so two perms declared with the same tag
/// never answer for each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PermKey {
    pub tag: TypeTag,
    pub id: CanonicalId,
}

/// Key of an approval's decision map
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum DecisionKey {
    Unique(PermId),
    OnId(PermId, PermKey),
}

type ResolveFn<U, T> = dyn Fn(&Approval<U>, Ref<T>) -> Ref<Approved> + Send + Sync;
type KeyFn<T> = dyn Fn(&T) -> CanonicalId + Send + Sync;
type NormaliseFn = dyn Fn(&CanonicalId) -> Result<CanonicalId> + Send + Sync;

enum Keying<T> {
    Unique,
    OnId {
        tag: TypeTag,
        key_of: Box<KeyFn<T>>,
        normalise: Box<NormaliseFn>,
    },
    Uncached,
}

struct PermInner<U, T> {
    id: PermId,
    name: &'static str,
    keying: Keying<T>,
    resolve: Box<ResolveFn<U, T>>,
}

/// A named authorization rule for requesters of type `U` on targets of type `T`
pub struct Perm<U, T = ()> {
    inner: Arc<PermInner<U, T>>,
}

impl<U: Payload> Perm<U, ()> {
    /// A target-less permission decided at most once per approval
    pub fn unique<F>(name: &'static str, resolve: F) -> Self
    where
        F: Fn(&Approval<U>) -> Ref<Approved> + Send + Sync + 'static,
    {
        Self::build(name, Keying::Unique, move |approval: &Approval<U>, _: Ref<()>| resolve(approval))
    }
}

impl<U: Payload, T: Payload> Perm<U, T> {
    /// A permission decided at most once per approval and canonical target id
    pub fn cache_on_id<G, F>(name: &'static str, tag: TypeTag, gets: G, resolve: F) -> Self
    where
        G: GetsId<T>,
        F: Fn(&Approval<U>, Ref<T>) -> Ref<Approved> + Send + Sync + 'static,
    {
        let gets = Arc::new(gets);
        let key_gets = Arc::clone(&gets);
        let keying = Keying::OnId {
            tag,
            key_of: Box::new(move |item: &T| <G as GetsId<T>>::id_of(&key_gets, item).to_canonical()),
            normalise: Box::new(move |raw: &CanonicalId| {
                <G as GetsId<T>>::canonical(&gets, raw).map(|key| key.to_canonical())
            }),
        };
        Self::build(name, keying, resolve)
    }

    /// A permission resolved afresh on every ask
    pub fn uncached<F>(name: &'static str, resolve: F) -> Self
    where
        F: Fn(&Approval<U>, Ref<T>) -> Ref<Approved> + Send + Sync + 'static,
    {
        Self::build(name, Keying::Uncached, resolve)
    }

    fn build<F>(name: &'static str, keying: Keying<T>, resolve: F) -> Self
    where
        F: Fn(&Approval<U>, Ref<T>) -> Ref<Approved> + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(PermInner {
                id: PermId(NEXT_PERM_ID.fetch_add(1, Ordering::Relaxed)),
                name,
                keying,
                resolve: Box::new(resolve),
            }),
        }
    }

    /// Identity of this permission
    pub fn id(&self) -> PermId {
        self.inner.id
    }

    /// Name used in logs
    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    /// Apply the permission to a target
    pub fn on(&self, target: impl Target<T>) -> PermRequest<U, T> {
        let (target, id) = target.into_target();
        PermRequest {
            perm: self.clone(),
            target,
            id,
        }
    }

    /// Whether the decision key depends on the target's id
    pub(crate) fn keyed_on_id(&self) -> bool {
        matches!(self.inner.keying, Keying::OnId { .. })
    }

    /// Decision key from a raw id, `None` for uncached perms
    pub(crate) fn key_from_id(&self, raw: &CanonicalId) -> Result<Option<DecisionKey>> {
        match &self.inner.keying {
            Keying::Unique => Ok(Some(DecisionKey::Unique(self.inner.id))),
            Keying::OnId { tag, normalise, .. } => Ok(Some(DecisionKey::OnId(
                self.inner.id,
                PermKey {
                    tag: *tag,
                    id: normalise(raw)?,
                },
            ))),
            Keying::Uncached => Ok(None),
        }
    }

    /// Decision key from a loaded target, `None` for uncached perms
    pub(crate) fn key_from_item(&self, item: &T) -> Option<DecisionKey> {
        match &self.inner.keying {
            Keying::Unique => Some(DecisionKey::Unique(self.inner.id)),
            Keying::OnId { tag, key_of, .. } => Some(DecisionKey::OnId(
                self.inner.id,
                PermKey {
                    tag: *tag,
                    id: key_of(item),
                },
            )),
            Keying::Uncached => None,
        }
    }

    /// Decision key that needs no target at all
    pub(crate) fn key_without_target(&self) -> Option<DecisionKey> {
        match &self.inner.keying {
            Keying::Unique => Some(DecisionKey::Unique(self.inner.id)),
            _ => None,
        }
    }

    /// Run the resolution function
    pub(crate) fn invoke(&self, approval: &Approval<U>, target: Ref<T>) -> Ref<Approved> {
        Ref::capture(|| (self.inner.resolve)(approval, target))
    }
}

impl<U, T> Clone for Perm<U, T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<U, T> PartialEq for Perm<U, T> {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl<U, T> Eq for Perm<U, T> {}

impl<U, T> fmt::Debug for Perm<U, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keying = match self.inner.keying {
            Keying::Unique => "unique",
            Keying::OnId { .. } => "cache_on_id",
            Keying::Uncached => "uncached",
        };
        f.debug_struct("Perm")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("keying", &keying)
            .finish()
    }
}

/// Something a permission can be applied to
///
/// Yields the target reference and, when known without resolving anything,
/// its raw id.
pub trait Target<T> {
    fn into_target(self) -> (Ref<T>, Option<CanonicalId>);
}

impl<T: Payload> Target<T> for Ref<T> {
    fn into_target(self) -> (Ref<T>, Option<CanonicalId>) {
        (self, None)
    }
}

impl<T: Payload, K: CanonicalKey> Target<T> for &LazyId<T, K> {
    fn into_target(self) -> (Ref<T>, Option<CanonicalId>) {
        (self.resolve(), Some(self.id().to_canonical()))
    }
}

impl<T: Payload, K: CanonicalKey> Target<T> for &Arc<LazyId<T, K>> {
    fn into_target(self) -> (Ref<T>, Option<CanonicalId>) {
        (&**self).into_target()
    }
}

/// A permission applied to a target, ready to be asked
pub struct PermRequest<U, T = ()> {
    pub(crate) perm: Perm<U, T>,
    pub(crate) target: Ref<T>,
    pub(crate) id: Option<CanonicalId>,
}

impl<U: Payload, T: Payload> PermRequest<U, T> {
    /// The permission being asked
    pub fn perm(&self) -> &Perm<U, T> {
        &self.perm
    }
}

/// Anything an approval can be asked about
pub trait Askable<U> {
    type Target: Payload;

    fn into_request(self) -> PermRequest<U, Self::Target>;
}

impl<U: Payload, T: Payload> Askable<U> for PermRequest<U, T> {
    type Target = T;

    fn into_request(self) -> PermRequest<U, T> {
        self
    }
}

impl<U: Payload> Askable<U> for &Perm<U, ()> {
    type Target = ();

    fn into_request(self) -> PermRequest<U, ()> {
        self.on(Ref::Ready(()))
    }
}

impl<U: Payload> Askable<U> for Perm<U, ()> {
    type Target = ();

    fn into_request(self) -> PermRequest<U, ()> {
        self.on(Ref::Ready(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lazyref_core::id_by;

    #[derive(Clone)]
    struct Page {
        id: i64,
    }

    const PAGE: TypeTag = TypeTag::new("Page");

    fn approve_all(_: &Approval<String>, _: Ref<Page>) -> Ref<Approved> {
        Approved::new().into()
    }

    #[test]
    fn test_perm_identity() {
        let a: Perm<String> = Perm::unique("a", |_| Approved::new().into());
        let b: Perm<String> = Perm::unique("a", |_| Approved::new().into());

        assert_eq!(a, a.clone());
        assert_ne!(a, b);
        assert!(format!("{:?}", a).contains("unique"));
    }

    #[test]
    fn test_cache_on_id_keys_are_normalised() {
        let perm = Perm::cache_on_id("view", PAGE, id_by(|p: &Page| p.id), approve_all);

        let from_text = perm.key_from_id(&CanonicalId::from("12")).unwrap();
        let from_item = perm.key_from_item(&Page { id: 12 });
        assert_eq!(from_text, from_item);
        assert_eq!(
            from_item,
            Some(DecisionKey::OnId(
                perm.id(),
                PermKey {
                    tag: PAGE,
                    id: CanonicalId::Int(12)
                }
            ))
        );
        assert!(perm.keyed_on_id());
        assert!(perm.key_from_id(&CanonicalId::from("twelve")).is_err());
    }

    #[test]
    fn test_same_tag_keys_are_scoped_per_perm() {
        let view = Perm::cache_on_id("view", PAGE, id_by(|p: &Page| p.id), approve_all);
        let edit = Perm::cache_on_id("edit", PAGE, id_by(|p: &Page| p.id), approve_all);
        let page = Page { id: 3 };

        assert_ne!(view.key_from_item(&page), edit.key_from_item(&page));
    }

    #[test]
    fn test_uncached_has_no_key() {
        let perm: Perm<String, Page> = Perm::uncached("peek", approve_all);
        assert_eq!(perm.key_from_item(&Page { id: 1 }), None);
        assert_eq!(perm.key_without_target(), None);
    }
}
