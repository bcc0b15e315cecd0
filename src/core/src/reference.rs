//! The `Ref` variant: a value that is ready, pending, absent or failed
//!
//! Combinators consume a `Ref` and return a new one. Absent and failed
//! references short-circuit every combinator: the composed function is never
//! invoked. A pending reference composes into another pending reference whose
//! future runs the composed function once the upstream settles; nothing is
//! spawned, the work is driven by whoever awaits the result.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::fmt;
use std::future::{Future, IntoFuture};
use std::panic::{self, AssertUnwindSafe};
use tracing::warn;

use crate::error::{RefError, Refused, Result};
use crate::gets_id::GetsId;

/// Bound for values carried by a `Ref`
///
/// A pending result is shared between every clone of the reference, so the
/// payload must be clonable and thread-safe.
pub trait Payload: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> Payload for T {}

/// Shared handle to an in-flight computation
pub type PendingHandle<T> = Shared<BoxFuture<'static, Settled<T>>>;

/// Terminal state of a reference
#[derive(Debug, Clone)]
pub enum Settled<T> {
    /// A value was found
    Ready(T),
    /// The lookup completed and found nothing
    Absent,
    /// The computation failed
    Failed(RefError),
}

impl<T> Settled<T> {
    /// Whether a value was found
    pub fn is_ready(&self) -> bool {
        matches!(self, Settled::Ready(_))
    }

    /// Whether the lookup found nothing
    pub fn is_absent(&self) -> bool {
        matches!(self, Settled::Absent)
    }

    /// The value, if one was found
    pub fn ready(self) -> Option<T> {
        match self {
            Settled::Ready(v) => Some(v),
            _ => None,
        }
    }

    /// The failure cause, if any
    pub fn failure(&self) -> Option<&RefError> {
        match self {
            Settled::Failed(err) => Some(err),
            _ => None,
        }
    }

    /// Convert into a `Result`, mapping absence to `Ok(None)`
    pub fn into_result(self) -> Result<Option<T>> {
        match self {
            Settled::Ready(v) => Ok(Some(v)),
            Settled::Absent => Ok(None),
            Settled::Failed(err) => Err(err),
        }
    }
}

impl<T, E> From<std::result::Result<Option<T>, E>> for Settled<T>
where
    E: Into<RefError>,
{
    fn from(result: std::result::Result<Option<T>, E>) -> Self {
        match result {
            Ok(Some(v)) => Settled::Ready(v),
            Ok(None) => Settled::Absent,
            Err(err) => Settled::Failed(err.into()),
        }
    }
}

/// A value that may not be ready yet
#[derive(Clone)]
pub enum Ref<T> {
    /// The value is available now
    Ready(T),
    /// The value depends on an in-flight computation
    Pending(PendingHandle<T>),
    /// The lookup completed and found nothing
    Absent,
    /// The computation failed
    Failed(RefError),
}

impl<T: Payload> Ref<T> {
    /// A ready reference
    pub fn ready(value: T) -> Self {
        Ref::Ready(value)
    }

    /// An absent reference
    pub fn absent() -> Self {
        Ref::Absent
    }

    /// A failed reference
    pub fn failed(err: impl Into<RefError>) -> Self {
        Ref::Failed(err.into())
    }

    /// A pending reference settling to the future's output
    ///
    /// A panic while polling the future settles the reference as
    /// `Failed(RefError::Panicked)`.
    pub fn pending<F>(fut: F) -> Self
    where
        F: Future<Output = Settled<T>> + Send + 'static,
    {
        let guarded = AssertUnwindSafe(fut).catch_unwind().map(|outcome| match outcome {
            Ok(settled) => settled,
            Err(payload) => {
                let err = RefError::panicked(payload);
                warn!("Pending computation panicked: {}", err);
                Settled::Failed(err)
            }
        });
        Ref::Pending(guarded.boxed().shared())
    }

    /// A pending reference from a fallible, possibly-empty future
    pub fn from_future<F, E>(fut: F) -> Self
    where
        F: Future<Output = std::result::Result<Option<T>, E>> + Send + 'static,
        E: Into<RefError> + 'static,
    {
        Self::pending(fut.map(Settled::from))
    }

    /// Run `f`, capturing a panic as `Failed(RefError::Panicked)`
    pub fn capture<F>(f: F) -> Self
    where
        F: FnOnce() -> Ref<T>,
    {
        match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(r) => r,
            Err(payload) => {
                let err = RefError::panicked(payload);
                warn!("Composed function panicked: {}", err);
                Ref::Failed(err)
            }
        }
    }

    /// Apply `f` to the value
    pub fn map<U, F>(self, f: F) -> Ref<U>
    where
        U: Payload,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.flat_map(move |v| Ref::Ready(f(v)))
    }

    /// Chain a further referencing step on the value
    pub fn flat_map<U, F>(self, f: F) -> Ref<U>
    where
        U: Payload,
        F: FnOnce(T) -> Ref<U> + Send + 'static,
    {
        match self {
            Ref::Ready(v) => Ref::capture(move || f(v)),
            Ref::Pending(handle) => Ref::pending(async move {
                match handle.await {
                    Settled::Ready(v) => Ref::capture(move || f(v)).settle().await,
                    Settled::Absent => Settled::Absent,
                    Settled::Failed(err) => Settled::Failed(err),
                }
            }),
            Ref::Absent => Ref::Absent,
            Ref::Failed(err) => Ref::Failed(err),
        }
    }

    /// Replace absence with a value
    pub fn or_if_none(self, default: T) -> Ref<T> {
        match self {
            Ref::Absent => Ref::Ready(default),
            Ref::Pending(handle) => Ref::pending(async move {
                match handle.await {
                    Settled::Absent => Settled::Ready(default),
                    settled => settled,
                }
            }),
            other => other,
        }
    }

    /// Replace absence with a failure
    pub fn or_if_none_fail(self, err: impl Into<RefError>) -> Ref<T> {
        let err = err.into();
        match self {
            Ref::Absent => Ref::Failed(err),
            Ref::Pending(handle) => Ref::pending(async move {
                match handle.await {
                    Settled::Absent => Settled::Failed(err),
                    settled => settled,
                }
            }),
            other => other,
        }
    }

    /// Turn a failure into a further referencing step
    pub fn recover<F>(self, f: F) -> Ref<T>
    where
        F: FnOnce(RefError) -> Ref<T> + Send + 'static,
    {
        match self {
            Ref::Failed(err) => Ref::capture(move || f(err)),
            Ref::Pending(handle) => Ref::pending(async move {
                match handle.await {
                    Settled::Failed(err) => Ref::capture(move || f(err)).settle().await,
                    settled => settled,
                }
            }),
            other => other,
        }
    }

    /// Make absence explicit: `Ready(Some(v))` or `Ready(None)`
    pub fn to_option(self) -> Ref<Option<T>> {
        match self {
            Ref::Ready(v) => Ref::Ready(Some(v)),
            Ref::Absent => Ref::Ready(None),
            Ref::Failed(err) => Ref::Failed(err),
            Ref::Pending(handle) => Ref::pending(async move {
                match handle.await {
                    Settled::Ready(v) => Settled::Ready(Some(v)),
                    Settled::Absent => Settled::Ready(None),
                    Settled::Failed(err) => Settled::Failed(err),
                }
            }),
        }
    }

    /// Pair with another reference; the first non-ready side wins
    pub fn zip<U>(self, other: Ref<U>) -> Ref<(T, U)>
    where
        U: Payload,
    {
        self.flat_map(move |a| other.map(move |b| (a, b)))
    }

    /// Collect references in order; the first non-ready one wins
    pub fn join_all<I>(refs: I) -> Ref<Vec<T>>
    where
        I: IntoIterator<Item = Ref<T>>,
    {
        let refs: Vec<Ref<T>> = refs.into_iter().map(|r| r.now()).collect();
        let mut values = Vec::with_capacity(refs.len());
        let mut rest = refs.into_iter();

        while let Some(r) = rest.next() {
            match r {
                Ref::Ready(v) => values.push(v),
                Ref::Absent => return Ref::Absent,
                Ref::Failed(err) => return Ref::Failed(err),
                Ref::Pending(handle) => {
                    // Everything from the first pending reference on is awaited in order
                    let remaining: Vec<Ref<T>> = std::iter::once(Ref::Pending(handle)).chain(rest).collect();
                    return Ref::pending(async move {
                        for r in remaining {
                            match r.settle().await {
                                Settled::Ready(v) => values.push(v),
                                Settled::Absent => return Settled::Absent,
                                Settled::Failed(err) => return Settled::Failed(err),
                            }
                        }
                        Settled::Ready(values)
                    });
                }
            }
        }
        Ref::Ready(values)
    }

    /// The canonical id of the item
    ///
    /// Unlike `LazyId::id`, this needs the item itself, so a pending
    /// reference yields a pending id.
    pub fn map_id<G>(self, gets: G) -> Ref<G::Key>
    where
        G: GetsId<T>,
    {
        self.map(move |item| gets.id_of(&item))
    }

    /// Current state, collapsing a pending handle that has already settled
    pub fn now(&self) -> Ref<T> {
        match self {
            Ref::Pending(handle) => match handle.peek() {
                Some(settled) => settled.clone().into(),
                None => Ref::Pending(handle.clone()),
            },
            other => other.clone(),
        }
    }

    /// Whether the value still depends on an unsettled computation
    pub fn is_pending(&self) -> bool {
        match self {
            Ref::Pending(handle) => handle.peek().is_none(),
            _ => false,
        }
    }

    /// Whether the value is available now
    pub fn is_ready(&self) -> bool {
        matches!(self.now(), Ref::Ready(_))
    }

    /// Wait for the reference to settle
    pub async fn settle(self) -> Settled<T> {
        match self {
            Ref::Ready(v) => Settled::Ready(v),
            Ref::Pending(handle) => handle.await,
            Ref::Absent => Settled::Absent,
            Ref::Failed(err) => Settled::Failed(err),
        }
    }

    /// Block the current thread until the reference settles
    ///
    /// For boundary code and tests only. Never call this from a task running
    /// on an async executor: the executor thread stalls and may deadlock.
    pub fn fetch(self) -> Settled<T> {
        match self {
            Ref::Pending(handle) => futures::executor::block_on(handle),
            Ref::Ready(v) => Settled::Ready(v),
            Ref::Absent => Settled::Absent,
            Ref::Failed(err) => Settled::Failed(err),
        }
    }
}

impl<T: Payload> IntoFuture for Ref<T> {
    type Output = Settled<T>;
    type IntoFuture = BoxFuture<'static, Settled<T>>;

    fn into_future(self) -> Self::IntoFuture {
        self.settle().boxed()
    }
}

impl<T: Payload> From<Settled<T>> for Ref<T> {
    fn from(settled: Settled<T>) -> Self {
        match settled {
            Settled::Ready(v) => Ref::Ready(v),
            Settled::Absent => Ref::Absent,
            Settled::Failed(err) => Ref::Failed(err),
        }
    }
}

impl<T: Payload> From<Option<T>> for Ref<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Ref::Ready(v),
            None => Ref::Absent,
        }
    }
}

impl<T: Payload, E: Into<RefError>> From<std::result::Result<T, E>> for Ref<T> {
    fn from(result: std::result::Result<T, E>) -> Self {
        match result {
            Ok(v) => Ref::Ready(v),
            Err(err) => Ref::Failed(err.into()),
        }
    }
}

impl<T: Payload> From<RefError> for Ref<T> {
    fn from(err: RefError) -> Self {
        Ref::Failed(err)
    }
}

impl<T: Payload> From<Refused> for Ref<T> {
    fn from(refused: Refused) -> Self {
        Ref::Failed(RefError::Refused(refused))
    }
}

impl<T: fmt::Debug> fmt::Debug for Ref<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ref::Ready(v) => f.debug_tuple("Ready").field(v).finish(),
            Ref::Pending(_) => f.write_str("Pending"),
            Ref::Absent => f.write_str("Absent"),
            Ref::Failed(err) => f.debug_tuple("Failed").field(err).finish(),
        }
    }
}

/// Anything exposing the `Ref` combinator surface by resolving to a `Ref`
///
/// Implemented by `Ref` itself and by `LazyId`, which resolves through its
/// memo. `Ref`'s own by-value methods take precedence when called on an
/// owned `Ref`.
pub trait Resolve<T: Payload> {
    /// The reference this value stands for
    fn resolve(&self) -> Ref<T>;

    fn map<U, F>(&self, f: F) -> Ref<U>
    where
        U: Payload,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.resolve().map(f)
    }

    fn flat_map<U, F>(&self, f: F) -> Ref<U>
    where
        U: Payload,
        F: FnOnce(T) -> Ref<U> + Send + 'static,
    {
        self.resolve().flat_map(f)
    }

    fn or_if_none(&self, default: T) -> Ref<T> {
        self.resolve().or_if_none(default)
    }

    fn or_if_none_fail(&self, err: impl Into<RefError>) -> Ref<T> {
        self.resolve().or_if_none_fail(err)
    }

    fn zip<U: Payload>(&self, other: Ref<U>) -> Ref<(T, U)> {
        self.resolve().zip(other)
    }

    fn recover<F>(&self, f: F) -> Ref<T>
    where
        F: FnOnce(RefError) -> Ref<T> + Send + 'static,
    {
        self.resolve().recover(f)
    }

    fn to_option(&self) -> Ref<Option<T>> {
        self.resolve().to_option()
    }

    fn fetch(&self) -> Settled<T> {
        self.resolve().fetch()
    }

    fn settle(&self) -> BoxFuture<'static, Settled<T>> {
        self.resolve().settle().boxed()
    }
}

impl<T: Payload> Resolve<T> for Ref<T> {
    fn resolve(&self) -> Ref<T> {
        self.now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::oneshot;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting<T: Payload>(counter: &Arc<AtomicUsize>, out: T) -> impl FnOnce(i32) -> Ref<T> {
        let counter = Arc::clone(counter);
        move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ref::Ready(out)
        }
    }

    #[test]
    fn test_map_on_ready_is_immediate() {
        let r = Ref::ready(2).map(|v| v * 10);
        assert!(matches!(r, Ref::Ready(20)));
    }

    #[test]
    fn test_absent_and_failed_short_circuit() {
        let counter = Arc::new(AtomicUsize::new(0));

        let absent = Ref::<i32>::absent().flat_map(counting(&counter, "x"));
        assert!(matches!(absent, Ref::Absent));

        let failed = Ref::<i32>::failed(Refused::new("no")).flat_map(counting(&counter, "x"));
        assert!(matches!(failed, Ref::Failed(RefError::Refused(_))));

        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_pending_composes_without_running() {
        let counter = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = oneshot::channel::<i32>();

        let upstream = Ref::from_future(async move { rx.await.map(Some) });
        let composed = upstream.flat_map(counting(&counter, 5u8));

        assert!(composed.is_pending());
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        tx.send(1).unwrap();
        let settled = tokio_test::block_on(composed.settle());
        assert!(matches!(settled, Settled::Ready(5)));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dropped_sender_fails() {
        let (tx, rx) = oneshot::channel::<i32>();
        let r = Ref::from_future(async move { rx.await.map(Some) });
        drop(tx);

        assert!(matches!(r.fetch(), Settled::Failed(RefError::Dropped)));
    }

    #[test]
    fn test_or_if_none() {
        assert!(matches!(Ref::absent().or_if_none(3), Ref::Ready(3)));
        assert!(matches!(Ref::ready(1).or_if_none(3), Ref::Ready(1)));

        let failed = Ref::<i32>::absent().or_if_none_fail(Refused::new("missing"));
        assert!(matches!(failed, Ref::Failed(RefError::Refused(_))));

        let pending = Ref::<i32>::pending(async { Settled::Absent }).or_if_none(9);
        assert!(matches!(pending.fetch(), Settled::Ready(9)));
    }

    #[test]
    fn test_recover_only_touches_failures() {
        let recovered = Ref::<i32>::failed(Refused::new("no")).recover(|_| Ref::ready(0));
        assert!(matches!(recovered, Ref::Ready(0)));

        let absent = Ref::<i32>::absent().recover(|_| Ref::ready(0));
        assert!(matches!(absent, Ref::Absent));
    }

    #[test]
    fn test_to_option() {
        assert!(matches!(Ref::ready(1).to_option(), Ref::Ready(Some(1))));
        assert!(matches!(Ref::<i32>::absent().to_option(), Ref::Ready(None)));
        assert!(matches!(
            Ref::<i32>::failed(RefError::Dropped).to_option(),
            Ref::Failed(RefError::Dropped)
        ));
    }

    #[test]
    fn test_panics_are_captured() {
        let r: Ref<i32> = Ref::ready(1).map(|_| panic!("boom"));
        assert!(matches!(r, Ref::Failed(RefError::Panicked(ref m)) if m == "boom"));

        let pending: Ref<i32> = Ref::pending(async {
            if true {
                panic!("later");
            }
            Settled::Ready(0)
        });
        assert!(matches!(pending.fetch(), Settled::Failed(RefError::Panicked(_))));
    }

    #[test]
    fn test_now_collapses_settled_pending() {
        let r = Ref::pending(async { Settled::Ready(4) });
        assert!(r.is_pending());

        let _ = r.clone().fetch();
        assert!(!r.is_pending());
        assert!(matches!(r.now(), Ref::Ready(4)));
    }

    #[test]
    fn test_join_all_and_zip() {
        let joined = Ref::join_all(vec![Ref::ready(1), Ref::ready(2)]);
        assert!(matches!(joined, Ref::Ready(ref v) if v == &vec![1, 2]));

        let with_absent = Ref::join_all(vec![Ref::ready(1), Ref::absent()]);
        assert!(matches!(with_absent, Ref::Absent));

        let pending = Ref::join_all(vec![Ref::pending(async { Settled::Ready(1) }), Ref::ready(2)]);
        assert!(matches!(pending.fetch(), Settled::Ready(ref v) if v == &vec![1, 2]));

        let zipped = Ref::ready("a").zip(Ref::ready(1));
        assert!(matches!(zipped, Ref::Ready(("a", 1))));
    }

    #[test]
    fn test_conversions() {
        assert!(matches!(Ref::from(Some(1)), Ref::Ready(1)));
        assert!(matches!(Ref::<i32>::from(None), Ref::Absent));

        let err: std::result::Result<i32, RefError> = Err(RefError::Dropped);
        assert!(matches!(Ref::from(err), Ref::Failed(RefError::Dropped)));

        let settled = Settled::from(Ok::<_, RefError>(Some(3)));
        assert_eq!(settled.into_result().unwrap(), Some(3));
    }
}
