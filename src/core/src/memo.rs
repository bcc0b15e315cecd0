//! One-shot settling cell
//!
//! `Memo` starts empty and accepts exactly one reference. `get_or_begin` is
//! the atomic get-or-compute primitive behind `LazyId`, the lookup cache
//! entries and approval decisions: concurrent callers on an empty cell run
//! `begin` once, the others wait for it and share its result.
//!
//! `begin` usually returns quickly with a pending reference, so waiting is
//! short. Calling `get_or_begin` on the same cell from inside its own `begin`
//! deadlocks.

use once_cell::sync::OnceCell;
use std::fmt;

use crate::reference::{Payload, Ref};

/// Single-settlement cell holding a `Ref`
pub struct Memo<T> {
    cell: OnceCell<Ref<T>>,
}

impl<T: Payload> Memo<T> {
    /// An empty cell
    pub fn new() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }

    /// A cell already holding `settled`
    pub fn settled(settled: Ref<T>) -> Self {
        Self {
            cell: OnceCell::with_value(settled),
        }
    }

    /// The stored reference, computing it with `begin` if the cell is empty
    ///
    /// A panic in `begin` is stored as a failed reference.
    pub fn get_or_begin<F>(&self, begin: F) -> Ref<T>
    where
        F: FnOnce() -> Ref<T>,
    {
        self.cell.get_or_init(|| Ref::capture(begin)).now()
    }

    /// The stored reference, if the cell has been used
    pub fn peek(&self) -> Option<Ref<T>> {
        self.cell.get().map(Ref::now)
    }

    /// Whether the cell has been used
    pub fn is_begun(&self) -> bool {
        self.cell.get().is_some()
    }
}

impl<T: Payload> Default for Memo<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Memo<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memo")
            .field("begun", &self.cell.get().is_some())
            .finish()
    }
}
