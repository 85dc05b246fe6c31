/// Linear undo/redo over a single live value.
///
/// The manager owns the live value. Every edit goes through `set`, which
/// pushes the previous value onto the undo stack and drops all redo history.
/// Nothing here touches storage; persistence is the coordinator's job.
use std::collections::VecDeque;

/// Decides whether a new value is actually a change.
///
/// Use `PartialEq::eq` for structural comparison or `Arc::ptr_eq` for
/// referential comparison of shared documents. Referential equality only
/// collapses no-op edits when producers reuse the same instance for
/// unchanged content.
pub type Equality<T> = fn(&T, &T) -> bool;

/// Default cap on the undo stack.
const DEFAULT_MAX_DEPTH: usize = 10_000;

/// Manages undo/redo history for a single live value.
pub struct HistoryManager<T> {
    /// The current value under edit.
    present: T,
    /// Undo stack, oldest first.
    past: Vec<T>,
    /// Redo stack, next redo first.
    future: VecDeque<T>,
    /// Max entries kept in `past`.
    max_depth: usize,
    same: Equality<T>,
}

impl<T> std::fmt::Debug for HistoryManager<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryManager")
            .field("past_len", &self.past.len())
            .field("future_len", &self.future.len())
            .field("max_depth", &self.max_depth)
            .finish()
    }
}

impl<T: PartialEq> HistoryManager<T> {
    /// Creates a manager that compares values structurally.
    pub fn new(initial: T) -> Self {
        Self::with_equality(initial, <T as PartialEq>::eq)
    }
}

impl<T> HistoryManager<T> {
    /// Creates a manager with an explicit change test.
    pub fn with_equality(initial: T, same: Equality<T>) -> Self {
        Self {
            present: initial,
            past: Vec::new(),
            future: VecDeque::new(),
            max_depth: DEFAULT_MAX_DEPTH,
            same,
        }
    }

    /// Caps the undo stack; the oldest entries are evicted first.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.max(1);
        self.trim_past();
        self
    }

    /// The live value.
    pub fn present(&self) -> &T {
        &self.present
    }

    /// Undo stack, oldest first.
    pub fn past(&self) -> &[T] {
        &self.past
    }

    /// Redo stack, next redo first.
    pub fn future(&self) -> &VecDeque<T> {
        &self.future
    }

    /// Replaces the live value.
    ///
    /// Returns `false` and leaves both stacks alone when `next` equals the
    /// live value. Otherwise the old value becomes the newest undo step and
    /// the redo stack is cleared.
    pub fn set(&mut self, next: T) -> bool {
        if (self.same)(&self.present, &next) {
            return false;
        }
        let previous = std::mem::replace(&mut self.present, next);
        self.past.push(previous);
        self.future.clear();
        self.trim_past();
        true
    }

    /// Computes the next value from the live one and applies it via `set`.
    pub fn update(&mut self, updater: impl FnOnce(&T) -> T) -> bool {
        let next = updater(&self.present);
        self.set(next)
    }

    /// Steps back one edit. Returns `false` if there is nothing to undo.
    pub fn undo(&mut self) -> bool {
        let Some(previous) = self.past.pop() else {
            return false;
        };
        let current = std::mem::replace(&mut self.present, previous);
        self.future.push_front(current);
        true
    }

    /// Re-applies the most recently undone edit. Returns `false` if there is
    /// nothing to redo.
    pub fn redo(&mut self) -> bool {
        let Some(next) = self.future.pop_front() else {
            return false;
        };
        let current = std::mem::replace(&mut self.present, next);
        self.past.push(current);
        self.trim_past();
        true
    }

    pub fn can_undo(&self) -> bool {
        !self.past.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.future.is_empty()
    }

    /// Drops both stacks, keeping the live value.
    pub fn clear(&mut self) {
        self.past.clear();
        self.future.clear();
    }

    /// Adopts `value` as the live value with empty stacks, for callers that
    /// replace the document wholesale and want no way back.
    pub fn reset(&mut self, value: T) {
        self.present = value;
        self.clear();
    }

    fn trim_past(&mut self) {
        if self.past.len() > self.max_depth {
            let excess = self.past.len() - self.max_depth;
            self.past.drain(..excess);
        }
    }
}
