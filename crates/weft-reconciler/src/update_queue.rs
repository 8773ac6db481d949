#![forbid(unsafe_code)]

//! Pending state transitions.
//!
//! Each state cell (the root element, every `use_state` hook) owns a
//! shared queue of [`Update`]s. Enqueue is O(1) tail insertion and the
//! queue preserves arrival order; processing folds the queue into a new
//! state while deferring updates whose lane is outside the active render.
//!
//! The queue is a plain vector with explicit FIFO semantics, standing in
//! for the circular singly-linked ring of the reference design: traversal
//! is bounded by length rather than by pointer identity, and "insert at
//! tail, start just past the tail" is simply index order.
//!
//! # Invariants
//!
//! 1. Updates on one queue apply in enqueue order within a lane, no matter
//!    how many times the render restarts.
//! 2. A skipped update pins the base state at the first skip and defers
//!    itself *and every later update* intact to a future render, so
//!    skipping never loses or reorders work.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::lanes::Lanes;

/// How an update produces the next state.
pub enum UpdateAction<S> {
    /// Replace the state outright.
    Replace(S),
    /// Derive the next state from the previous one. Must be pure: it can
    /// run any number of times across restarts.
    Apply(Rc<dyn Fn(&S) -> S>),
}

impl<S: Clone> Clone for UpdateAction<S> {
    fn clone(&self) -> Self {
        match self {
            Self::Replace(value) => Self::Replace(value.clone()),
            Self::Apply(func) => Self::Apply(Rc::clone(func)),
        }
    }
}

impl<S> fmt::Debug for UpdateAction<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Replace(_) => write!(f, "Replace"),
            Self::Apply(_) => write!(f, "Apply"),
        }
    }
}

/// One pending state transition.
#[derive(Debug)]
pub struct Update<S> {
    pub action: UpdateAction<S>,
    pub lane: Lanes,
}

impl<S: Clone> Clone for Update<S> {
    fn clone(&self) -> Self {
        Self {
            action: self.action.clone(),
            lane: self.lane,
        }
    }
}

impl<S> Update<S> {
    #[must_use]
    pub fn new(action: UpdateAction<S>, lane: Lanes) -> Self {
        Self { action, lane }
    }
}

/// FIFO queue of pending updates for one state cell.
#[derive(Debug)]
pub struct UpdateQueue<S> {
    pending: Vec<Update<S>>,
}

impl<S> Default for UpdateQueue<S> {
    fn default() -> Self {
        Self {
            pending: Vec::new(),
        }
    }
}

impl<S> UpdateQueue<S> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tail insertion, preserving arrival order.
    pub fn enqueue(&mut self, update: Update<S>) {
        self.pending.push(update);
    }

    /// Drain everything enqueued so far.
    #[must_use]
    pub fn take_pending(&mut self) -> Vec<Update<S>> {
        std::mem::take(&mut self.pending)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// A queue shared between a state cell's dispatcher and both buffers of
/// its fiber.
pub type SharedQueue<S> = Rc<RefCell<UpdateQueue<S>>>;

#[must_use]
pub fn shared_queue<S>() -> SharedQueue<S> {
    Rc::new(RefCell::new(UpdateQueue::new()))
}

/// Result of one processing pass.
#[derive(Debug)]
pub struct ProcessedQueue<S> {
    /// State after applying every update included in the render lanes.
    pub memoized_state: S,
    /// Snapshot to replay the residual queue from: the state as of the
    /// first skipped update, or the final state if nothing was skipped.
    pub base_state: S,
    /// Updates deferred to a future render. Once an update is skipped,
    /// every later update is carried too (included ones lane-stripped so
    /// they re-apply), preserving relative order.
    pub base_queue: Vec<Update<S>>,
}

/// Fold `updates` into a new state, deferring lanes outside `render_lanes`.
///
/// Single pass. For each update:
/// - lane not included in `render_lanes`: pin `base_state` at the current
///   accumulator (first skip only) and clone the update into `base_queue`;
/// - lane included: if anything was already skipped, clone the update into
///   `base_queue` with the empty lane so the replay re-applies it, then
///   apply the action to the accumulator.
pub fn process_update_queue<S: Clone>(
    base_state: S,
    updates: &[Update<S>],
    render_lanes: Lanes,
) -> ProcessedQueue<S> {
    let mut state = base_state;
    let mut new_base_state: Option<S> = None;
    let mut base_queue: Vec<Update<S>> = Vec::new();

    for update in updates {
        if !render_lanes.includes(update.lane) {
            if base_queue.is_empty() {
                new_base_state = Some(state.clone());
            }
            base_queue.push(update.clone());
            continue;
        }
        if !base_queue.is_empty() {
            base_queue.push(Update {
                action: update.action.clone(),
                lane: Lanes::empty(),
            });
        }
        state = match &update.action {
            UpdateAction::Replace(value) => value.clone(),
            UpdateAction::Apply(func) => func(&state),
        };
    }

    let memoized_state = state;
    let base_state = new_base_state.unwrap_or_else(|| memoized_state.clone());
    ProcessedQueue {
        memoized_state,
        base_state,
        base_queue,
    }
}
