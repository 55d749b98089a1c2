//! Update queues and priority-aware processing.
//!
//! Updates are appended to a shared pending ring. Before processing, the
//! pending ring is spliced onto the base queue carried over from the last
//! committed render, so an abandoned render never loses an update.

use core::cell::RefCell;
use core::fmt;
use std::rc::Rc;

use crate::lane::Lanes;
use crate::ring::Ring;

/// How an update derives the next state.
pub enum Action<S> {
    /// Replace the state outright.
    Replace(S),
    /// Compute the next state from the previous one.
    Reduce(Rc<dyn Fn(&S) -> S>),
}

impl<S: Clone> Action<S> {
    /// Applies the action on top of `previous`.
    #[must_use]
    pub fn apply(&self, previous: &S) -> S {
        match self {
            Self::Replace(value) => value.clone(),
            Self::Reduce(reducer) => reducer(previous),
        }
    }
}

impl<S: Clone> Clone for Action<S> {
    fn clone(&self) -> Self {
        match self {
            Self::Replace(value) => Self::Replace(value.clone()),
            Self::Reduce(reducer) => Self::Reduce(reducer.clone()),
        }
    }
}

impl<S: fmt::Debug> fmt::Debug for Action<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Replace(value) => f.debug_tuple("Replace").field(value).finish(),
            Self::Reduce(_) => f.write_str("Reduce(..)"),
        }
    }
}

/// A queued state change tagged with the lane it was issued at.
#[derive(Debug)]
pub struct Update<S> {
    /// The change to apply.
    pub action: Action<S>,
    /// Lane of the update. Empty once the update must replay at every lane.
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
    /// Creates an update.
    pub const fn new(action: Action<S>, lane: Lanes) -> Self {
        Self { action, lane }
    }
}

/// Pending updates shared between a fiber and its alternate.
pub struct SharedQueue<S> {
    pending: RefCell<Ring<Update<S>>>,
}

impl<S> SharedQueue<S> {
    /// Creates an empty queue.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pending: RefCell::new(Ring::new()),
        }
    }

    /// Appends an update to the pending ring.
    pub fn enqueue(&self, update: Update<S>) {
        self.pending.borrow_mut().push(update);
    }

    /// Detaches every pending update.
    pub fn take_pending(&self) -> Ring<Update<S>> {
        self.pending.borrow_mut().take()
    }

    /// Whether updates are waiting to be processed.
    pub fn has_pending(&self) -> bool {
        !self.pending.borrow().is_empty()
    }
}

impl<S> Default for SharedQueue<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> fmt::Debug for SharedQueue<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedQueue")
            .field("pending", &self.pending.borrow().len())
            .finish()
    }
}

/// Outcome of [`process_update_queue`].
#[derive(Debug)]
pub struct Processed<S> {
    /// State after every applied update.
    pub memoized_state: S,
    /// State before the first skipped update; the next render starts here.
    pub base_state: S,
    /// Updates to replay on the next render, starting with the first skip.
    pub base_queue: Ring<Update<S>>,
    /// Lanes of every skipped update.
    pub skipped_lanes: Lanes,
}

/// Folds `queue` over `base_state`, applying only updates whose lane is
/// included in `render_lanes`.
///
/// Skipped updates stay in the returned base queue together with every
/// update after them. Applied updates that follow a skip are kept with an
/// empty lane, so a later render replays the whole tail in issue order on
/// top of the base state.
pub fn process_update_queue<S: Clone>(
    base_state: &S,
    queue: &Ring<Update<S>>,
    render_lanes: Lanes,
) -> Processed<S> {
    let mut state = base_state.clone();
    let mut new_base_state: Option<S> = None;
    let mut base_queue = Ring::new();
    let mut skipped_lanes = Lanes::empty();

    for update in queue {
        if render_lanes.includes(update.lane) {
            if new_base_state.is_some() {
                base_queue.push(Update::new(update.action.clone(), Lanes::empty()));
            }
            state = update.action.apply(&state);
        } else {
            if new_base_state.is_none() {
                new_base_state = Some(state.clone());
            }
            base_queue.push(update.clone());
            skipped_lanes |= update.lane;
        }
    }

    Processed {
        base_state: new_base_state.unwrap_or_else(|| state.clone()),
        memoized_state: state,
        base_queue,
        skipped_lanes,
    }
}
