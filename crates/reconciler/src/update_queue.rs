//! Priority-aware update queues.
//!
//! Producers append to a circular singly-linked list whose `last` slot points
//! at the newest update; `last.next` is the oldest. Rendering drains the ring
//! in insertion order and replays it against the cell's base state.
//!
//! Invariants:
//! - Replay order is insertion order; lanes only gate inclusion.
//! - The base state is frozen at the first skipped update. Every update from
//!   that point on stays in the base queue so a later render replays it on
//!   top of the same baseline and nothing is applied twice.

use crate::lanes::{Lane, Lanes};
use std::cell::RefCell;
use std::rc::Rc;

/// State transition carried by an update.
pub enum Action<S> {
    Replace(S),
    Transform(Rc<dyn Fn(&S) -> S>),
}

impl<S: Clone> Action<S> {
    pub(crate) fn apply(&self, state: &S) -> S {
        match self {
            Action::Replace(next) => next.clone(),
            Action::Transform(f) => f(state),
        }
    }
}

impl<S: Clone> Clone for Action<S> {
    fn clone(&self) -> Self {
        match self {
            Action::Replace(next) => Action::Replace(next.clone()),
            Action::Transform(f) => Action::Transform(Rc::clone(f)),
        }
    }
}

pub struct Update<S> {
    pub(crate) action: Action<S>,
    pub(crate) lane: Lane,
}

impl<S> Update<S> {
    pub fn new(action: Action<S>, lane: Lane) -> Self {
        Self { action, lane }
    }

    pub fn lane(&self) -> Lane {
        self.lane
    }
}

impl<S: Clone> Clone for Update<S> {
    fn clone(&self) -> Self {
        Self {
            action: self.action.clone(),
            lane: self.lane,
        }
    }
}

/// Circular list of pending updates.
pub struct UpdateQueue<S> {
    slots: Vec<Update<S>>,
    next: Vec<usize>,
    last: Option<usize>,
}

pub(crate) type SharedQueue<S> = Rc<RefCell<UpdateQueue<S>>>;

impl<S> UpdateQueue<S> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            next: Vec::new(),
            last: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.last.is_none()
    }

    pub fn enqueue(&mut self, update: Update<S>) {
        let index = self.slots.len();
        self.slots.push(update);
        match self.last {
            None => self.next.push(index),
            Some(last) => {
                let oldest = self.next[last];
                self.next.push(oldest);
                self.next[last] = index;
            }
        }
        self.last = Some(index);
    }

    /// Unlinks the ring and returns its updates oldest first.
    pub fn take_pending(&mut self) -> Vec<Update<S>> {
        let Some(last) = self.last.take() else {
            return Vec::new();
        };
        let mut order = Vec::with_capacity(self.slots.len());
        let mut cursor = self.next[last];
        loop {
            order.push(cursor);
            if cursor == last {
                break;
            }
            cursor = self.next[cursor];
        }
        self.next.clear();
        let mut slots: Vec<Option<Update<S>>> = self.slots.drain(..).map(Some).collect();
        order
            .into_iter()
            .filter_map(|index| slots[index].take())
            .collect()
    }
}

impl<S> Default for UpdateQueue<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of replaying a queue at one render lane.
pub struct Processed<S> {
    pub memoized_state: S,
    pub base_state: S,
    pub base_queue: Vec<Update<S>>,
    /// Lanes of the updates left for a later render.
    pub skipped_lanes: Lanes,
}

pub fn process_update_queue<S: Clone>(
    base_state: &S,
    updates: &[Update<S>],
    render_lane: Lane,
) -> Processed<S> {
    let mut new_state = base_state.clone();
    let mut frozen_base: Option<S> = None;
    let mut base_queue = Vec::new();
    let mut skipped_lanes = Lanes::NONE;

    for update in updates {
        if !update.lane.is_subset_of(render_lane) {
            if frozen_base.is_none() {
                frozen_base = Some(new_state.clone());
            }
            skipped_lanes |= update.lane;
            base_queue.push(update.clone());
            continue;
        }
        if frozen_base.is_some() {
            base_queue.push(Update::new(update.action.clone(), Lanes::NONE));
        }
        new_state = update.action.apply(&new_state);
    }

    let base_state = frozen_base.unwrap_or_else(|| new_state.clone());
    Processed {
        memoized_state: new_state,
        base_state,
        base_queue,
        skipped_lanes,
    }
}

/// Moves pending updates onto the end of the carried base queue.
///
/// The merged queue is written back to the committed cell as well, so a
/// render that is thrown away does not lose updates it already drained.
pub(crate) fn merge_pending<S: Clone>(
    committed_base_queue: &RefCell<Vec<Update<S>>>,
    queue: &SharedQueue<S>,
) -> Vec<Update<S>> {
    let pending = queue.borrow_mut().take_pending();
    let mut merged = committed_base_queue.borrow().clone();
    if !pending.is_empty() {
        merged.extend(pending);
        *committed_base_queue.borrow_mut() = merged.clone();
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add(n: i32) -> Action<i32> {
        Action::Transform(Rc::new(move |s: &i32| s + n))
    }

    #[test]
    fn ring_preserves_insertion_order() {
        let mut queue = UpdateQueue::new();
        for n in 1..=4 {
            queue.enqueue(Update::new(Action::Replace(n), Lanes::DEFAULT));
        }
        let order: Vec<i32> = queue
            .take_pending()
            .iter()
            .map(|u| u.action.apply(&0))
            .collect();
        assert_eq!(order, vec![1, 2, 3, 4]);
        assert!(queue.is_empty());
        assert!(queue.take_pending().is_empty());
    }

    #[test]
    fn equal_priority_updates_fold_left() {
        let updates = vec![
            Update::new(add(1), Lanes::DEFAULT),
            Update::new(Action::Transform(Rc::new(|s: &i32| s * 10)), Lanes::DEFAULT),
            Update::new(add(3), Lanes::DEFAULT),
        ];
        let processed = process_update_queue(&2, &updates, Lanes::DEFAULT);
        assert_eq!(processed.memoized_state, 33);
        assert_eq!(processed.base_state, 33);
        assert!(processed.base_queue.is_empty());
        assert!(processed.skipped_lanes.is_empty());
    }

    #[test]
    fn skipped_update_freezes_base_and_keeps_tail() {
        let updates = vec![
            Update::new(add(1), Lanes::SYNC),
            Update::new(add(10), Lanes::DEFAULT),
            Update::new(add(100), Lanes::SYNC),
        ];
        let processed = process_update_queue(&0, &updates, Lanes::SYNC);
        assert_eq!(processed.memoized_state, 101);
        assert_eq!(processed.base_state, 1);
        assert_eq!(processed.skipped_lanes, Lanes::DEFAULT);
        let lanes: Vec<Lanes> = processed.base_queue.iter().map(Update::lane).collect();
        assert_eq!(lanes, vec![Lanes::DEFAULT, Lanes::NONE]);

        let replay = process_update_queue(&processed.base_state, &processed.base_queue, Lanes::DEFAULT);
        assert_eq!(replay.memoized_state, 111);
        assert!(replay.base_queue.is_empty());
    }

    #[test]
    fn merge_pending_writes_back_to_committed_queue() {
        let shared: SharedQueue<i32> = Rc::new(RefCell::new(UpdateQueue::new()));
        let committed = RefCell::new(vec![Update::new(add(1), Lanes::DEFAULT)]);
        shared.borrow_mut().enqueue(Update::new(add(2), Lanes::SYNC));

        let merged = merge_pending(&committed, &shared);
        assert_eq!(merged.len(), 2);
        assert_eq!(committed.borrow().len(), 2);
        assert!(shared.borrow().is_empty());
    }
}
