//! Root scheduling state.
//!
//! A root moves through Idle → Scheduled(lane, mode) → Rendering →
//! Committing. The reconciler keeps the lane bookkeeping here; the decisions
//! (`ensure_root_is_scheduled`, `perform_*_work_on_root`) live in
//! `work_loop` because they drive the render and commit phases.
//!
//! Requests produced outside the reconciler's own call stack (dispatchers,
//! resolved resources) are parked in `LaneContext` and turned into root work
//! by `Reconciler::schedule_pending`.

use crate::fiber::FiberId;
use crate::hooks::EffectRef;
use crate::lanes::{Lane, Lanes, RootLanes};
use crate::suspense::WakeableId;
use core_types::{HostHandle, PriorityClass, TaskHandle};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RootId(pub(crate) u32);

impl RootId {
    pub fn index(self) -> u32 {
        self.0
    }
}

/// Work the reconciler asks the host scheduler to run later.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Task {
    /// Drain the synchronous queue. Scheduled as a microtask.
    FlushSync,
    /// Render (time-sliced) and commit the root's next lane.
    PerformConcurrent(RootId),
    /// Run the root's pending passive effects.
    FlushPassiveEffects(RootId),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskStatus {
    Complete,
    /// The task yielded; the host must run it again later.
    Continue,
}

/// Effect lists collected by a commit, split by origin.
#[derive(Default)]
pub(crate) struct PendingPassiveEffects {
    pub(crate) unmount: Vec<Rc<[EffectRef]>>,
    pub(crate) update: Vec<Rc<[EffectRef]>>,
}

impl PendingPassiveEffects {
    pub(crate) fn is_empty(&self) -> bool {
        self.unmount.is_empty() && self.update.is_empty()
    }
}

pub(crate) struct FiberRoot {
    pub(crate) container: HostHandle,
    pub(crate) current: FiberId,
    pub(crate) lanes: RootLanes,
    pub(crate) callback_node: Option<TaskHandle>,
    pub(crate) callback_priority: Lane,
    pub(crate) pending_passive: PendingPassiveEffects,
    pub(crate) passive_scheduled: bool,
    /// Wakeables already carrying a root ping listener, by lanes attached.
    pub(crate) ping_cache: HashMap<WakeableId, Lanes>,
    /// Wakeables already carrying a retry listener for a boundary.
    pub(crate) retry_cache: HashSet<(WakeableId, FiberId)>,
}

impl FiberRoot {
    pub(crate) fn new(container: HostHandle, current: FiberId) -> Self {
        Self {
            container,
            current,
            lanes: RootLanes::default(),
            callback_node: None,
            callback_priority: Lanes::NONE,
            pending_passive: PendingPassiveEffects::default(),
            passive_scheduled: false,
            ping_cache: HashMap::new(),
            retry_cache: HashSet::new(),
        }
    }
}

/// FIFO of roots with synchronous work, drained from a microtask.
#[derive(Default)]
pub(crate) struct SyncQueue {
    roots: Vec<RootId>,
    pub(crate) flushing: bool,
}

impl SyncQueue {
    pub(crate) fn push(&mut self, root: RootId) {
        if !self.roots.contains(&root) {
            self.roots.push(root);
        }
    }

    pub(crate) fn take(&mut self) -> Vec<RootId> {
        std::mem::take(&mut self.roots)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}

pub(crate) enum WorkRequest {
    Update {
        root: RootId,
        fiber: FiberId,
        lane: Lane,
    },
    Ping {
        root: RootId,
        lane: Lane,
        wakeable: WakeableId,
        boundary: Option<FiberId>,
    },
}

/// Ambient update priority and the mailbox of parked work requests, shared
/// with every dispatcher and ping listener.
pub(crate) struct LaneContext {
    priority: Cell<PriorityClass>,
    transition_depth: Cell<u32>,
    requests: RefCell<Vec<WorkRequest>>,
}

impl LaneContext {
    pub(crate) fn new(default_priority: PriorityClass) -> Rc<Self> {
        Rc::new(Self {
            priority: Cell::new(default_priority),
            transition_depth: Cell::new(0),
            requests: RefCell::new(Vec::new()),
        })
    }

    pub(crate) fn request_update_lane(&self) -> Lane {
        if self.transition_depth.get() > 0 {
            return Lanes::TRANSITION;
        }
        Lanes::from_priority_class(self.priority.get())
    }

    pub(crate) fn with_priority<R>(&self, priority: PriorityClass, f: impl FnOnce() -> R) -> R {
        let previous = self.priority.replace(priority);
        let result = f();
        self.priority.set(previous);
        result
    }

    pub(crate) fn with_transition<R>(&self, f: impl FnOnce() -> R) -> R {
        self.transition_depth.set(self.transition_depth.get() + 1);
        let result = f();
        self.transition_depth.set(self.transition_depth.get() - 1);
        result
    }

    pub(crate) fn push(&self, request: WorkRequest) {
        self.requests.borrow_mut().push(request);
    }

    pub(crate) fn take_requests(&self) -> Vec<WorkRequest> {
        std::mem::take(&mut *self.requests.borrow_mut())
    }

    pub(crate) fn has_requests(&self) -> bool {
        !self.requests.borrow().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_marker_overrides_ambient_priority() {
        let cx = LaneContext::new(PriorityClass::Normal);
        assert_eq!(cx.request_update_lane(), Lanes::DEFAULT);
        let lane = cx.with_priority(PriorityClass::Immediate, || {
            cx.with_transition(|| cx.request_update_lane())
        });
        assert_eq!(lane, Lanes::TRANSITION);
        assert_eq!(
            cx.with_priority(PriorityClass::Immediate, || cx.request_update_lane()),
            Lanes::SYNC
        );
        assert_eq!(cx.request_update_lane(), Lanes::DEFAULT);
    }

    #[test]
    fn sync_queue_coalesces_roots() {
        let mut queue = SyncQueue::default();
        queue.push(RootId(0));
        queue.push(RootId(0));
        queue.push(RootId(1));
        assert_eq!(queue.take(), vec![RootId(0), RootId(1)]);
        assert!(queue.is_empty());
    }
}
