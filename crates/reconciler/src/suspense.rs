//! Suspension: wait handles, ping listeners and boundary bookkeeping.
//!
//! A component that needs data which is not ready returns
//! `Interrupt::Suspend` carrying a `Wakeable`. The work loop then finds the
//! nearest boundary on the handler stack, attaches a ping listener to the
//! wakeable and unwinds to the boundary (see `work_loop::throw_and_unwind`).
//!
//! A resolved wakeable never calls back into the reconciler. Its listeners
//! park a `WorkRequest::Ping` in the shared `LaneContext`; the embedder's
//! next `Reconciler::schedule_pending` turns it into root work.

use crate::error::Interrupt;
use crate::fiber::{FiberArena, FiberId, OffscreenMode, Props};
use crate::lanes::Lane;
use crate::scheduler::{LaneContext, RootId, WorkRequest};
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_WAKEABLE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WakeableId(u64);

impl WakeableId {
    fn next() -> Self {
        WakeableId(NEXT_WAKEABLE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

trait Wake {
    fn id(&self) -> WakeableId;
    fn is_settled(&self) -> bool;
    fn subscribe(&self, listener: PingListener);
}

/// Handle to a pending wait, carried by a suspend signal.
#[derive(Clone)]
pub struct Wakeable(Rc<dyn Wake>);

impl Wakeable {
    pub fn id(&self) -> WakeableId {
        self.0.id()
    }

    pub fn is_settled(&self) -> bool {
        self.0.is_settled()
    }

    /// Registers `listener`, firing it immediately when the wait already
    /// settled.
    pub(crate) fn subscribe(&self, listener: PingListener) {
        if self.0.is_settled() {
            listener.ping();
        } else {
            self.0.subscribe(listener);
        }
    }
}

impl fmt::Debug for Wakeable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Wakeable({})", self.id().0)
    }
}

pub(crate) struct PingListener {
    pub(crate) lanes: Weak<LaneContext>,
    pub(crate) root: RootId,
    pub(crate) lane: Lane,
    pub(crate) wakeable: WakeableId,
    pub(crate) boundary: Option<FiberId>,
}

impl PingListener {
    fn ping(self) {
        let Some(lanes) = self.lanes.upgrade() else {
            return;
        };
        lanes.push(WorkRequest::Ping {
            root: self.root,
            lane: self.lane,
            wakeable: self.wakeable,
            boundary: self.boundary,
        });
    }
}

enum ResourceState<T> {
    Pending,
    Ready(T),
    Failed(String),
}

struct ResourceInner<T> {
    id: WakeableId,
    state: RefCell<ResourceState<T>>,
    listeners: RefCell<Vec<PingListener>>,
}

impl<T> Wake for ResourceInner<T> {
    fn id(&self) -> WakeableId {
        self.id
    }

    fn is_settled(&self) -> bool {
        !matches!(*self.state.borrow(), ResourceState::Pending)
    }

    fn subscribe(&self, listener: PingListener) {
        self.listeners.borrow_mut().push(listener);
    }
}

/// A value that becomes available later.
///
/// Reading a pending resource from a component suspends it; resolving the
/// resource pings every render that suspended on it.
pub struct Resource<T> {
    inner: Rc<ResourceInner<T>>,
}

impl<T> Clone for Resource<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone + 'static> Resource<T> {
    pub fn pending() -> Self {
        Self::with_state(ResourceState::Pending)
    }

    pub fn ready(value: T) -> Self {
        Self::with_state(ResourceState::Ready(value))
    }

    fn with_state(state: ResourceState<T>) -> Self {
        Self {
            inner: Rc::new(ResourceInner {
                id: WakeableId::next(),
                state: RefCell::new(state),
                listeners: RefCell::new(Vec::new()),
            }),
        }
    }

    pub fn resolve(&self, value: T) {
        self.settle(ResourceState::Ready(value));
    }

    /// Settles with an error; readers fail with `Interrupt::Failed`.
    pub fn reject(&self, message: impl Into<String>) {
        self.settle(ResourceState::Failed(message.into()));
    }

    fn settle(&self, state: ResourceState<T>) {
        if self.inner.is_settled() {
            log::warn!(target: "reconciler.suspense", "resource {:?} settled twice", self.inner.id);
            return;
        }
        *self.inner.state.borrow_mut() = state;
        let listeners = std::mem::take(&mut *self.inner.listeners.borrow_mut());
        log::debug!(
            target: "reconciler.suspense",
            "resource {:?} settled, pinging {} listeners",
            self.inner.id,
            listeners.len()
        );
        for listener in listeners {
            listener.ping();
        }
    }

    pub fn read(&self) -> Result<T, Interrupt> {
        match &*self.inner.state.borrow() {
            ResourceState::Ready(value) => Ok(value.clone()),
            ResourceState::Failed(message) => Err(Interrupt::Failed(message.clone())),
            ResourceState::Pending => Err(Interrupt::Suspend(self.wakeable())),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(*self.inner.state.borrow(), ResourceState::Ready(_))
    }

    pub fn wakeable(&self) -> Wakeable {
        let inner: Rc<dyn Wake> = self.inner.clone();
        Wakeable(inner)
    }
}

/// Whether the committed boundary is currently showing its fallback.
pub(crate) fn is_showing_fallback(arena: &FiberArena, current: FiberId) -> bool {
    arena[current]
        .child
        .and_then(|primary| arena.get(primary))
        .and_then(|primary| primary.memoized_props.as_ref())
        .and_then(Props::offscreen_mode)
        == Some(OffscreenMode::Hidden)
}
