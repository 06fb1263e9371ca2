//! The reconciler: entry points, the render loop and root scheduling.
//!
//! Flow of one update:
//! 1. `render` or a `Dispatch` enqueues an update and marks its lane from
//!    the fiber up to the root (`schedule_pending` does this for requests
//!    parked by dispatchers and ping listeners).
//! 2. `ensure_root_is_scheduled` asks the host for a `FlushSync` microtask
//!    or a `PerformConcurrent` task at the lane's priority, replacing any
//!    callback of a different priority.
//! 3. The task renders the root (sliced unless synchronous), commits a
//!    completed tree, and schedules again if lanes remain.
//!
//! Only one render is in flight at a time. Starting a render for another
//! root or lane discards the in-progress tree.

use crate::commit::CommitPhase;
use crate::config::ReconcilerConfig;
use crate::context::ContextStack;
use crate::counters::Counters;
use crate::element::Child;
use crate::error::{Interrupt, ReconcilerError};
use crate::fiber::{
    FiberArena, FiberId, FiberNode, FiberQueue, MemoizedState, Props, RootState, StateNode,
    WorkTag, create_work_in_progress, debug_tree,
};
use crate::flags::{Flags, HookFlags};
use crate::host::{HostBackend, HostScheduler};
use crate::lanes::{Lane, Lanes, RootLanes};
use crate::scheduler::{FiberRoot, LaneContext, RootId, SyncQueue, Task, TaskStatus, WorkRequest};
use crate::suspense::{PingListener, Wakeable};
use crate::update_queue::{Action, Update, UpdateQueue};
use core_types::{HostHandle, PriorityClass};
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) enum ExitStatus {
    #[default]
    InProgress,
    Completed,
    /// Suspended with no boundary to capture it.
    DidNotComplete,
}

/// How a call to `render_root` ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RootExit {
    Yielded,
    Completed,
    DidNotComplete,
}

/// Work-in-progress state of the render in flight.
#[derive(Default)]
pub(crate) struct RenderState {
    pub(crate) root: Option<RootId>,
    pub(crate) wip_root: Option<FiberId>,
    pub(crate) work_in_progress: Option<FiberId>,
    pub(crate) render_lane: Lane,
    pub(crate) exit_status: ExitStatus,
    pub(crate) contexts: ContextStack,
    /// Suspense boundaries entered on the current path, innermost last.
    pub(crate) suspense_handlers: Vec<FiberId>,
    pub(crate) did_receive_update: bool,
    /// Lanes updated on this root while the render was in flight.
    pub(crate) interleaved_lanes: Lanes,
}

impl RenderState {
    fn reset(&mut self) {
        self.root = None;
        self.wip_root = None;
        self.work_in_progress = None;
        self.render_lane = Lanes::NONE;
        self.exit_status = ExitStatus::InProgress;
        self.contexts.clear();
        self.suspense_handlers.clear();
        self.did_receive_update = false;
        self.interleaved_lanes = Lanes::NONE;
    }
}

/// Borrowed view of the reconciler handed to begin, complete and unwind.
pub(crate) struct RenderPhase<'a> {
    pub(crate) arena: &'a mut FiberArena,
    pub(crate) host: &'a mut dyn HostBackend,
    pub(crate) state: &'a mut RenderState,
    pub(crate) root: &'a mut FiberRoot,
    pub(crate) root_id: RootId,
    pub(crate) lanes: &'a Rc<LaneContext>,
    pub(crate) counters: &'a mut Counters,
}

impl RenderPhase<'_> {
    fn work_loop_sync(&mut self) -> Result<(), Interrupt> {
        while let Some(unit) = self.state.work_in_progress {
            self.perform_unit_of_work(unit)?;
        }
        Ok(())
    }

    /// Performs at least one unit, then stops as soon as the host asks to
    /// yield or the slice cap is reached.
    fn work_loop_concurrent(
        &mut self,
        scheduler: &mut dyn HostScheduler,
        max_units: Option<u32>,
        units: &mut u32,
    ) -> Result<(), Interrupt> {
        while let Some(unit) = self.state.work_in_progress {
            if *units > 0 && (max_units.is_some_and(|max| *units >= max) || scheduler.should_yield()) {
                return Ok(());
            }
            self.perform_unit_of_work(unit)?;
            *units += 1;
        }
        Ok(())
    }

    fn perform_unit_of_work(&mut self, unit: FiberId) -> Result<(), Interrupt> {
        let current = self.arena[unit].alternate.filter(|id| self.arena.contains(*id));
        let next = self.begin_work(current, unit)?;
        let node = &mut self.arena[unit];
        node.memoized_props = Some(node.pending_props.clone());
        self.counters.units_of_work += 1;
        match next {
            Some(next) => self.state.work_in_progress = Some(next),
            None => self.complete_unit_of_work(unit),
        }
        Ok(())
    }

    fn complete_unit_of_work(&mut self, unit: FiberId) {
        let mut completed = unit;
        loop {
            let current = self.arena[completed].alternate.filter(|id| self.arena.contains(*id));
            self.complete_work(current, completed);
            if let Some(sibling) = self.arena[completed].sibling {
                self.state.work_in_progress = Some(sibling);
                return;
            }
            match self.arena[completed].parent {
                Some(parent) => completed = parent,
                None => {
                    self.state.work_in_progress = None;
                    if self.state.exit_status == ExitStatus::InProgress {
                        self.state.exit_status = ExitStatus::Completed;
                    }
                    return;
                }
            }
        }
    }

    /// Handles an interrupt raised by the unit in progress. Suspensions are
    /// routed to the nearest boundary; anything else aborts the render.
    fn throw_and_unwind(&mut self, interrupt: Interrupt) -> Result<(), ReconcilerError> {
        let Some(unit) = self.state.work_in_progress else {
            return Ok(());
        };
        match interrupt {
            Interrupt::Suspend(wakeable) => {
                self.counters.suspensions += 1;
                let boundary = self.state.suspense_handlers.last().copied();
                log::debug!(
                    target: "reconciler.suspense",
                    "{} suspended on {wakeable:?}, boundary {boundary:?}",
                    self.arena[unit].tag.name()
                );
                self.attach_ping_listener(&wakeable, boundary);
                match boundary {
                    Some(boundary) => {
                        self.arena[boundary].flags |= Flags::SHOULD_CAPTURE;
                        self.unwind_unit_of_work(unit);
                    }
                    None => {
                        self.state.exit_status = ExitStatus::DidNotComplete;
                        self.state.work_in_progress = None;
                    }
                }
                Ok(())
            }
            Interrupt::Violation(violation) => Err(ReconcilerError::Hook(violation)),
            Interrupt::Failed(message) => Err(ReconcilerError::Component {
                component: component_name(&self.arena[unit].tag),
                message,
            }),
        }
    }

    /// Subscribes a root ping (no boundary) or a boundary retry, at most
    /// once per wakeable and lane, or per wakeable and boundary.
    fn attach_ping_listener(&mut self, wakeable: &Wakeable, boundary: Option<FiberId>) {
        let lane = self.state.render_lane;
        let id = wakeable.id();
        match boundary {
            None => {
                let attached = self.root.ping_cache.entry(id).or_insert(Lanes::NONE);
                if lane.is_subset_of(*attached) {
                    return;
                }
                *attached |= lane;
            }
            Some(boundary) => {
                if !self.root.retry_cache.insert((id, boundary)) {
                    return;
                }
            }
        }
        wakeable.subscribe(PingListener {
            lanes: Rc::downgrade(self.lanes),
            root: self.root_id,
            lane,
            wakeable: id,
            boundary,
        });
    }

    /// Walks up from `unit` until a fiber asks to render again.
    fn unwind_unit_of_work(&mut self, unit: FiberId) {
        let mut incomplete = Some(unit);
        while let Some(id) = incomplete {
            if let Some(next) = self.unwind_work(id) {
                self.state.work_in_progress = Some(next);
                return;
            }
            let parent = self.arena[id].parent;
            if let Some(parent) = parent {
                let node = &mut self.arena[parent];
                node.subtree_flags = Flags::empty();
                node.deletions.clear();
            }
            incomplete = parent;
        }
        self.state.exit_status = ExitStatus::DidNotComplete;
        self.state.work_in_progress = None;
    }

    /// Pops what `id` pushed on the way down. A boundary asked to capture
    /// returns itself so it is begun again with its fallback.
    fn unwind_work(&mut self, id: FiberId) -> Option<FiberId> {
        match self.arena[id].tag {
            WorkTag::ContextProvider(context) => {
                self.state.contexts.pop(context);
                None
            }
            WorkTag::Suspense => {
                if self.state.suspense_handlers.last() == Some(&id) {
                    self.state.suspense_handlers.pop();
                }
                let node = &mut self.arena[id];
                if !node.flags.contains(Flags::SHOULD_CAPTURE) {
                    return None;
                }
                node.flags.remove(Flags::SHOULD_CAPTURE | Flags::CHILD_DELETION);
                node.flags |= Flags::DID_CAPTURE;
                node.deletions.clear();
                Some(id)
            }
            _ => None,
        }
    }
}

fn component_name(tag: &WorkTag) -> &'static str {
    match tag {
        WorkTag::FunctionComponent(component) => component.name(),
        WorkTag::Memo(memo) => memo.component().name(),
        WorkTag::HostRoot => "Root",
        WorkTag::Suspense => "Suspense",
        WorkTag::ContextProvider(_) => "Provider",
        _ => "host",
    }
}

/// Adds `lane` to `fiber` and `child_lanes` along its ancestors, on both
/// buffers. Returns the root reached, or `None` for a detached fiber.
pub(crate) fn mark_update_lane_from_fiber_to_root(
    arena: &mut FiberArena,
    fiber: FiberId,
    lane: Lane,
) -> Option<RootId> {
    let node = arena.get_mut(fiber)?;
    node.lanes |= lane;
    let alternate = node.alternate;
    let mut parent = node.parent;
    if let Some(alternate) = alternate.and_then(|id| arena.get_mut(id)) {
        alternate.lanes |= lane;
    }

    let mut top = fiber;
    while let Some(id) = parent {
        let node = arena.get_mut(id)?;
        node.child_lanes |= lane;
        let alternate = node.alternate;
        parent = node.parent;
        if let Some(alternate) = alternate.and_then(|id| arena.get_mut(id)) {
            alternate.child_lanes |= lane;
        }
        top = id;
    }
    match arena.get(top)?.state_node {
        StateNode::Root(root) => Some(root),
        _ => None,
    }
}

pub struct Reconciler<H: HostBackend, S: HostScheduler> {
    host: H,
    scheduler: S,
    config: ReconcilerConfig,
    arena: FiberArena,
    roots: Vec<FiberRoot>,
    lanes: Rc<LaneContext>,
    render: RenderState,
    sync_queue: SyncQueue,
    sync_flush_scheduled: bool,
    counters: Counters,
}

impl<H: HostBackend, S: HostScheduler> Reconciler<H, S> {
    pub fn new(host: H, scheduler: S, config: ReconcilerConfig) -> Self {
        let lanes = LaneContext::new(config.default_priority);
        Self {
            host,
            scheduler,
            config,
            arena: FiberArena::new(),
            roots: Vec::new(),
            lanes,
            render: RenderState::default(),
            sync_queue: SyncQueue::default(),
            sync_flush_scheduled: false,
            counters: Counters::default(),
        }
    }

    pub fn create_root(&mut self, container: HostHandle) -> RootId {
        let id = RootId(self.roots.len() as u32);
        let mut node = FiberNode::new(WorkTag::HostRoot, Props::Empty, None);
        node.state_node = StateNode::Root(id);
        node.memoized_props = Some(Props::Empty);
        node.memoized_state = MemoizedState::Root(Rc::new(RootState {
            base_state: Child::Empty,
            base_queue: RefCell::new(Vec::new()),
        }));
        node.update_queue = FiberQueue::Root(Rc::new(RefCell::new(UpdateQueue::new())));
        let current = self.arena.alloc(node);
        self.roots.push(FiberRoot::new(container, current));
        log::debug!(target: "reconciler.scheduler", "created {id:?} in {container:?}");
        id
    }

    /// Replaces the root's element at the synchronous lane. The work runs
    /// from the `FlushSync` microtask this schedules.
    pub fn render(&mut self, root: RootId, element: impl Into<Child>) -> Result<(), ReconcilerError> {
        self.update_container(root, element.into(), Lanes::SYNC)
    }

    pub fn render_with_priority(
        &mut self,
        root: RootId,
        element: impl Into<Child>,
        priority: PriorityClass,
    ) -> Result<(), ReconcilerError> {
        let lanes = Rc::clone(&self.lanes);
        let lane = lanes.with_priority(priority, || lanes.request_update_lane());
        self.update_container(root, element.into(), lane)
    }

    fn update_container(&mut self, root: RootId, element: Child, lane: Lane) -> Result<(), ReconcilerError> {
        let index = self.root_index(root)?;
        let current = self.roots[index].current;
        let FiberQueue::Root(queue) = &self.arena[current].update_queue else {
            return Err(ReconcilerError::UnknownRoot(root));
        };
        queue.borrow_mut().enqueue(Update::new(Action::Replace(element), lane));
        mark_update_lane_from_fiber_to_root(&mut self.arena, current, lane);
        log::debug!(target: "reconciler.scheduler", "render {root:?} at {lane:?}");
        self.schedule_update_on_root(root, lane);
        Ok(())
    }

    /// Entry point for the host scheduler. Runs under the priority of the
    /// event the host is dispatching.
    pub fn run_task(&mut self, task: Task) -> Result<TaskStatus, ReconcilerError> {
        let priority = self.scheduler.current_priority();
        let lanes = Rc::clone(&self.lanes);
        lanes.with_priority(priority, || self.run_task_inner(task))
    }

    fn run_task_inner(&mut self, task: Task) -> Result<TaskStatus, ReconcilerError> {
        log::trace!(target: "reconciler.scheduler", "run {task:?}");
        self.schedule_pending();
        match task {
            Task::FlushSync => {
                self.sync_flush_scheduled = false;
                self.flush_sync_queue()?;
                Ok(TaskStatus::Complete)
            }
            Task::PerformConcurrent(root) => self.perform_concurrent_work_on_root(root),
            Task::FlushPassiveEffects(root) => {
                self.flush_passive_effects(root)?;
                Ok(TaskStatus::Complete)
            }
        }
    }

    /// Turns updates and pings parked by dispatchers and resources into
    /// scheduled root work.
    pub fn schedule_pending(&mut self) {
        if !self.lanes.has_requests() {
            return;
        }
        for request in self.lanes.take_requests() {
            match request {
                WorkRequest::Update { root, fiber, lane } => {
                    match mark_update_lane_from_fiber_to_root(&mut self.arena, fiber, lane) {
                        Some(found) => {
                            if found != root {
                                log::warn!(
                                    target: "reconciler.scheduler",
                                    "update for {root:?} reached {found:?}"
                                );
                            }
                            self.schedule_update_on_root(found, lane);
                        }
                        None => {
                            log::warn!(
                                target: "reconciler.scheduler",
                                "dropped update at {lane:?} for unmounted {fiber:?}"
                            );
                        }
                    }
                }
                WorkRequest::Ping {
                    root,
                    lane,
                    wakeable,
                    boundary: None,
                } => {
                    let Some(fiber_root) = self.roots.get_mut(root.index() as usize) else {
                        log::warn!(target: "reconciler.suspense", "ping for unknown {root:?}");
                        continue;
                    };
                    fiber_root.ping_cache.remove(&wakeable);
                    fiber_root.lanes.mark_pinged(lane);
                    log::debug!(target: "reconciler.suspense", "{root:?} pinged at {lane:?}");
                    self.ensure_root_is_scheduled(root);
                }
                WorkRequest::Ping {
                    root,
                    lane,
                    wakeable,
                    boundary: Some(boundary),
                } => {
                    let Some(fiber_root) = self.roots.get_mut(root.index() as usize) else {
                        log::warn!(target: "reconciler.suspense", "retry for unknown {root:?}");
                        continue;
                    };
                    fiber_root.retry_cache.remove(&(wakeable, boundary));
                    if mark_update_lane_from_fiber_to_root(&mut self.arena, boundary, lane).is_none() {
                        log::warn!(
                            target: "reconciler.suspense",
                            "retry for released boundary {boundary:?}"
                        );
                        continue;
                    }
                    log::debug!(target: "reconciler.suspense", "retry {boundary:?} at {lane:?}");
                    self.schedule_update_on_root(root, lane);
                }
            }
        }
    }

    /// Runs `f` with `priority` as the ambient update priority, then
    /// schedules whatever it dispatched.
    pub fn run_with_priority<R>(&mut self, priority: PriorityClass, f: impl FnOnce() -> R) -> R {
        let result = self.lanes.with_priority(priority, f);
        self.schedule_pending();
        result
    }

    /// Runs `f` with updates tagged as a transition.
    pub fn start_transition(&mut self, f: impl FnOnce()) {
        self.lanes.with_transition(f);
        self.schedule_pending();
    }

    /// Runs the root's pending passive effects, then schedules and flushes
    /// synchronous work they produced. Returns whether any effect list ran.
    pub fn flush_passive_effects(&mut self, root: RootId) -> Result<bool, ReconcilerError> {
        self.root_index(root)?;
        let flushed = self.run_passive_effects(root);
        self.schedule_pending();
        self.flush_sync_queue()?;
        Ok(flushed)
    }

    pub fn root_lanes(&self, root: RootId) -> Result<RootLanes, ReconcilerError> {
        let index = self.root_index(root)?;
        Ok(self.roots[index].lanes)
    }

    pub fn counters(&self) -> Counters {
        Counters {
            fibers_allocated: self.arena.allocated(),
            ..self.counters
        }
    }

    /// Live fibers across both buffers of every root.
    pub fn live_fibers(&self) -> usize {
        self.arena.len()
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }

    pub fn debug_tree(&self, root: RootId) -> Result<String, ReconcilerError> {
        let index = self.root_index(root)?;
        Ok(debug_tree(&self.arena, self.roots[index].current))
    }

    fn root_index(&self, root: RootId) -> Result<usize, ReconcilerError> {
        let index = root.index() as usize;
        if index < self.roots.len() {
            Ok(index)
        } else {
            Err(ReconcilerError::UnknownRoot(root))
        }
    }

    fn schedule_update_on_root(&mut self, root: RootId, lane: Lane) {
        let Some(fiber_root) = self.roots.get_mut(root.index() as usize) else {
            return;
        };
        fiber_root.lanes.mark_updated(lane);
        if self.render.root == Some(root) && self.render.wip_root.is_some() {
            self.render.interleaved_lanes |= lane;
        }
        self.ensure_root_is_scheduled(root);
    }

    /// Makes sure exactly one callback exists for the root's most urgent
    /// lane, cancelling a callback of another priority.
    fn ensure_root_is_scheduled(&mut self, root_id: RootId) {
        let Some(root) = self.roots.get_mut(root_id.index() as usize) else {
            return;
        };
        let next = root.lanes.next_lane();
        if next.is_empty() {
            if let Some(handle) = root.callback_node.take() {
                log::debug!(target: "reconciler.scheduler", "cancel {handle:?}, {root_id:?} has no work");
                self.scheduler.cancel_task(handle);
            }
            root.callback_priority = Lanes::NONE;
            return;
        }
        if next == root.callback_priority {
            return;
        }
        if let Some(handle) = root.callback_node.take() {
            log::debug!(target: "reconciler.scheduler", "cancel {handle:?}, {root_id:?} moves to {next:?}");
            self.scheduler.cancel_task(handle);
        }
        root.callback_priority = next;
        if next == Lanes::SYNC {
            self.sync_queue.push(root_id);
            if !self.sync_flush_scheduled {
                self.sync_flush_scheduled = true;
                self.scheduler.schedule_immediate(Task::FlushSync);
            }
            log::debug!(target: "reconciler.scheduler", "{root_id:?} queued for sync flush");
        } else {
            let priority = next.to_priority_class();
            let handle = self.scheduler.schedule_task(priority, Task::PerformConcurrent(root_id));
            log::debug!(target: "reconciler.scheduler", "{root_id:?} scheduled {handle:?} at {priority:?}");
            root.callback_node = Some(handle);
        }
    }

    /// Performs synchronous work for every queued root. Roots left behind by
    /// a failed render are queued again with a fresh microtask.
    fn flush_sync_queue(&mut self) -> Result<(), ReconcilerError> {
        if self.sync_queue.flushing {
            return Ok(());
        }
        self.sync_queue.flushing = true;
        let mut result = Ok(());
        'drain: loop {
            let roots = self.sync_queue.take();
            if roots.is_empty() {
                break;
            }
            for (i, root) in roots.iter().enumerate() {
                if let Err(error) = self.perform_sync_work_on_root(*root) {
                    for rest in &roots[i + 1..] {
                        self.sync_queue.push(*rest);
                    }
                    result = Err(error);
                    break 'drain;
                }
            }
        }
        self.sync_queue.flushing = false;
        if !self.sync_queue.is_empty() && !self.sync_flush_scheduled {
            self.sync_flush_scheduled = true;
            self.scheduler.schedule_immediate(Task::FlushSync);
        }
        result
    }

    fn perform_sync_work_on_root(&mut self, root_id: RootId) -> Result<(), ReconcilerError> {
        let index = self.root_index(root_id)?;
        self.roots[index].callback_priority = Lanes::NONE;
        if self.run_passive_effects(root_id) {
            self.schedule_pending();
        }
        let lane = self.roots[index].lanes.next_lane();
        if !lane.includes_some(Lanes::SYNC) {
            self.ensure_root_is_scheduled(root_id);
            return Ok(());
        }
        match self.render_root(root_id, Lanes::SYNC, false)? {
            RootExit::Completed => self.commit_root(root_id),
            RootExit::DidNotComplete => {
                self.roots[index].lanes.mark_suspended(Lanes::SYNC);
                self.ensure_root_is_scheduled(root_id);
            }
            RootExit::Yielded => self.ensure_root_is_scheduled(root_id),
        }
        Ok(())
    }

    fn perform_concurrent_work_on_root(&mut self, root_id: RootId) -> Result<TaskStatus, ReconcilerError> {
        let index = self.root_index(root_id)?;
        let original = self.roots[index].callback_node;
        if self.run_passive_effects(root_id) {
            self.schedule_pending();
            if self.roots[index].callback_node != original {
                return Ok(TaskStatus::Complete);
            }
        }

        let lane = self.roots[index].lanes.next_lane();
        if lane.is_empty() {
            self.ensure_root_is_scheduled(root_id);
            return Ok(TaskStatus::Complete);
        }
        let time_slice = !lane.includes_some(Lanes::SYNC);
        match self.render_root(root_id, lane, time_slice)? {
            RootExit::Yielded => {
                log::trace!(target: "reconciler.render", "{root_id:?} yielded at {lane:?}");
            }
            RootExit::Completed => self.commit_root(root_id),
            RootExit::DidNotComplete => self.roots[index].lanes.mark_suspended(lane),
        }
        self.ensure_root_is_scheduled(root_id);
        let callback = self.roots[index].callback_node;
        if callback.is_some() && callback == original {
            Ok(TaskStatus::Continue)
        } else {
            Ok(TaskStatus::Complete)
        }
    }

    fn prepare_fresh_stack(&mut self, root_id: RootId, lane: Lane) {
        if let Some(previous) = self.render.root {
            log::debug!(
                target: "reconciler.render",
                "discard render of {previous:?} at {:?}",
                self.render.render_lane
            );
        }
        self.render.reset();
        let current = self.roots[root_id.index() as usize].current;
        let wip_root = create_work_in_progress(&mut self.arena, current, Props::Empty);
        self.render.root = Some(root_id);
        self.render.wip_root = Some(wip_root);
        self.render.work_in_progress = Some(wip_root);
        self.render.render_lane = lane;
        self.counters.renders_started += 1;
        log::debug!(target: "reconciler.render", "render {root_id:?} at {lane:?}");
    }

    fn render_root(&mut self, root_id: RootId, lane: Lane, time_slice: bool) -> Result<RootExit, ReconcilerError> {
        let index = self.root_index(root_id)?;
        let resumable = self.render.root == Some(root_id)
            && self.render.render_lane == lane
            && self.render.wip_root.is_some();
        if !resumable {
            self.prepare_fresh_stack(root_id, lane);
        }

        let max_units = self.config.max_units_per_slice;
        let Self {
            host,
            scheduler,
            arena,
            roots,
            lanes,
            render,
            counters,
            ..
        } = self;
        let mut phase = RenderPhase {
            arena,
            host,
            state: render,
            root: &mut roots[index],
            root_id,
            lanes,
            counters,
        };
        let mut units = 0;
        let outcome = loop {
            let step = if time_slice {
                phase.work_loop_concurrent(&mut *scheduler, max_units, &mut units)
            } else {
                phase.work_loop_sync()
            };
            match step {
                Ok(()) => break Ok(()),
                Err(interrupt) => {
                    if let Err(error) = phase.throw_and_unwind(interrupt) {
                        break Err(error);
                    }
                }
            }
        };

        if let Err(error) = outcome {
            log::error!(target: "reconciler.render", "render of {root_id:?} at {lane:?} aborted: {error}");
            self.render.reset();
            let root = &mut self.roots[index];
            root.callback_node = None;
            root.callback_priority = Lanes::NONE;
            return Err(error);
        }
        if self.render.work_in_progress.is_some() {
            return Ok(RootExit::Yielded);
        }
        match self.render.exit_status {
            ExitStatus::DidNotComplete => {
                log::debug!(target: "reconciler.render", "{root_id:?} suspended at {lane:?} with no boundary");
                self.render.reset();
                Ok(RootExit::DidNotComplete)
            }
            ExitStatus::Completed | ExitStatus::InProgress => {
                log::debug!(target: "reconciler.render", "render of {root_id:?} at {lane:?} completed");
                Ok(RootExit::Completed)
            }
        }
    }

    /// Applies the completed work-in-progress tree to the host and makes it
    /// the current tree.
    fn commit_root(&mut self, root_id: RootId) {
        let Some(finished) = self.render.wip_root else {
            return;
        };
        let lane = self.render.render_lane;
        let interleaved = self.render.interleaved_lanes;
        self.render.reset();
        self.run_passive_effects(root_id);

        let index = root_id.index() as usize;
        let Self {
            host,
            scheduler,
            arena,
            roots,
            config,
            counters,
            ..
        } = self;
        let root = &mut roots[index];
        root.callback_node = None;
        root.callback_priority = Lanes::NONE;
        // Skipped updates and work left under hidden trees stay on the
        // finished tree; updates dispatched mid-render may not be on it yet.
        let remaining = arena[finished].lanes | arena[finished].child_lanes | interleaved;
        root.lanes.mark_finished(remaining);

        let flags = arena[finished].flags | arena[finished].subtree_flags;
        if flags.intersects(Flags::PASSIVE_MASK) && !root.passive_scheduled {
            root.passive_scheduled = true;
            scheduler.schedule_task(PriorityClass::Normal, Task::FlushPassiveEffects(root_id));
        }

        log::debug!(target: "reconciler.commit", "commit {root_id:?} at {lane:?}");
        let mut commit = CommitPhase {
            arena: &mut *arena,
            host: &mut *host,
            container: root.container,
            passive: &mut root.pending_passive,
            counters: &mut *counters,
        };
        commit.commit_mutation_effects(finished);
        root.current = finished;
        commit.commit_layout_effects(finished);
        counters.commits += 1;

        if config.sweep_after_commit {
            let trees: Vec<FiberId> = roots.iter().map(|root| root.current).collect();
            let released = arena.sweep(&trees);
            counters.fibers_released += released as u64;
        }
        self.ensure_root_is_scheduled(root_id);
    }

    /// Runs the teardowns of unmounted effect lists, then the teardowns and
    /// setups of effects flagged in committed lists.
    fn run_passive_effects(&mut self, root_id: RootId) -> bool {
        let Some(root) = self.roots.get_mut(root_id.index() as usize) else {
            return false;
        };
        root.passive_scheduled = false;
        if root.pending_passive.is_empty() {
            return false;
        }
        let pending = std::mem::take(&mut root.pending_passive);
        self.counters.passive_flushes += 1;
        log::debug!(
            target: "reconciler.effects",
            "flush {root_id:?}: {} unmounted and {} updated effect lists",
            pending.unmount.len(),
            pending.update.len()
        );

        for effects in &pending.unmount {
            for effect in effects.iter() {
                effect.borrow().run_teardown();
            }
        }
        for effects in &pending.update {
            for effect in effects.iter() {
                let effect = effect.borrow();
                if effect.tag.contains(HookFlags::HAS_EFFECT) {
                    effect.run_teardown();
                }
            }
        }
        for effects in &pending.update {
            for effect in effects.iter() {
                let mut effect = effect.borrow_mut();
                if effect.tag.contains(HookFlags::HAS_EFFECT) {
                    effect.run_setup();
                }
            }
        }
        true
    }
}
