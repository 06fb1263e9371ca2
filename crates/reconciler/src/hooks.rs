//! Component state runtime.
//!
//! `RenderCx` is the dispatcher a component receives while it executes. On
//! mount it records a new hook list; on update it walks the committed list
//! position by position and checks that the component declares the same
//! hooks in the same order.
//!
//! Invariants:
//! - A hook list is immutable once the render that built it finishes; the
//!   next render builds a fresh list from it.
//! - Every state cell of a fiber shares its `UpdateQueue` and `Dispatch`
//!   between the committed and the work-in-progress list, so dispatchers stay
//!   identity-stable across renders.
//! - Effect teardowns live in a slot shared by an effect and the records that
//!   carry it forward, and run at most once.

use crate::context::{Context, ContextId, ContextStack};
use crate::element::{AnyProps, Child, Component};
use crate::error::{HookKind, HookViolation, Interrupt};
use crate::fiber::{Dependencies, FiberArena, FiberId, FiberQueue, MemoizedState};
use crate::flags::{Flags, HookFlags};
use crate::lanes::{Lane, Lanes};
use crate::scheduler::{LaneContext, RootId, WorkRequest};
use crate::suspense::Resource;
use crate::update_queue::{
    Action, SharedQueue, Update, UpdateQueue, merge_pending, process_update_queue,
};
use std::any::Any;
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::{Rc, Weak};

/// Cleanup returned by an effect setup.
pub type Teardown = Box<dyn FnOnce()>;

type Setup = Box<dyn FnOnce() -> Option<Teardown>>;
type TeardownSlot = Rc<RefCell<Option<Teardown>>>;

pub(crate) type EffectRef = Rc<RefCell<Effect>>;

#[derive(Clone)]
pub(crate) enum Hook {
    State(Rc<dyn Any>),
    Effect(EffectRef),
    Ref(Rc<dyn Any>),
    Memo(Rc<MemoCell>),
}

impl Hook {
    fn kind(&self) -> HookKind {
        match self {
            Hook::State(_) => HookKind::State,
            Hook::Effect(_) => HookKind::Effect,
            Hook::Ref(_) => HookKind::Ref,
            Hook::Memo(_) => HookKind::Memo,
        }
    }
}

struct StateCell<T> {
    memoized: T,
    base_state: T,
    base_queue: RefCell<Vec<Update<T>>>,
    queue: SharedQueue<T>,
    dispatch: Dispatch<T>,
}

pub(crate) struct MemoCell {
    value: Rc<dyn Any>,
    deps: Deps,
}

pub(crate) struct Effect {
    pub(crate) tag: HookFlags,
    create: Option<Setup>,
    destroy: TeardownSlot,
    deps: Option<Deps>,
}

impl Effect {
    pub(crate) fn run_teardown(&self) {
        let teardown = self.destroy.borrow_mut().take();
        if let Some(teardown) = teardown {
            teardown();
        }
    }

    pub(crate) fn run_setup(&mut self) {
        if let Some(create) = self.create.take() {
            let teardown = create();
            *self.destroy.borrow_mut() = teardown;
        }
    }
}

/// Dependency value compared by identity (or by value for primitives).
#[derive(Clone)]
pub enum Dep {
    Bool(bool),
    Int(i64),
    Str(Rc<str>),
    Ptr(Rc<dyn Any>),
}

pub type Deps = Vec<Dep>;

impl Dep {
    pub fn ptr<T: 'static>(value: &Rc<T>) -> Dep {
        Dep::Ptr(value.clone())
    }
}

impl PartialEq for Dep {
    fn eq(&self, other: &Dep) -> bool {
        match (self, other) {
            (Dep::Bool(a), Dep::Bool(b)) => a == b,
            (Dep::Int(a), Dep::Int(b)) => a == b,
            (Dep::Str(a), Dep::Str(b)) => a == b,
            (Dep::Ptr(a), Dep::Ptr(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Dep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dep::Bool(v) => write!(f, "{v}"),
            Dep::Int(v) => write!(f, "{v}"),
            Dep::Str(v) => write!(f, "{v:?}"),
            Dep::Ptr(v) => write!(f, "Ptr({:p})", Rc::as_ptr(v)),
        }
    }
}

impl From<bool> for Dep {
    fn from(v: bool) -> Self {
        Dep::Bool(v)
    }
}

impl From<i32> for Dep {
    fn from(v: i32) -> Self {
        Dep::Int(i64::from(v))
    }
}

impl From<i64> for Dep {
    fn from(v: i64) -> Self {
        Dep::Int(v)
    }
}

impl From<u32> for Dep {
    fn from(v: u32) -> Self {
        Dep::Int(i64::from(v))
    }
}

impl From<usize> for Dep {
    fn from(v: usize) -> Self {
        Dep::Int(v as i64)
    }
}

impl From<&str> for Dep {
    fn from(v: &str) -> Self {
        Dep::Str(Rc::from(v))
    }
}

impl From<String> for Dep {
    fn from(v: String) -> Self {
        Dep::Str(Rc::from(v))
    }
}

impl From<Rc<str>> for Dep {
    fn from(v: Rc<str>) -> Self {
        Dep::Str(v)
    }
}

/// Builds a dependency list: `deps![count, "name"]`.
#[macro_export]
macro_rules! deps {
    ($($value:expr),* $(,)?) => {
        vec![$($crate::Dep::from($value)),*]
    };
}

/// Shallow comparison: same length and pairwise equal.
pub(crate) fn are_hook_inputs_equal(next: &[Dep], prev: &[Dep]) -> bool {
    next.len() == prev.len() && next.iter().zip(prev).all(|(a, b)| a == b)
}

/// Setter bound to one state cell.
pub struct Dispatch<T> {
    queue: SharedQueue<T>,
    fiber: FiberId,
    root: RootId,
    lanes: Weak<LaneContext>,
}

impl<T> Clone for Dispatch<T> {
    fn clone(&self) -> Self {
        Self {
            queue: Rc::clone(&self.queue),
            fiber: self.fiber,
            root: self.root,
            lanes: Weak::clone(&self.lanes),
        }
    }
}

impl<T> PartialEq for Dispatch<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.queue, &other.queue)
    }
}

impl<T> fmt::Debug for Dispatch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Dispatch({:?})", self.fiber)
    }
}

impl<T: 'static> Dispatch<T> {
    pub fn set(&self, value: T) {
        self.dispatch(Action::Replace(value));
    }

    pub fn update(&self, transform: impl Fn(&T) -> T + 'static) {
        self.dispatch(Action::Transform(Rc::new(transform)));
    }

    /// Queues `action` at the caller's ambient lane. The root picks it up on
    /// the next `Reconciler::schedule_pending`.
    pub fn dispatch(&self, action: Action<T>) {
        let Some(lanes) = self.lanes.upgrade() else {
            log::warn!(target: "reconciler.scheduler", "dispatch after reconciler was dropped");
            return;
        };
        let lane = lanes.request_update_lane();
        self.queue.borrow_mut().enqueue(Update::new(action, lane));
        lanes.push(WorkRequest::Update {
            root: self.root,
            fiber: self.fiber,
            lane,
        });
    }
}

/// Dispatcher that feeds actions through a reducer.
pub struct Reducer<S, A> {
    dispatch: Dispatch<S>,
    reducer: Rc<dyn Fn(&S, &A) -> S>,
}

impl<S, A> Clone for Reducer<S, A> {
    fn clone(&self) -> Self {
        Self {
            dispatch: self.dispatch.clone(),
            reducer: Rc::clone(&self.reducer),
        }
    }
}

impl<S: 'static, A: 'static> Reducer<S, A> {
    pub fn send(&self, action: A) {
        let reducer = Rc::clone(&self.reducer);
        self.dispatch.update(move |state| reducer(state, &action));
    }
}

/// Identity-stable mutable box returned by `use_ref`.
pub struct RefHandle<T>(Rc<RefCell<T>>);

impl<T> Clone for RefHandle<T> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<T> RefHandle<T> {
    pub fn borrow(&self) -> Ref<'_, T> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, T> {
        self.0.borrow_mut()
    }

    pub fn set(&self, value: T) {
        *self.0.borrow_mut() = value;
    }

    pub fn same(&self, other: &RefHandle<T>) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

/// Starts updates inside the transition lane and tracks a pending flag.
#[derive(Clone)]
pub struct StartTransition {
    set_pending: Dispatch<bool>,
}

impl StartTransition {
    pub fn start(&self, f: impl FnOnce()) {
        self.set_pending.set(true);
        let Some(lanes) = self.set_pending.lanes.upgrade() else {
            return;
        };
        lanes.with_transition(|| {
            self.set_pending.set(false);
            f();
        });
    }
}

/// Render-scoped access to hooks, context and resources.
pub struct RenderCx<'a> {
    component: &'static str,
    fiber: FiberId,
    root: RootId,
    render_lane: Lane,
    lanes: &'a Rc<LaneContext>,
    contexts: &'a ContextStack,
    current: Option<Rc<[Hook]>>,
    hooks: Vec<Hook>,
    effects: Vec<EffectRef>,
    flags: Flags,
    skipped_lanes: Lanes,
    did_receive_update: bool,
    dependencies: Vec<ContextId>,
}

pub(crate) struct HooksOutput {
    pub(crate) hooks: Rc<[Hook]>,
    pub(crate) effects: Rc<[EffectRef]>,
    pub(crate) flags: Flags,
    pub(crate) skipped_lanes: Lanes,
    pub(crate) did_receive_update: bool,
    pub(crate) dependencies: Vec<ContextId>,
}

impl<'a> RenderCx<'a> {
    pub(crate) fn new(
        component: &'static str,
        fiber: FiberId,
        root: RootId,
        render_lane: Lane,
        lanes: &'a Rc<LaneContext>,
        contexts: &'a ContextStack,
        current: Option<Rc<[Hook]>>,
    ) -> Self {
        Self {
            component,
            fiber,
            root,
            render_lane,
            lanes,
            contexts,
            current,
            hooks: Vec::new(),
            effects: Vec::new(),
            flags: Flags::empty(),
            skipped_lanes: Lanes::NONE,
            did_receive_update: false,
            dependencies: Vec::new(),
        }
    }

    pub fn component_name(&self) -> &'static str {
        self.component
    }

    pub fn is_mount(&self) -> bool {
        self.current.is_none()
    }

    /// Committed hook at the next position, or `None` while mounting.
    fn next_current(&self, kind: HookKind) -> Result<Option<Hook>, HookViolation> {
        let Some(current) = &self.current else {
            return Ok(None);
        };
        let index = self.hooks.len();
        let Some(hook) = current.get(index) else {
            return Err(HookViolation::CountMismatch {
                component: self.component,
                expected: current.len(),
                found: index + 1,
            });
        };
        if hook.kind() != kind {
            return Err(HookViolation::KindMismatch {
                component: self.component,
                index,
                expected: hook.kind(),
                found: kind,
            });
        }
        Ok(Some(hook.clone()))
    }

    pub fn use_state<T, F>(&mut self, init: F) -> Result<(T, Dispatch<T>), Interrupt>
    where
        T: Clone + PartialEq + 'static,
        F: FnOnce() -> T,
    {
        let index = self.hooks.len();
        let Some(hook) = self.next_current(HookKind::State)? else {
            let value = init();
            let queue: SharedQueue<T> = Rc::new(RefCell::new(UpdateQueue::new()));
            let dispatch = Dispatch {
                queue: Rc::clone(&queue),
                fiber: self.fiber,
                root: self.root,
                lanes: Rc::downgrade(self.lanes),
            };
            let cell = StateCell {
                memoized: value.clone(),
                base_state: value.clone(),
                base_queue: RefCell::new(Vec::new()),
                queue,
                dispatch: dispatch.clone(),
            };
            self.hooks.push(Hook::State(Rc::new(cell)));
            return Ok((value, dispatch));
        };

        let Hook::State(any) = hook else {
            return Err(self.state_type(index));
        };
        let Ok(cell) = any.downcast::<StateCell<T>>() else {
            return Err(self.state_type(index));
        };

        let merged = merge_pending(&cell.base_queue, &cell.queue);
        let next = if merged.is_empty() {
            StateCell {
                memoized: cell.memoized.clone(),
                base_state: cell.base_state.clone(),
                base_queue: RefCell::new(Vec::new()),
                queue: Rc::clone(&cell.queue),
                dispatch: cell.dispatch.clone(),
            }
        } else {
            let processed = process_update_queue(&cell.base_state, &merged, self.render_lane);
            self.skipped_lanes |= processed.skipped_lanes;
            StateCell {
                memoized: processed.memoized_state,
                base_state: processed.base_state,
                base_queue: RefCell::new(processed.base_queue),
                queue: Rc::clone(&cell.queue),
                dispatch: cell.dispatch.clone(),
            }
        };
        if next.memoized != cell.memoized {
            self.did_receive_update = true;
        }
        let result = (next.memoized.clone(), next.dispatch.clone());
        self.hooks.push(Hook::State(Rc::new(next)));
        Ok(result)
    }

    fn state_type(&self, index: usize) -> Interrupt {
        Interrupt::Violation(HookViolation::StateType {
            component: self.component,
            index,
        })
    }

    pub fn use_reducer<S, A, R>(&mut self, reducer: R, initial: S) -> Result<(S, Reducer<S, A>), Interrupt>
    where
        S: Clone + PartialEq + 'static,
        A: 'static,
        R: Fn(&S, &A) -> S + 'static,
    {
        let (state, dispatch) = self.use_state(|| initial)?;
        Ok((
            state,
            Reducer {
                dispatch,
                reducer: Rc::new(reducer),
            },
        ))
    }

    /// Passive effect gated by `deps`; `None` re-runs on every commit.
    pub fn use_effect<F>(&mut self, deps: Option<Deps>, setup: F) -> Result<(), Interrupt>
    where
        F: FnOnce() -> Option<Teardown> + 'static,
    {
        let Some(hook) = self.next_current(HookKind::Effect)? else {
            self.flags |= Flags::PASSIVE_EFFECT;
            self.push_effect(
                HookFlags::PASSIVE | HookFlags::HAS_EFFECT,
                Box::new(setup),
                Rc::new(RefCell::new(None)),
                deps,
            );
            return Ok(());
        };
        let committed = hook.kind();
        let Hook::Effect(prev) = hook else {
            return Err(HookViolation::KindMismatch {
                component: self.component,
                index: self.hooks.len(),
                expected: committed,
                found: HookKind::Effect,
            }
            .into());
        };
        let (prev_deps, destroy) = {
            let prev = prev.borrow();
            (prev.deps.clone(), Rc::clone(&prev.destroy))
        };
        let unchanged = match (&deps, &prev_deps) {
            (Some(next), Some(prev)) => are_hook_inputs_equal(next, prev),
            _ => false,
        };
        if unchanged {
            self.push_effect(HookFlags::PASSIVE, Box::new(setup), destroy, deps);
            return Ok(());
        }
        self.flags |= Flags::PASSIVE_EFFECT;
        self.push_effect(HookFlags::PASSIVE | HookFlags::HAS_EFFECT, Box::new(setup), destroy, deps);
        Ok(())
    }

    fn push_effect(&mut self, tag: HookFlags, create: Setup, destroy: TeardownSlot, deps: Option<Deps>) {
        let effect = Rc::new(RefCell::new(Effect {
            tag,
            create: Some(create),
            destroy,
            deps,
        }));
        self.effects.push(Rc::clone(&effect));
        self.hooks.push(Hook::Effect(effect));
    }

    pub fn use_ref<T, F>(&mut self, init: F) -> Result<RefHandle<T>, Interrupt>
    where
        T: 'static,
        F: FnOnce() -> T,
    {
        let index = self.hooks.len();
        let Some(hook) = self.next_current(HookKind::Ref)? else {
            let cell = Rc::new(RefCell::new(init()));
            self.hooks.push(Hook::Ref(cell.clone()));
            return Ok(RefHandle(cell));
        };
        let Hook::Ref(any) = hook else {
            return Err(self.state_type(index));
        };
        let Ok(cell) = any.clone().downcast::<RefCell<T>>() else {
            return Err(self.state_type(index));
        };
        self.hooks.push(Hook::Ref(any));
        Ok(RefHandle(cell))
    }

    /// Derived value recomputed only when `deps` change.
    pub fn use_memo<T, F>(&mut self, deps: Deps, compute: F) -> Result<Rc<T>, Interrupt>
    where
        T: 'static,
        F: FnOnce() -> T,
    {
        let index = self.hooks.len();
        if let Some(Hook::Memo(prev)) = self.next_current(HookKind::Memo)? {
            if are_hook_inputs_equal(&deps, &prev.deps) {
                let Ok(value) = prev.value.clone().downcast::<T>() else {
                    return Err(self.state_type(index));
                };
                self.hooks.push(Hook::Memo(prev));
                return Ok(value);
            }
        }
        let value = Rc::new(compute());
        self.hooks.push(Hook::Memo(Rc::new(MemoCell {
            value: value.clone(),
            deps,
        })));
        Ok(value)
    }

    pub fn use_callback<F: 'static>(&mut self, deps: Deps, callback: F) -> Result<Rc<F>, Interrupt> {
        self.use_memo(deps, || callback)
    }

    pub fn use_transition(&mut self) -> Result<(bool, StartTransition), Interrupt> {
        let (pending, set_pending) = self.use_state(|| false)?;
        Ok((pending, StartTransition { set_pending }))
    }

    /// Reads the nearest provided value and subscribes this component to it.
    pub fn use_context<T: 'static>(&mut self, context: &Context<T>) -> Rc<T> {
        if !self.dependencies.contains(&context.id()) {
            self.dependencies.push(context.id());
        }
        self.contexts
            .read(context.id())
            .and_then(|value| value.downcast::<T>().ok())
            .unwrap_or_else(|| context.default_value())
    }

    /// Returns the resource value, suspending while it is pending.
    pub fn use_resource<T: Clone + 'static>(&mut self, resource: &Resource<T>) -> Result<T, Interrupt> {
        resource.read()
    }

    pub(crate) fn finish(self) -> Result<HooksOutput, HookViolation> {
        if let Some(current) = &self.current {
            if current.len() != self.hooks.len() {
                return Err(HookViolation::CountMismatch {
                    component: self.component,
                    expected: current.len(),
                    found: self.hooks.len(),
                });
            }
        }
        Ok(HooksOutput {
            hooks: Rc::from(self.hooks),
            effects: Rc::from(self.effects),
            flags: self.flags,
            skipped_lanes: self.skipped_lanes,
            did_receive_update: self.did_receive_update,
            dependencies: self.dependencies,
        })
    }
}

pub(crate) struct HooksEnv<'a> {
    pub(crate) root: RootId,
    pub(crate) render_lane: Lane,
    pub(crate) lanes: &'a Rc<LaneContext>,
    pub(crate) contexts: &'a ContextStack,
}

/// Executes a function component and stores its hooks on `wip`.
///
/// Returns the rendered children and whether any state cell changed.
pub(crate) fn render_with_hooks(
    arena: &mut FiberArena,
    env: &HooksEnv<'_>,
    wip: FiberId,
    component: &Component,
    props: &AnyProps,
) -> Result<(Child, bool), Interrupt> {
    let current = arena[wip].alternate.and_then(|c| arena.get(c)).map(|node| {
        node.hooks()
            .cloned()
            .unwrap_or_else(|| Rc::from(Vec::<Hook>::new()))
    });
    let mut cx = RenderCx::new(
        component.name(),
        wip,
        env.root,
        env.render_lane,
        env.lanes,
        env.contexts,
        current,
    );
    let children = component.render(&mut cx, &**props)?;
    let output = cx.finish()?;

    let node = &mut arena[wip];
    node.memoized_state = MemoizedState::Hooks(output.hooks);
    node.update_queue = FiberQueue::Effects(output.effects);
    node.flags |= output.flags;
    node.lanes |= output.skipped_lanes;
    node.dependencies = if output.dependencies.is_empty() {
        None
    } else {
        Some(Dependencies {
            contexts: output.dependencies,
            lanes: Lanes::NONE,
        })
    };
    Ok((children, output.did_receive_update))
}

/// Undoes the effect bookkeeping of a render whose result is being
/// discarded in favour of the committed subtree.
pub(crate) fn bailout_hooks(arena: &mut FiberArena, wip: FiberId, current: FiberId, lane: Lane) {
    let queue = arena[current].update_queue.clone();
    let node = &mut arena[wip];
    node.update_queue = queue;
    node.flags.remove(Flags::PASSIVE_EFFECT);
    let current = &mut arena[current];
    current.lanes = current.lanes.remove(lane);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deps_compare_shallowly_by_identity() {
        let shared = Rc::new(5);
        let a = vec![Dep::from(1), Dep::from("x"), Dep::ptr(&shared)];
        let b = vec![Dep::from(1), Dep::from("x"), Dep::ptr(&shared)];
        let c = vec![Dep::from(1), Dep::from("x"), Dep::ptr(&Rc::new(5))];
        assert!(are_hook_inputs_equal(&a, &b));
        assert!(!are_hook_inputs_equal(&a, &c));
        assert!(!are_hook_inputs_equal(&a[..2], &a));
    }

    #[test]
    fn teardown_runs_once_across_carried_records() {
        let runs = Rc::new(RefCell::new(0));
        let slot: TeardownSlot = Rc::new(RefCell::new(None));
        let counter = Rc::clone(&runs);
        let mut first = Effect {
            tag: HookFlags::PASSIVE | HookFlags::HAS_EFFECT,
            create: Some(Box::new(move || {
                Some(Box::new(move || *counter.borrow_mut() += 1) as Teardown)
            })),
            destroy: Rc::clone(&slot),
            deps: None,
        };
        first.run_setup();
        let carried = Effect {
            tag: HookFlags::PASSIVE,
            create: None,
            destroy: Rc::clone(&slot),
            deps: None,
        };
        carried.run_teardown();
        first.run_teardown();
        assert_eq!(*runs.borrow(), 1);
    }

    #[test]
    fn deps_macro_builds_list() {
        let list: Deps = crate::deps![1, "a", true];
        assert_eq!(list.len(), 3);
        assert_eq!(list[2], Dep::Bool(true));
    }
}
