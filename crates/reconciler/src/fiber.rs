//! Fiber nodes and the arena that owns both buffers.
//!
//! Contract:
//! - Every link (`parent`, `child`, `sibling`, `alternate`) is a `FiberId`
//!   into one `FiberArena`; nothing outside the arena owns a fiber.
//! - `FiberId`s are generational, so an id held past its node's release
//!   (a dispatcher of an unmounted component, a ping for a deleted boundary)
//!   resolves to `None` instead of aliasing a reused slot.
//! - A fiber and its alternate are allocated once and then cloned in place by
//!   `create_work_in_progress` on every render.

use crate::context::ContextId;
use crate::element::{AnyProps, Child, Component, HostProps, Key, MemoComponent, NodeRef};
use crate::element::{ProviderProps, SuspenseProps};
use crate::flags::Flags;
use crate::hooks::{EffectRef, Hook};
use crate::lanes::Lanes;
use crate::scheduler::RootId;
use crate::update_queue::{SharedQueue, Update};
use core_types::HostHandle;
use std::cell::RefCell;
use std::fmt;
use std::ops::{Index, IndexMut};
use std::rc::Rc;
use std::sync::Arc;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FiberId {
    index: u32,
    generation: u32,
}

impl fmt::Debug for FiberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fiber#{}.{}", self.index, self.generation)
    }
}

/// Node kind, with the payload that identifies its type.
#[derive(Clone)]
pub(crate) enum WorkTag {
    HostRoot,
    HostComponent(Arc<str>),
    HostText,
    FunctionComponent(Component),
    Fragment,
    ContextProvider(ContextId),
    Suspense,
    Offscreen,
    Memo(MemoComponent),
}

impl WorkTag {
    pub(crate) fn same_type(&self, other: &WorkTag) -> bool {
        match (self, other) {
            (WorkTag::HostRoot, WorkTag::HostRoot)
            | (WorkTag::HostText, WorkTag::HostText)
            | (WorkTag::Fragment, WorkTag::Fragment)
            | (WorkTag::Suspense, WorkTag::Suspense)
            | (WorkTag::Offscreen, WorkTag::Offscreen) => true,
            (WorkTag::HostComponent(a), WorkTag::HostComponent(b)) => a == b,
            (WorkTag::FunctionComponent(a), WorkTag::FunctionComponent(b)) => a.same(b),
            (WorkTag::ContextProvider(a), WorkTag::ContextProvider(b)) => a == b,
            (WorkTag::Memo(a), WorkTag::Memo(b)) => a.same(b),
            _ => false,
        }
    }

    pub(crate) fn is_host(&self) -> bool {
        matches!(self, WorkTag::HostComponent(_) | WorkTag::HostText)
    }

    pub(crate) fn name(&self) -> &str {
        match self {
            WorkTag::HostRoot => "Root",
            WorkTag::HostComponent(tag) => &**tag,
            WorkTag::HostText => "#text",
            WorkTag::FunctionComponent(component) => component.name(),
            WorkTag::Fragment => "Fragment",
            WorkTag::ContextProvider(_) => "Provider",
            WorkTag::Suspense => "Suspense",
            WorkTag::Offscreen => "Offscreen",
            WorkTag::Memo(memo) => memo.component().name(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum OffscreenMode {
    Visible,
    Hidden,
}

pub(crate) struct OffscreenProps {
    pub(crate) mode: OffscreenMode,
    pub(crate) children: Child,
}

/// Per-tag input payload of a fiber.
#[derive(Clone)]
pub(crate) enum Props {
    Empty,
    Host(Rc<HostProps>),
    Text(Rc<str>),
    Component(AnyProps),
    Fragment(Rc<[Child]>),
    Provider(Rc<ProviderProps>),
    Suspense(Rc<SuspenseProps>),
    Offscreen(Rc<OffscreenProps>),
}

impl Props {
    /// Referential equality; text compares by content. `Empty` never
    /// matches, so a root always processes its queue.
    pub(crate) fn same(&self, other: &Props) -> bool {
        match (self, other) {
            (Props::Host(a), Props::Host(b)) => Rc::ptr_eq(a, b),
            (Props::Text(a), Props::Text(b)) => a == b,
            (Props::Component(a), Props::Component(b)) => Rc::ptr_eq(a, b),
            (Props::Fragment(a), Props::Fragment(b)) => Rc::ptr_eq(a, b),
            (Props::Provider(a), Props::Provider(b)) => Rc::ptr_eq(a, b),
            (Props::Suspense(a), Props::Suspense(b)) => Rc::ptr_eq(a, b),
            (Props::Offscreen(a), Props::Offscreen(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub(crate) fn offscreen_mode(&self) -> Option<OffscreenMode> {
        match self {
            Props::Offscreen(props) => Some(props.mode),
            _ => None,
        }
    }
}

/// Carried rebase state of the root queue.
pub(crate) struct RootState {
    pub(crate) base_state: Child,
    pub(crate) base_queue: RefCell<Vec<Update<Child>>>,
}

#[derive(Clone, Default)]
pub(crate) enum MemoizedState {
    #[default]
    None,
    Root(Rc<RootState>),
    Hooks(Rc<[Hook]>),
}

#[derive(Clone, Default)]
pub(crate) enum FiberQueue {
    #[default]
    None,
    Root(SharedQueue<Child>),
    Effects(Rc<[EffectRef]>),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) enum StateNode {
    #[default]
    None,
    Host(HostHandle),
    Root(RootId),
}

impl StateNode {
    pub(crate) fn host(self) -> Option<HostHandle> {
        match self {
            StateNode::Host(handle) => Some(handle),
            _ => None,
        }
    }
}

/// Contexts read during the last render, and lanes at which one of them
/// changed since.
#[derive(Clone, Debug, Default)]
pub(crate) struct Dependencies {
    pub(crate) contexts: Vec<ContextId>,
    pub(crate) lanes: Lanes,
}

pub(crate) struct FiberNode {
    pub(crate) tag: WorkTag,
    pub(crate) key: Option<Key>,
    pub(crate) state_node: StateNode,
    pub(crate) node_ref: Option<NodeRef>,

    pub(crate) parent: Option<FiberId>,
    pub(crate) child: Option<FiberId>,
    pub(crate) sibling: Option<FiberId>,
    pub(crate) index: usize,

    pub(crate) pending_props: Props,
    pub(crate) memoized_props: Option<Props>,
    pub(crate) memoized_state: MemoizedState,
    pub(crate) update_queue: FiberQueue,
    pub(crate) dependencies: Option<Dependencies>,

    pub(crate) alternate: Option<FiberId>,
    pub(crate) flags: Flags,
    pub(crate) subtree_flags: Flags,
    pub(crate) deletions: Vec<FiberId>,

    pub(crate) lanes: Lanes,
    pub(crate) child_lanes: Lanes,
}

impl FiberNode {
    pub(crate) fn new(tag: WorkTag, pending_props: Props, key: Option<Key>) -> Self {
        Self {
            tag,
            key,
            state_node: StateNode::None,
            node_ref: None,
            parent: None,
            child: None,
            sibling: None,
            index: 0,
            pending_props,
            memoized_props: None,
            memoized_state: MemoizedState::None,
            update_queue: FiberQueue::None,
            dependencies: None,
            alternate: None,
            flags: Flags::empty(),
            subtree_flags: Flags::empty(),
            deletions: Vec::new(),
            lanes: Lanes::NONE,
            child_lanes: Lanes::NONE,
        }
    }

    pub(crate) fn hooks(&self) -> Option<&Rc<[Hook]>> {
        match &self.memoized_state {
            MemoizedState::Hooks(hooks) => Some(hooks),
            _ => None,
        }
    }

    pub(crate) fn effects(&self) -> Option<&Rc<[EffectRef]>> {
        match &self.update_queue {
            FiberQueue::Effects(effects) => Some(effects),
            _ => None,
        }
    }

    pub(crate) fn offscreen_hidden(&self) -> bool {
        self.pending_props.offscreen_mode() == Some(OffscreenMode::Hidden)
    }
}

struct Slot {
    generation: u32,
    node: Option<FiberNode>,
}

pub(crate) struct FiberArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
    allocated: u64,
}

impl FiberArena {
    pub(crate) fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
            allocated: 0,
        }
    }

    pub(crate) fn alloc(&mut self, node: FiberNode) -> FiberId {
        self.live += 1;
        self.allocated += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            return FiberId {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        FiberId {
            index,
            generation: 0,
        }
    }

    pub(crate) fn get(&self, id: FiberId) -> Option<&FiberNode> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    pub(crate) fn get_mut(&mut self, id: FiberId) -> Option<&mut FiberNode> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
    }

    pub(crate) fn contains(&self, id: FiberId) -> bool {
        self.get(id).is_some()
    }

    pub(crate) fn len(&self) -> usize {
        self.live
    }

    /// Total allocations over the arena's lifetime.
    pub(crate) fn allocated(&self) -> u64 {
        self.allocated
    }

    fn release(&mut self, index: u32) {
        let slot = &mut self.slots[index as usize];
        if slot.node.take().is_some() {
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(index);
            self.live -= 1;
        }
    }

    /// Releases every fiber not reachable from `trees` through child and
    /// sibling links, keeping the alternates of reachable fibers alive.
    /// Returns the number of released fibers.
    pub(crate) fn sweep(&mut self, trees: &[FiberId]) -> usize {
        let mut marked = vec![false; self.slots.len()];
        let mut stack: Vec<FiberId> = trees.iter().copied().filter(|id| self.contains(*id)).collect();
        let mut reached = Vec::new();
        while let Some(id) = stack.pop() {
            let Some(node) = self.get(id) else {
                continue;
            };
            if marked[id.index as usize] {
                continue;
            }
            marked[id.index as usize] = true;
            reached.push(id);
            stack.extend(node.child);
            stack.extend(node.sibling);
        }
        for id in reached {
            if let Some(alternate) = self.get(id).and_then(|node| node.alternate) {
                if self.contains(alternate) {
                    marked[alternate.index as usize] = true;
                }
            }
        }
        let mut released = 0;
        for index in 0..self.slots.len() {
            if !marked[index] && self.slots[index].node.is_some() {
                self.release(index as u32);
                released += 1;
            }
        }
        if released > 0 {
            log::debug!(target: "reconciler.arena", "swept {released} fibers, {} live", self.live);
        }
        released
    }
}

impl Index<FiberId> for FiberArena {
    type Output = FiberNode;

    fn index(&self, id: FiberId) -> &FiberNode {
        match self.get(id) {
            Some(node) => node,
            None => panic!("stale fiber id {id:?}"),
        }
    }
}

impl IndexMut<FiberId> for FiberArena {
    fn index_mut(&mut self, id: FiberId) -> &mut FiberNode {
        match self.get_mut(id) {
            Some(node) => node,
            None => panic!("stale fiber id {id:?}"),
        }
    }
}

/// Returns the work-in-progress twin of `current`, reusing the alternate
/// when one exists.
pub(crate) fn create_work_in_progress(
    arena: &mut FiberArena,
    current: FiberId,
    pending_props: Props,
) -> FiberId {
    let existing = arena[current].alternate;
    let wip = match existing {
        Some(wip) if arena.contains(wip) => {
            let node = &mut arena[wip];
            node.pending_props = pending_props;
            node.flags = Flags::empty();
            node.subtree_flags = Flags::empty();
            node.deletions.clear();
            wip
        }
        _ => {
            let source = &arena[current];
            let mut node = FiberNode::new(source.tag.clone(), pending_props, source.key.clone());
            node.state_node = source.state_node;
            node.alternate = Some(current);
            let wip = arena.alloc(node);
            arena[current].alternate = Some(wip);
            wip
        }
    };

    let source = &arena[current];
    let tag = source.tag.clone();
    let child = source.child;
    let sibling = source.sibling;
    let index = source.index;
    let memoized_props = source.memoized_props.clone();
    let memoized_state = source.memoized_state.clone();
    let update_queue = source.update_queue.clone();
    let dependencies = source.dependencies.clone();
    let node_ref = source.node_ref.clone();
    let state_node = source.state_node;
    let lanes = source.lanes;
    let child_lanes = source.child_lanes;

    let node = &mut arena[wip];
    node.tag = tag;
    node.child = child;
    node.sibling = sibling;
    node.index = index;
    node.memoized_props = memoized_props;
    node.memoized_state = memoized_state;
    node.update_queue = update_queue;
    node.dependencies = dependencies;
    node.node_ref = node_ref;
    node.state_node = state_node;
    node.lanes = lanes;
    node.child_lanes = child_lanes;
    wip
}

/// Indented dump of the subtree rooted at `id`, one fiber per line.
pub(crate) fn debug_tree(arena: &FiberArena, id: FiberId) -> String {
    use std::fmt::Write;

    let mut out = String::new();
    let mut stack = vec![(id, 0usize)];
    while let Some((id, depth)) = stack.pop() {
        let Some(node) = arena.get(id) else {
            continue;
        };
        let _ = write!(&mut out, "{:indent$}{}", "", node.tag.name(), indent = depth * 2);
        if let Some(key) = &node.key {
            let _ = write!(&mut out, " key={key:?}");
        }
        match &node.memoized_props {
            Some(Props::Text(text)) => {
                let _ = write!(&mut out, " {text:?}");
            }
            Some(Props::Offscreen(props)) => {
                let _ = write!(&mut out, " {:?}", props.mode);
            }
            _ => {}
        }
        out.push('\n');

        let mut children = Vec::new();
        let mut child = node.child;
        while let Some(c) = child {
            children.push(c);
            child = arena.get(c).and_then(|n| n.sibling);
        }
        for c in children.into_iter().rev() {
            stack.push((c, depth + 1));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(arena: &mut FiberArena, content: &str) -> FiberId {
        arena.alloc(FiberNode::new(WorkTag::HostText, Props::Text(Rc::from(content)), None))
    }

    #[test]
    fn stale_ids_do_not_alias_reused_slots() {
        let mut arena = FiberArena::new();
        let a = text(&mut arena, "a");
        assert_eq!(arena.sweep(&[]), 1);
        let b = text(&mut arena, "b");
        assert!(arena.get(a).is_none());
        assert!(arena.get(b).is_some());
        assert_ne!(a, b);
    }

    #[test]
    fn work_in_progress_is_allocated_once() {
        let mut arena = FiberArena::new();
        let current = text(&mut arena, "a");
        let wip = create_work_in_progress(&mut arena, current, Props::Text(Rc::from("b")));
        arena[wip].flags = Flags::UPDATE;
        let again = create_work_in_progress(&mut arena, current, Props::Text(Rc::from("c")));
        assert_eq!(wip, again);
        assert_eq!(arena[current].alternate, Some(wip));
        assert_eq!(arena[wip].alternate, Some(current));
        assert!(arena[wip].flags.is_empty());
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn sweep_keeps_tree_and_alternates() {
        let mut arena = FiberArena::new();
        let root = arena.alloc(FiberNode::new(WorkTag::HostRoot, Props::Empty, None));
        let child = text(&mut arena, "kept");
        let orphan = text(&mut arena, "dropped");
        arena[root].child = Some(child);
        let root_wip = create_work_in_progress(&mut arena, root, Props::Empty);

        assert_eq!(arena.sweep(&[root]), 1);
        assert!(arena.contains(root_wip));
        assert!(arena.contains(child));
        assert!(!arena.contains(orphan));
    }

    #[test]
    fn same_type_compares_component_identity() {
        let a = Component::new("A", |_, _: &()| Ok(Child::Empty));
        let b = Component::new("A", |_, _: &()| Ok(Child::Empty));
        let tag = WorkTag::FunctionComponent(a.clone());
        assert!(tag.same_type(&WorkTag::FunctionComponent(a)));
        assert!(!tag.same_type(&WorkTag::FunctionComponent(b)));
    }
}
