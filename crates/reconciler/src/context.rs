//! Context values and change propagation.

use crate::element::{Child, Element};
use crate::fiber::{FiberArena, FiberId, WorkTag};
use crate::lanes::Lane;
use std::any::Any;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicU32, Ordering};

static NEXT_CONTEXT_ID: AtomicU32 = AtomicU32::new(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ContextId(u32);

/// A value that providers pass down to any depth of readers.
pub struct Context<T> {
    id: ContextId,
    default: Rc<T>,
}

impl<T> Clone for Context<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            default: Rc::clone(&self.default),
        }
    }
}

impl<T: 'static> Context<T> {
    pub fn new(default: T) -> Self {
        Self {
            id: ContextId(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed)),
            default: Rc::new(default),
        }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub(crate) fn default_value(&self) -> Rc<T> {
        Rc::clone(&self.default)
    }

    /// Provider element; readers re-render whenever a new `value` is
    /// provided.
    pub fn provide(&self, value: T, children: impl Into<Child>) -> Element {
        self.provide_rc(Rc::new(value), children)
    }

    /// Provider element for a shared value; readers re-render only when the
    /// allocation changes.
    pub fn provide_rc(&self, value: Rc<T>, children: impl Into<Child>) -> Element {
        Element::provider(self.id, value, children.into())
    }
}

/// Values of the providers currently on the begin/complete path.
#[derive(Default)]
pub(crate) struct ContextStack {
    values: HashMap<ContextId, Rc<dyn Any>>,
    saved: Vec<(ContextId, Option<Rc<dyn Any>>)>,
}

impl ContextStack {
    pub(crate) fn push(&mut self, id: ContextId, value: Rc<dyn Any>) {
        let previous = self.values.insert(id, value);
        self.saved.push((id, previous));
    }

    pub(crate) fn pop(&mut self, id: ContextId) {
        let Some((saved_id, previous)) = self.saved.pop() else {
            log::warn!(target: "reconciler.render", "context stack underflow for {id:?}");
            return;
        };
        debug_assert_eq!(saved_id, id, "unbalanced context provider stack");
        match previous {
            Some(value) => {
                self.values.insert(saved_id, value);
            }
            None => {
                self.values.remove(&saved_id);
            }
        }
    }

    pub(crate) fn read(&self, id: ContextId) -> Option<Rc<dyn Any>> {
        self.values.get(&id).cloned()
    }

    pub(crate) fn clear(&mut self) {
        self.values.clear();
        self.saved.clear();
    }

    #[cfg(test)]
    pub(crate) fn depth(&self) -> usize {
        self.saved.len()
    }
}

/// Marks every reader of `context` below `provider` with `lane`, along with
/// the child lanes of the path back up to the provider, so bailouts between
/// the two cannot skip the readers.
pub(crate) fn propagate_context_change(
    arena: &mut FiberArena,
    provider: FiberId,
    context: ContextId,
    lane: Lane,
) {
    let mut fiber = arena[provider].child;
    if let Some(first) = fiber {
        arena[first].parent = Some(provider);
    }
    while let Some(id) = fiber {
        let reads_context = arena[id]
            .dependencies
            .as_ref()
            .is_some_and(|deps| deps.contexts.contains(&context));
        let next = if reads_context {
            mark_reader(arena, id, lane);
            let parent = arena[id].parent;
            schedule_context_work_on_parent_path(arena, parent, provider, lane);
            arena[id].child
        } else {
            match &arena[id].tag {
                WorkTag::ContextProvider(nested) if *nested == context => None,
                _ => arena[id].child,
            }
        };

        fiber = match next {
            Some(child) => {
                arena[child].parent = Some(id);
                Some(child)
            }
            None => next_outside_subtree(arena, id, provider),
        };
    }
}

fn mark_reader(arena: &mut FiberArena, id: FiberId, lane: Lane) {
    let alternate = arena[id].alternate;
    for target in std::iter::once(id).chain(alternate) {
        let Some(node) = arena.get_mut(target) else {
            continue;
        };
        node.lanes |= lane;
        if let Some(deps) = node.dependencies.as_mut() {
            deps.lanes |= lane;
        }
    }
}

fn next_outside_subtree(arena: &mut FiberArena, from: FiberId, provider: FiberId) -> Option<FiberId> {
    let mut node = Some(from);
    while let Some(id) = node {
        if id == provider {
            return None;
        }
        if let Some(sibling) = arena[id].sibling {
            arena[sibling].parent = arena[id].parent;
            return Some(sibling);
        }
        node = arena[id].parent;
    }
    None
}

pub(crate) fn schedule_context_work_on_parent_path(
    arena: &mut FiberArena,
    from: Option<FiberId>,
    propagation_root: FiberId,
    lane: Lane,
) {
    let mut node = from;
    while let Some(id) = node {
        let alternate = arena[id].alternate;
        if !lane.is_subset_of(arena[id].child_lanes) {
            arena[id].child_lanes |= lane;
        }
        if let Some(alt) = alternate.and_then(|alt| arena.get_mut(alt)) {
            alt.child_lanes |= lane;
        }
        if id == propagation_root {
            break;
        }
        node = arena[id].parent;
    }
}
