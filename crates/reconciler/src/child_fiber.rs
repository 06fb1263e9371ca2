//! Child reconciliation.
//!
//! Diffs the child description a fiber produced against the committed child
//! list and returns the first work-in-progress child. Reused fibers keep
//! their identity (and therefore their hooks and host nodes); everything
//! else is created fresh. Placement and deletion flags are only recorded
//! when `track_side_effects` is set: a freshly mounted parent inserts its
//! whole subtree in one go.
//!
//! Move detection is a single pass over the new list: a reused child whose
//! old index is below the highest old index placed so far is marked moved.

use crate::element::{Child, Element, ElementKind, Key};
use crate::fiber::{FiberArena, FiberId, FiberNode, Props, WorkTag, create_work_in_progress};
use crate::flags::Flags;
use std::collections::HashMap;
use std::rc::Rc;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum SlotKey {
    Key(Key),
    Index(usize),
}

pub(crate) struct ChildReconciler<'a> {
    arena: &'a mut FiberArena,
    track_side_effects: bool,
}

impl<'a> ChildReconciler<'a> {
    pub(crate) fn new(arena: &'a mut FiberArena, track_side_effects: bool) -> Self {
        Self {
            arena,
            track_side_effects,
        }
    }

    pub(crate) fn reconcile(
        &mut self,
        return_fiber: FiberId,
        current_first_child: Option<FiberId>,
        new_child: &Child,
    ) -> Option<FiberId> {
        if let Child::Element(element) = new_child {
            if let Some(children) = element.is_unkeyed_fragment() {
                return self.reconcile_array(return_fiber, current_first_child, children);
            }
        }
        match new_child {
            Child::Element(element) => {
                let fiber = self.reconcile_single_element(return_fiber, current_first_child, element);
                Some(self.place_single_child(fiber))
            }
            Child::Text(text) if !text.is_empty() => {
                let fiber = self.reconcile_single_text(return_fiber, current_first_child, text);
                Some(self.place_single_child(fiber))
            }
            Child::List(children) => self.reconcile_array(return_fiber, current_first_child, children),
            Child::Text(_) | Child::Empty => {
                self.delete_remaining_children(return_fiber, current_first_child);
                None
            }
        }
    }

    fn delete_child(&mut self, return_fiber: FiberId, child: FiberId) {
        if !self.track_side_effects {
            return;
        }
        let parent = &mut self.arena[return_fiber];
        parent.deletions.push(child);
        parent.flags |= Flags::CHILD_DELETION;
    }

    fn delete_remaining_children(&mut self, return_fiber: FiberId, first: Option<FiberId>) {
        if !self.track_side_effects {
            return;
        }
        let mut child = first;
        while let Some(id) = child {
            self.delete_child(return_fiber, id);
            child = self.arena[id].sibling;
        }
    }

    /// Indexes the old children from `first` by key or position. Of two old
    /// children sharing a key only the later one stays reusable; the other
    /// is deleted.
    fn map_remaining_children(&mut self, return_fiber: FiberId, first: FiberId) -> HashMap<SlotKey, FiberId> {
        let mut map = HashMap::new();
        let mut child = Some(first);
        while let Some(id) = child {
            child = self.arena[id].sibling;
            let key = self.slot_key(id);
            if let Some(displaced) = map.insert(key.clone(), id) {
                log::warn!(
                    target: "reconciler.begin",
                    "duplicate {key:?} under {return_fiber:?}, deleting {displaced:?}"
                );
                self.delete_child(return_fiber, displaced);
            }
        }
        map
    }

    fn slot_key(&self, fiber: FiberId) -> SlotKey {
        let node = &self.arena[fiber];
        match &node.key {
            Some(key) => SlotKey::Key(key.clone()),
            None => SlotKey::Index(node.index),
        }
    }

    fn use_fiber(&mut self, fiber: FiberId, props: Props) -> FiberId {
        let clone = create_work_in_progress(self.arena, fiber, props);
        let node = &mut self.arena[clone];
        node.index = 0;
        node.sibling = None;
        clone
    }

    fn place_child(&mut self, fiber: FiberId, last_placed_index: usize, new_index: usize) -> usize {
        self.arena[fiber].index = new_index;
        if !self.track_side_effects {
            return last_placed_index;
        }
        let old_index = self.arena[fiber]
            .alternate
            .and_then(|current| self.arena.get(current))
            .map(|current| current.index);
        match old_index {
            Some(old_index) if old_index < last_placed_index => {
                self.arena[fiber].flags |= Flags::PLACEMENT;
                last_placed_index
            }
            Some(old_index) => old_index,
            None => {
                self.arena[fiber].flags |= Flags::PLACEMENT;
                last_placed_index
            }
        }
    }

    fn place_single_child(&mut self, fiber: FiberId) -> FiberId {
        if self.track_side_effects && self.arena[fiber].alternate.is_none() {
            self.arena[fiber].flags |= Flags::PLACEMENT;
        }
        fiber
    }

    fn create_fiber(&mut self, return_fiber: FiberId, node: FiberNode) -> FiberId {
        let fiber = self.arena.alloc(node);
        self.arena[fiber].parent = Some(return_fiber);
        fiber
    }

    fn create_from_element(&mut self, return_fiber: FiberId, element: &Element) -> FiberId {
        let (tag, props) = element_type(element);
        let mut node = FiberNode::new(tag, props, element.key.clone());
        node.node_ref = element.node_ref.clone();
        self.create_fiber(return_fiber, node)
    }

    fn create_text(&mut self, return_fiber: FiberId, text: &Rc<str>) -> FiberId {
        let node = FiberNode::new(WorkTag::HostText, Props::Text(text.clone()), None);
        self.create_fiber(return_fiber, node)
    }

    fn create_fragment(&mut self, return_fiber: FiberId, children: &Rc<[Child]>) -> FiberId {
        let node = FiberNode::new(WorkTag::Fragment, Props::Fragment(children.clone()), None);
        self.create_fiber(return_fiber, node)
    }

    fn create_child(&mut self, return_fiber: FiberId, child: &Child) -> Option<FiberId> {
        match child {
            Child::Text(text) if !text.is_empty() => Some(self.create_text(return_fiber, text)),
            Child::Element(element) => Some(self.create_from_element(return_fiber, element)),
            Child::List(children) => Some(self.create_fragment(return_fiber, children)),
            Child::Text(_) | Child::Empty => None,
        }
    }

    fn update_text(&mut self, return_fiber: FiberId, current: Option<FiberId>, text: &Rc<str>) -> FiberId {
        match current {
            Some(current) if matches!(self.arena[current].tag, WorkTag::HostText) => {
                let existing = self.use_fiber(current, Props::Text(text.clone()));
                self.arena[existing].parent = Some(return_fiber);
                existing
            }
            _ => self.create_text(return_fiber, text),
        }
    }

    fn update_element(
        &mut self,
        return_fiber: FiberId,
        current: Option<FiberId>,
        element: &Element,
    ) -> FiberId {
        let (tag, props) = element_type(element);
        match current {
            Some(current) if self.arena[current].tag.same_type(&tag) => {
                let existing = self.use_fiber(current, props);
                let node = &mut self.arena[existing];
                node.node_ref = element.node_ref.clone();
                node.parent = Some(return_fiber);
                existing
            }
            _ => self.create_from_element(return_fiber, element),
        }
    }

    fn update_fragment(
        &mut self,
        return_fiber: FiberId,
        current: Option<FiberId>,
        children: &Rc<[Child]>,
    ) -> FiberId {
        match current {
            Some(current) if matches!(self.arena[current].tag, WorkTag::Fragment) => {
                let existing = self.use_fiber(current, Props::Fragment(children.clone()));
                self.arena[existing].parent = Some(return_fiber);
                existing
            }
            _ => self.create_fragment(return_fiber, children),
        }
    }

    /// Updates `old` in place when the new child occupies the same slot;
    /// `None` means the slot's key no longer lines up.
    fn update_slot(&mut self, return_fiber: FiberId, old: Option<FiberId>, child: &Child) -> Option<FiberId> {
        let key = old.and_then(|old| self.arena[old].key.clone());
        match child {
            Child::Text(text) if !text.is_empty() => {
                if key.is_some() {
                    return None;
                }
                Some(self.update_text(return_fiber, old, text))
            }
            Child::Element(element) => {
                if element.key != key {
                    return None;
                }
                Some(self.update_element(return_fiber, old, element))
            }
            Child::List(children) => {
                if key.is_some() {
                    return None;
                }
                Some(self.update_fragment(return_fiber, old, children))
            }
            Child::Text(_) | Child::Empty => None,
        }
    }

    fn update_from_map(
        &mut self,
        existing: &HashMap<SlotKey, FiberId>,
        return_fiber: FiberId,
        new_index: usize,
        child: &Child,
    ) -> Option<FiberId> {
        match child {
            Child::Text(text) if !text.is_empty() => {
                let matched = existing.get(&SlotKey::Index(new_index)).copied();
                Some(self.update_text(return_fiber, matched, text))
            }
            Child::Element(element) => {
                let slot = match &element.key {
                    Some(key) => SlotKey::Key(key.clone()),
                    None => SlotKey::Index(new_index),
                };
                let matched = existing.get(&slot).copied();
                Some(self.update_element(return_fiber, matched, element))
            }
            Child::List(children) => {
                let matched = existing.get(&SlotKey::Index(new_index)).copied();
                Some(self.update_fragment(return_fiber, matched, children))
            }
            Child::Text(_) | Child::Empty => None,
        }
    }

    fn reconcile_single_element(
        &mut self,
        return_fiber: FiberId,
        current_first_child: Option<FiberId>,
        element: &Element,
    ) -> FiberId {
        let (tag, props) = element_type(element);
        let mut child = current_first_child;
        while let Some(id) = child {
            if self.arena[id].key == element.key {
                if self.arena[id].tag.same_type(&tag) {
                    let sibling = self.arena[id].sibling;
                    self.delete_remaining_children(return_fiber, sibling);
                    let existing = self.use_fiber(id, props);
                    let node = &mut self.arena[existing];
                    node.node_ref = element.node_ref.clone();
                    node.parent = Some(return_fiber);
                    return existing;
                }
                self.delete_remaining_children(return_fiber, Some(id));
                break;
            }
            self.delete_child(return_fiber, id);
            child = self.arena[id].sibling;
        }
        self.create_from_element(return_fiber, element)
    }

    fn reconcile_single_text(
        &mut self,
        return_fiber: FiberId,
        current_first_child: Option<FiberId>,
        text: &Rc<str>,
    ) -> FiberId {
        if let Some(first) = current_first_child {
            if matches!(self.arena[first].tag, WorkTag::HostText) {
                let sibling = self.arena[first].sibling;
                self.delete_remaining_children(return_fiber, sibling);
                let existing = self.use_fiber(first, Props::Text(text.clone()));
                self.arena[existing].parent = Some(return_fiber);
                return existing;
            }
        }
        self.delete_remaining_children(return_fiber, current_first_child);
        self.create_text(return_fiber, text)
    }

    fn reconcile_array(
        &mut self,
        return_fiber: FiberId,
        current_first_child: Option<FiberId>,
        children: &[Child],
    ) -> Option<FiberId> {
        let mut list = SiblingList::default();
        let mut old_fiber = current_first_child;
        let mut last_placed_index = 0;
        let mut new_index = 0;

        // Walk both lists in lockstep while slots line up.
        while let Some(old) = old_fiber {
            if new_index >= children.len() {
                break;
            }
            let (slot_old, next_old) = if self.arena[old].index > new_index {
                (None, Some(old))
            } else {
                (Some(old), self.arena[old].sibling)
            };
            let Some(new_fiber) = self.update_slot(return_fiber, slot_old, &children[new_index]) else {
                old_fiber = slot_old.or(next_old);
                break;
            };
            if self.track_side_effects {
                if let Some(slot_old) = slot_old {
                    if self.arena[new_fiber].alternate.is_none() {
                        self.delete_child(return_fiber, slot_old);
                    }
                }
            }
            last_placed_index = self.place_child(new_fiber, last_placed_index, new_index);
            list.push(self.arena, new_fiber);
            old_fiber = next_old;
            new_index += 1;
        }

        if new_index == children.len() {
            self.delete_remaining_children(return_fiber, old_fiber);
            return list.first;
        }

        let Some(old) = old_fiber else {
            for (index, child) in children.iter().enumerate().skip(new_index) {
                let Some(new_fiber) = self.create_child(return_fiber, child) else {
                    continue;
                };
                last_placed_index = self.place_child(new_fiber, last_placed_index, index);
                list.push(self.arena, new_fiber);
            }
            return list.first;
        };

        let mut existing = self.map_remaining_children(return_fiber, old);
        for (index, child) in children.iter().enumerate().skip(new_index) {
            let Some(new_fiber) = self.update_from_map(&existing, return_fiber, index, child) else {
                continue;
            };
            if self.track_side_effects {
                if let Some(current) = self.arena[new_fiber].alternate {
                    existing.remove(&self.slot_key(current));
                }
            }
            last_placed_index = self.place_child(new_fiber, last_placed_index, index);
            list.push(self.arena, new_fiber);
        }

        if self.track_side_effects {
            let mut leftovers: Vec<FiberId> = existing.into_values().collect();
            leftovers.sort_by_key(|id| self.arena[*id].index);
            for id in leftovers {
                self.delete_child(return_fiber, id);
            }
        }
        list.first
    }
}

#[derive(Default)]
struct SiblingList {
    first: Option<FiberId>,
    last: Option<FiberId>,
}

impl SiblingList {
    fn push(&mut self, arena: &mut FiberArena, fiber: FiberId) {
        match self.last {
            None => self.first = Some(fiber),
            Some(last) => arena[last].sibling = Some(fiber),
        }
        self.last = Some(fiber);
    }
}

/// Work tag and props a new or reused fiber gets for `element`.
pub(crate) fn element_type(element: &Element) -> (WorkTag, Props) {
    match &element.kind {
        ElementKind::Host { tag, props } => (WorkTag::HostComponent(tag.clone()), Props::Host(props.clone())),
        ElementKind::Component { component, props } => (
            WorkTag::FunctionComponent(component.clone()),
            Props::Component(props.clone()),
        ),
        ElementKind::Memo { memo, props } => (WorkTag::Memo(memo.clone()), Props::Component(props.clone())),
        ElementKind::Fragment { children } => (WorkTag::Fragment, Props::Fragment(children.clone())),
        ElementKind::Provider { context, props } => {
            (WorkTag::ContextProvider(*context), Props::Provider(props.clone()))
        }
        ElementKind::Suspense { props } => (WorkTag::Suspense, Props::Suspense(props.clone())),
    }
}

/// Points `wip` at work-in-progress clones of the committed children,
/// without re-running anything below it.
pub(crate) fn clone_child_fibers(arena: &mut FiberArena, wip: FiberId) {
    let Some(first) = arena[wip].child else {
        return;
    };
    let props = arena[first].pending_props.clone();
    let mut new_child = create_work_in_progress(arena, first, props);
    arena[wip].child = Some(new_child);
    arena[new_child].parent = Some(wip);
    while let Some(current) = arena[new_child].sibling {
        let props = arena[current].pending_props.clone();
        let next = create_work_in_progress(arena, current, props);
        arena[new_child].sibling = Some(next);
        arena[next].parent = Some(wip);
        new_child = next;
    }
}
