//! Commit engine.
//!
//! Both passes walk the finished tree depth first, descending only into
//! subtrees whose `subtree_flags` intersect the pass mask. Children are
//! committed before their parent, so a parent's visibility toggle also
//! covers children inserted in the same commit.
//!
//! Per fiber the mutation pass runs, in order: placement, content update,
//! child deletions, stale ref detachment and visibility. Flags are cleared
//! as fibers are visited; `REF` survives until the layout pass attaches the
//! new ref.

use crate::counters::Counters;
use crate::fiber::{FiberArena, FiberId, Props, WorkTag};
use crate::flags::Flags;
use crate::host::HostBackend;
use crate::scheduler::PendingPassiveEffects;
use core_types::HostHandle;

pub(crate) struct CommitPhase<'a> {
    pub(crate) arena: &'a mut FiberArena,
    pub(crate) host: &'a mut dyn HostBackend,
    pub(crate) container: HostHandle,
    pub(crate) passive: &'a mut PendingPassiveEffects,
    pub(crate) counters: &'a mut Counters,
}

impl CommitPhase<'_> {
    pub(crate) fn commit_mutation_effects(&mut self, finished: FiberId) {
        self.mutation_effects_on_fiber(finished);
    }

    pub(crate) fn commit_layout_effects(&mut self, finished: FiberId) {
        self.layout_effects_on_fiber(finished);
    }

    fn mutation_effects_on_fiber(&mut self, fiber: FiberId) {
        let mask = Flags::MUTATION_MASK | Flags::PASSIVE_MASK;
        if self.arena[fiber].subtree_flags.intersects(mask) {
            let mut child = self.arena[fiber].child;
            while let Some(id) = child {
                self.mutation_effects_on_fiber(id);
                child = self.arena[id].sibling;
            }
        }

        let flags = self.arena[fiber].flags;
        if flags.contains(Flags::PLACEMENT) {
            self.commit_placement(fiber);
        }
        if flags.contains(Flags::UPDATE) {
            self.commit_update(fiber);
        }
        if flags.contains(Flags::CHILD_DELETION) {
            let deletions = std::mem::take(&mut self.arena[fiber].deletions);
            for deleted in deletions {
                self.commit_deletion(fiber, deleted);
            }
        }
        if flags.contains(Flags::REF) {
            let stale = self.arena[fiber]
                .alternate
                .and_then(|current| self.arena.get(current))
                .and_then(|current| current.node_ref.clone());
            if let Some(stale) = stale {
                stale.set(None);
            }
        }
        if flags.contains(Flags::VISIBILITY) {
            let hidden = self.arena[fiber].offscreen_hidden();
            self.hide_or_unhide_all_children(fiber, hidden);
        }
        if flags.contains(Flags::PASSIVE_EFFECT) {
            if let Some(effects) = self.arena[fiber].effects() {
                self.passive.update.push(effects.clone());
            }
        }

        let node = &mut self.arena[fiber];
        node.flags &= Flags::LAYOUT_MASK;
        node.subtree_flags &= Flags::LAYOUT_MASK;
        node.deletions.clear();
    }

    fn layout_effects_on_fiber(&mut self, fiber: FiberId) {
        if self.arena[fiber].subtree_flags.intersects(Flags::LAYOUT_MASK) {
            let mut child = self.arena[fiber].child;
            while let Some(id) = child {
                self.layout_effects_on_fiber(id);
                child = self.arena[id].sibling;
            }
        }
        let node = &mut self.arena[fiber];
        if node.flags.contains(Flags::REF) && node.tag.is_host() {
            if let Some(node_ref) = &node.node_ref {
                node_ref.set(node.state_node.host());
            }
        }
        node.flags = Flags::empty();
        node.subtree_flags = Flags::empty();
    }

    fn host_parent(&self, fiber: FiberId) -> HostHandle {
        self.nearest_host_parent(self.arena[fiber].parent)
    }

    /// Host node of `start` or its closest host ancestor.
    fn nearest_host_parent(&self, start: Option<FiberId>) -> HostHandle {
        let mut parent = start;
        while let Some(id) = parent {
            let node = &self.arena[id];
            match node.tag {
                WorkTag::HostComponent(_) => {
                    if let Some(handle) = node.state_node.host() {
                        return handle;
                    }
                }
                WorkTag::HostRoot => return self.container,
                _ => {}
            }
            parent = node.parent;
        }
        log::warn!(target: "reconciler.commit", "no host parent above {start:?}, using container");
        self.container
    }

    fn is_host_parent(&self, fiber: FiberId) -> bool {
        matches!(self.arena[fiber].tag, WorkTag::HostComponent(_) | WorkTag::HostRoot)
    }

    /// First host node after `fiber` in document order that is already in
    /// place, i.e. the anchor to insert before.
    fn host_sibling(&mut self, fiber: FiberId) -> Option<HostHandle> {
        let mut node = fiber;
        'siblings: loop {
            while self.arena[node].sibling.is_none() {
                let parent = self.arena[node].parent?;
                if self.is_host_parent(parent) {
                    return None;
                }
                node = parent;
            }
            let sibling = self.arena[node].sibling?;
            self.arena[sibling].parent = self.arena[node].parent;
            node = sibling;

            while !self.arena[node].tag.is_host() {
                if self.arena[node].flags.contains(Flags::PLACEMENT) {
                    continue 'siblings;
                }
                let Some(child) = self.arena[node].child else {
                    continue 'siblings;
                };
                self.arena[child].parent = Some(node);
                node = child;
            }
            if !self.arena[node].flags.contains(Flags::PLACEMENT) {
                return self.arena[node].state_node.host();
            }
        }
    }

    fn commit_placement(&mut self, fiber: FiberId) {
        let parent = self.host_parent(fiber);
        let before = self.host_sibling(fiber);
        self.insert_or_append(fiber, before, parent);
    }

    fn insert_or_append(&mut self, fiber: FiberId, before: Option<HostHandle>, parent: HostHandle) {
        if self.arena[fiber].tag.is_host() {
            let Some(handle) = self.arena[fiber].state_node.host() else {
                return;
            };
            self.counters.host_mutations += 1;
            match before {
                Some(before) => {
                    log::trace!(target: "reconciler.commit", "insert {handle:?} into {parent:?} before {before:?}");
                    self.host.insert_before(parent, handle, before);
                }
                None => {
                    log::trace!(target: "reconciler.commit", "append {handle:?} to {parent:?}");
                    self.host.append_child(parent, handle);
                }
            }
            return;
        }
        let mut child = self.arena[fiber].child;
        while let Some(id) = child {
            self.insert_or_append(id, before, parent);
            child = self.arena[id].sibling;
        }
    }

    fn commit_update(&mut self, fiber: FiberId) {
        let node = &self.arena[fiber];
        let Some(handle) = node.state_node.host() else {
            return;
        };
        self.counters.host_mutations += 1;
        match &node.memoized_props {
            Some(Props::Text(text)) => {
                log::trace!(target: "reconciler.commit", "text {handle:?} = {text:?}");
                self.host.update_text_content(handle, text);
            }
            Some(Props::Host(props)) => {
                log::trace!(target: "reconciler.commit", "props {handle:?}");
                self.host.update_primitive_props(handle, &props.attributes);
            }
            _ => {}
        }
    }

    /// Unmounts the subtree rooted at `deleted`: removes its top-level host
    /// nodes, detaches refs and queues passive teardowns.
    fn commit_deletion(&mut self, parent_fiber: FiberId, deleted: FiberId) {
        if !self.arena.contains(deleted) {
            return;
        }
        let host_parent = self.nearest_host_parent(Some(parent_fiber));

        let mut top_level = Vec::new();
        let mut stack = vec![(deleted, false)];
        while let Some((id, inside_host)) = stack.pop() {
            let node = &self.arena[id];
            let is_host = node.tag.is_host();
            if is_host {
                if !inside_host {
                    top_level.extend(node.state_node.host());
                }
                if let Some(node_ref) = &node.node_ref {
                    node_ref.set(None);
                }
            }
            if matches!(node.tag, WorkTag::FunctionComponent(_) | WorkTag::Memo(_)) {
                if let Some(effects) = node.effects() {
                    self.passive.unmount.push(effects.clone());
                }
            }
            let mut children = Vec::new();
            let mut child = node.child;
            while let Some(c) = child {
                children.push(c);
                child = self.arena[c].sibling;
            }
            stack.extend(children.into_iter().rev().map(|c| (c, inside_host || is_host)));
        }

        for handle in top_level {
            log::trace!(target: "reconciler.commit", "remove {handle:?} from {host_parent:?}");
            self.counters.host_mutations += 1;
            self.host.remove_child(host_parent, handle);
        }

        let alternate = self.arena[deleted].alternate;
        for id in std::iter::once(deleted).chain(alternate) {
            if let Some(node) = self.arena.get_mut(id) {
                node.parent = None;
            }
        }
    }

    fn hide_or_unhide_all_children(&mut self, offscreen: FiberId, hidden: bool) {
        let mut stack: Vec<FiberId> = Vec::new();
        stack.extend(self.arena[offscreen].child);
        let mut ordered = Vec::new();
        while let Some(id) = stack.pop() {
            let node = &self.arena[id];
            stack.extend(node.sibling);
            if node.tag.is_host() {
                ordered.extend(node.state_node.host());
                continue;
            }
            if matches!(node.tag, WorkTag::Offscreen) && node.offscreen_hidden() {
                continue;
            }
            stack.extend(node.child);
        }
        for handle in ordered {
            self.counters.host_mutations += 1;
            self.host.set_visibility(handle, hidden);
        }
    }
}
