//! Complete phase: materialize host nodes and bubble flags and lanes.

use crate::fiber::{FiberId, OffscreenMode, Props, StateNode, WorkTag};
use crate::flags::Flags;
use crate::lanes::Lanes;
use crate::suspense::is_showing_fallback;
use crate::work_loop::RenderPhase;
use core_types::HostHandle;

impl RenderPhase<'_> {
    pub(crate) fn complete_work(&mut self, current: Option<FiberId>, wip: FiberId) {
        log::trace!(target: "reconciler.complete", "complete {} {wip:?}", self.arena[wip].tag.name());
        match self.arena[wip].tag.clone() {
            WorkTag::HostComponent(kind) => {
                let existing = current.filter(|_| self.arena[wip].state_node.host().is_some());
                match existing {
                    Some(current) => self.complete_host_component(current, wip),
                    None => {
                        let attributes = match &self.arena[wip].pending_props {
                            Props::Host(props) => props.attributes.clone(),
                            _ => Vec::new(),
                        };
                        let handle = self.host.create_primitive(&kind, &attributes);
                        self.append_all_children(handle, wip);
                        self.arena[wip].state_node = StateNode::Host(handle);
                    }
                }
            }
            WorkTag::HostText => {
                let text = match &self.arena[wip].pending_props {
                    Props::Text(text) => text.clone(),
                    _ => "".into(),
                };
                let existing = current.filter(|_| self.arena[wip].state_node.host().is_some());
                match existing {
                    Some(current) => {
                        let changed = match &self.arena[current].memoized_props {
                            Some(Props::Text(old)) => *old != text,
                            _ => true,
                        };
                        if changed {
                            self.arena[wip].flags |= Flags::UPDATE;
                        }
                    }
                    None => {
                        let handle = self.host.create_text_primitive(&text);
                        self.arena[wip].state_node = StateNode::Host(handle);
                    }
                }
            }
            WorkTag::ContextProvider(context) => self.state.contexts.pop(context),
            WorkTag::Suspense => {
                if self.state.suspense_handlers.last() == Some(&wip) {
                    self.state.suspense_handlers.pop();
                }
                self.mark_suspense_visibility(current, wip);
            }
            WorkTag::Offscreen => {
                if let Some(current) = current {
                    let was_hidden = self.arena[current]
                        .memoized_props
                        .as_ref()
                        .and_then(Props::offscreen_mode)
                        == Some(OffscreenMode::Hidden);
                    let is_hidden = self.arena[wip].offscreen_hidden();
                    if was_hidden != is_hidden && self.arena[current].child.is_some() {
                        self.arena[wip].flags |= Flags::VISIBILITY;
                    }
                }
            }
            WorkTag::HostRoot
            | WorkTag::FunctionComponent(_)
            | WorkTag::Memo(_)
            | WorkTag::Fragment => {}
        }
        self.bubble_properties(current, wip);
    }

    fn complete_host_component(&mut self, current: FiberId, wip: FiberId) {
        let changed = match (&self.arena[current].memoized_props, &self.arena[wip].pending_props) {
            (Some(Props::Host(old)), Props::Host(new)) => old.attributes != new.attributes,
            _ => false,
        };
        if changed {
            self.arena[wip].flags |= Flags::UPDATE;
        }
    }

    /// Hides the primary tree when the boundary switches to its fallback.
    /// Revealing is flagged by the offscreen fiber itself, which is begun
    /// again on the way back.
    fn mark_suspense_visibility(&mut self, current: Option<FiberId>, wip: FiberId) {
        let Some(primary) = self.arena[wip].child else {
            return;
        };
        if current.is_some_and(|current| self.arena[current].child == Some(primary)) {
            return;
        }
        let next_hidden = self.arena[primary].offscreen_hidden();
        let prev_hidden = match current {
            Some(current) => is_showing_fallback(self.arena, current),
            None => false,
        };
        let has_committed_children = self.arena[primary].child.is_some();
        if next_hidden && !prev_hidden && has_committed_children {
            self.arena[primary].flags |= Flags::VISIBILITY;
        }
    }

    /// Attaches the top-level host nodes below `wip` to a freshly created
    /// parent primitive.
    fn append_all_children(&mut self, parent: HostHandle, wip: FiberId) {
        let mut node = self.arena[wip].child;
        while let Some(id) = node {
            if self.arena[id].tag.is_host() {
                if let Some(handle) = self.arena[id].state_node.host() {
                    self.host.append_child(parent, handle);
                }
            } else if let Some(child) = self.arena[id].child {
                self.arena[child].parent = Some(id);
                node = Some(child);
                continue;
            }
            let mut cursor = id;
            loop {
                if cursor == wip {
                    return;
                }
                if let Some(sibling) = self.arena[cursor].sibling {
                    self.arena[sibling].parent = self.arena[cursor].parent;
                    node = Some(sibling);
                    break;
                }
                match self.arena[cursor].parent {
                    Some(parent) if parent != wip => cursor = parent,
                    _ => return,
                }
            }
        }
    }

    fn bubble_properties(&mut self, current: Option<FiberId>, wip: FiberId) {
        let first = self.arena[wip].child;
        let did_bailout = current.is_some_and(|current| self.arena[current].child == first);

        let mut child_lanes = Lanes::NONE;
        let mut subtree_flags = Flags::empty();
        let mut child = first;
        while let Some(id) = child {
            let node = &mut self.arena[id];
            child_lanes |= node.lanes | node.child_lanes;
            if !did_bailout {
                subtree_flags |= node.subtree_flags | node.flags;
            }
            node.parent = Some(wip);
            child = node.sibling;
        }

        let node = &mut self.arena[wip];
        node.subtree_flags |= subtree_flags;
        node.child_lanes = child_lanes;
    }
}
