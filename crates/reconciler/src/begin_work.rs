//! Begin phase: decide per fiber between bailing out and rendering, then
//! reconcile the children it produced.

use crate::child_fiber::{ChildReconciler, clone_child_fibers};
use crate::context::propagate_context_change;
use crate::element::{AnyProps, Child, Component, MemoComponent};
use crate::error::Interrupt;
use crate::fiber::{
    FiberId, FiberNode, FiberQueue, MemoizedState, OffscreenMode, OffscreenProps, Props, RootState,
    WorkTag, create_work_in_progress,
};
use crate::flags::Flags;
use crate::hooks::{HooksEnv, bailout_hooks, render_with_hooks};
use crate::lanes::Lanes;
use crate::suspense::is_showing_fallback;
use crate::update_queue::{merge_pending, process_update_queue};
use crate::work_loop::RenderPhase;
use std::cell::RefCell;
use std::rc::Rc;

impl RenderPhase<'_> {
    /// Returns the next fiber to begin, or `None` when `wip` has no child
    /// work and should complete.
    pub(crate) fn begin_work(
        &mut self,
        current: Option<FiberId>,
        wip: FiberId,
    ) -> Result<Option<FiberId>, Interrupt> {
        let render_lane = self.state.render_lane;
        if let Some(current) = current {
            let props_changed = match &self.arena[current].memoized_props {
                Some(old) => !old.same(&self.arena[wip].pending_props),
                None => true,
            };
            if props_changed {
                self.state.did_receive_update = true;
            } else {
                let has_scheduled_work = self.arena[current].lanes.includes_some(render_lane);
                let did_capture = self.arena[wip].flags.contains(Flags::DID_CAPTURE);
                self.state.did_receive_update = false;
                if !has_scheduled_work && !did_capture {
                    return self.attempt_early_bailout(current, wip);
                }
            }
        } else {
            self.state.did_receive_update = false;
        }

        self.arena[wip].lanes = Lanes::NONE;
        log::trace!(target: "reconciler.begin", "begin {} {wip:?}", self.arena[wip].tag.name());

        let tag = self.arena[wip].tag.clone();
        match tag {
            WorkTag::HostRoot => self.update_host_root(current, wip),
            WorkTag::HostComponent(_) => self.update_host_component(current, wip),
            WorkTag::HostText => Ok(None),
            WorkTag::FunctionComponent(component) => {
                let props = self.component_props(wip)?;
                self.update_function_component(current, wip, &component, &props)
            }
            WorkTag::Memo(memo) => self.update_memo_component(current, wip, &memo),
            WorkTag::Fragment => {
                let children = match &self.arena[wip].pending_props {
                    Props::Fragment(children) => Child::List(children.clone()),
                    _ => Child::Empty,
                };
                self.reconcile_children(current, wip, &children);
                Ok(self.arena[wip].child)
            }
            WorkTag::ContextProvider(_) => self.update_context_provider(current, wip),
            WorkTag::Suspense => self.update_suspense_component(current, wip),
            WorkTag::Offscreen => self.update_offscreen_component(current, wip),
        }
    }

    pub(crate) fn reconcile_children(&mut self, current: Option<FiberId>, wip: FiberId, children: &Child) {
        let current_child = current.and_then(|current| self.arena[current].child);
        let child = ChildReconciler::new(self.arena, current.is_some()).reconcile(wip, current_child, children);
        self.arena[wip].child = child;
    }

    fn component_props(&self, wip: FiberId) -> Result<AnyProps, Interrupt> {
        match &self.arena[wip].pending_props {
            Props::Component(props) => Ok(props.clone()),
            _ => Err(Interrupt::failed("component fiber without component props")),
        }
    }

    /// Props and lanes say nothing changed here; re-enter the stacks this
    /// fiber would have pushed and skip it.
    fn attempt_early_bailout(&mut self, current: FiberId, wip: FiberId) -> Result<Option<FiberId>, Interrupt> {
        match self.arena[wip].tag.clone() {
            WorkTag::ContextProvider(context) => {
                if let Props::Provider(props) = &self.arena[wip].pending_props {
                    let value = props.value.clone();
                    self.state.contexts.push(context, value);
                }
            }
            WorkTag::Suspense => {
                if is_showing_fallback(self.arena, current) {
                    let primary_child_lanes = self.arena[current]
                        .child
                        .map_or(Lanes::NONE, |primary| self.arena[primary].child_lanes);
                    if primary_child_lanes.includes_some(self.state.render_lane) {
                        return self.update_suspense_component(Some(current), wip);
                    }
                    // Skip the hidden primary tree and continue with the
                    // fallback.
                    let child = self.bailout_on_already_finished_work(wip);
                    return Ok(child.and_then(|primary| self.arena[primary].sibling));
                }
                self.state.suspense_handlers.push(wip);
            }
            _ => {}
        }
        Ok(self.bailout_on_already_finished_work(wip))
    }

    /// Reuses the committed children of `wip`. Returns `None` when nothing
    /// below it has work at the render lane either.
    pub(crate) fn bailout_on_already_finished_work(&mut self, wip: FiberId) -> Option<FiberId> {
        self.counters.bailouts += 1;
        log::trace!(target: "reconciler.begin", "bailout {} {wip:?}", self.arena[wip].tag.name());
        if !self.arena[wip].child_lanes.includes_some(self.state.render_lane) {
            return None;
        }
        clone_child_fibers(self.arena, wip);
        self.arena[wip].child
    }

    fn update_host_root(&mut self, current: Option<FiberId>, wip: FiberId) -> Result<Option<FiberId>, Interrupt> {
        let Some(current) = current else {
            return Err(Interrupt::failed("host root without a committed fiber"));
        };
        let MemoizedState::Root(state) = self.arena[current].memoized_state.clone() else {
            return Err(Interrupt::failed("host root without root state"));
        };
        let FiberQueue::Root(queue) = self.arena[wip].update_queue.clone() else {
            return Err(Interrupt::failed("host root without an update queue"));
        };

        let merged = merge_pending(&state.base_queue, &queue);
        let processed = process_update_queue(&state.base_state, &merged, self.state.render_lane);
        let element = processed.memoized_state;
        let node = &mut self.arena[wip];
        node.lanes = processed.skipped_lanes;
        node.memoized_state = MemoizedState::Root(Rc::new(RootState {
            base_state: processed.base_state,
            base_queue: RefCell::new(processed.base_queue),
        }));

        self.reconcile_children(Some(current), wip, &element);
        Ok(self.arena[wip].child)
    }

    fn update_host_component(&mut self, current: Option<FiberId>, wip: FiberId) -> Result<Option<FiberId>, Interrupt> {
        let children = match &self.arena[wip].pending_props {
            Props::Host(props) => props.children.clone(),
            _ => Child::Empty,
        };
        self.mark_ref(current, wip);
        self.reconcile_children(current, wip, &children);
        Ok(self.arena[wip].child)
    }

    fn mark_ref(&mut self, current: Option<FiberId>, wip: FiberId) {
        let prev = current.and_then(|current| self.arena[current].node_ref.as_ref());
        let changed = match (prev, self.arena[wip].node_ref.as_ref()) {
            (None, None) => false,
            (Some(prev), Some(next)) => !prev.same(next),
            _ => true,
        };
        if changed {
            self.arena[wip].flags |= Flags::REF;
        }
    }

    fn update_function_component(
        &mut self,
        current: Option<FiberId>,
        wip: FiberId,
        component: &Component,
        props: &AnyProps,
    ) -> Result<Option<FiberId>, Interrupt> {
        let render_lane = self.state.render_lane;
        let context_changed = self.arena[wip]
            .dependencies
            .as_ref()
            .is_some_and(|deps| deps.lanes.includes_some(render_lane));
        if context_changed {
            self.state.did_receive_update = true;
        }

        let env = HooksEnv {
            root: self.root_id,
            render_lane,
            lanes: self.lanes,
            contexts: &self.state.contexts,
        };
        let (children, state_changed) = render_with_hooks(self.arena, &env, wip, component, props)?;

        if let Some(current) = current {
            if !self.state.did_receive_update && !state_changed {
                bailout_hooks(self.arena, wip, current, render_lane);
                return Ok(self.bailout_on_already_finished_work(wip));
            }
        }
        self.reconcile_children(current, wip, &children);
        Ok(self.arena[wip].child)
    }

    fn update_memo_component(
        &mut self,
        current: Option<FiberId>,
        wip: FiberId,
        memo: &MemoComponent,
    ) -> Result<Option<FiberId>, Interrupt> {
        let next = self.component_props(wip)?;
        if let Some(current) = current {
            let prev = match &self.arena[current].memoized_props {
                Some(Props::Component(prev)) => Some(prev.clone()),
                _ => None,
            };
            let same_ref = match (&self.arena[current].node_ref, &self.arena[wip].node_ref) {
                (None, None) => true,
                (Some(a), Some(b)) => a.same(b),
                _ => false,
            };
            if let Some(prev) = prev {
                if same_ref && memo.props_equal(&*prev, &*next) {
                    self.state.did_receive_update = false;
                    self.arena[wip].pending_props = Props::Component(prev.clone());
                    if !self.arena[current].lanes.includes_some(self.state.render_lane) {
                        self.arena[wip].lanes = self.arena[current].lanes;
                        return Ok(self.bailout_on_already_finished_work(wip));
                    }
                    return self.update_function_component(Some(current), wip, memo.component(), &prev);
                }
            }
        }
        self.update_function_component(current, wip, memo.component(), &next)
    }

    fn update_context_provider(&mut self, current: Option<FiberId>, wip: FiberId) -> Result<Option<FiberId>, Interrupt> {
        let WorkTag::ContextProvider(context) = self.arena[wip].tag else {
            return Ok(None);
        };
        let Props::Provider(props) = self.arena[wip].pending_props.clone() else {
            return Err(Interrupt::failed("provider fiber without provider props"));
        };
        self.state.contexts.push(context, props.value.clone());

        if let Some(current) = current {
            if let Some(Props::Provider(old)) = &self.arena[current].memoized_props {
                if !Rc::ptr_eq(&old.value, &props.value) {
                    log::trace!(target: "reconciler.begin", "context {context:?} changed, propagating");
                    propagate_context_change(self.arena, wip, context, self.state.render_lane);
                }
            }
        }
        self.reconcile_children(current, wip, &props.children);
        Ok(self.arena[wip].child)
    }

    fn update_suspense_component(&mut self, current: Option<FiberId>, wip: FiberId) -> Result<Option<FiberId>, Interrupt> {
        let Props::Suspense(props) = self.arena[wip].pending_props.clone() else {
            return Err(Interrupt::failed("suspense fiber without suspense props"));
        };
        let show_fallback = self.arena[wip].flags.contains(Flags::DID_CAPTURE);
        if show_fallback {
            self.arena[wip].flags.remove(Flags::DID_CAPTURE);
        }

        let primary_props = Props::Offscreen(Rc::new(OffscreenProps {
            mode: if show_fallback {
                OffscreenMode::Hidden
            } else {
                OffscreenMode::Visible
            },
            children: props.children.clone(),
        }));
        let fallback_props = Props::Fragment(Rc::from(vec![props.fallback.clone()]));

        let current_primary = current.and_then(|current| self.arena[current].child);
        let Some(current_primary) = current_primary else {
            // Mount.
            let primary = self.arena.alloc(FiberNode::new(WorkTag::Offscreen, primary_props.clone(), None));
            self.arena[primary].parent = Some(wip);
            self.arena[wip].child = Some(primary);
            if !show_fallback {
                self.state.suspense_handlers.push(wip);
                return Ok(Some(primary));
            }
            self.arena[primary].memoized_props = Some(primary_props);
            let fallback = self.arena.alloc(FiberNode::new(WorkTag::Fragment, fallback_props, None));
            let node = &mut self.arena[fallback];
            node.parent = Some(wip);
            node.index = 1;
            self.arena[primary].sibling = Some(fallback);
            if current.is_some() {
                self.arena[fallback].flags |= Flags::PLACEMENT;
            }
            return Ok(Some(fallback));
        };

        let current_fallback = self.arena[current_primary].sibling;
        let primary = create_work_in_progress(self.arena, current_primary, primary_props.clone());
        let node = &mut self.arena[primary];
        node.parent = Some(wip);
        node.sibling = None;
        node.index = 0;
        self.arena[wip].child = Some(primary);

        if !show_fallback {
            self.state.suspense_handlers.push(wip);
            if let Some(fallback) = current_fallback {
                let node = &mut self.arena[wip];
                node.deletions.push(fallback);
                node.flags |= Flags::CHILD_DELETION;
            }
            return Ok(Some(primary));
        }

        // The hidden primary tree keeps its committed children and is not
        // begun; only the fallback renders. Work at the render lane inside
        // it waits for the retry ping instead of rescheduling the root.
        let render_lane = self.state.render_lane;
        let node = &mut self.arena[primary];
        node.memoized_props = Some(primary_props);
        node.lanes = node.lanes.remove(render_lane);
        node.child_lanes = node.child_lanes.remove(render_lane);
        let fallback = match current_fallback {
            Some(existing) => create_work_in_progress(self.arena, existing, fallback_props),
            None => {
                let fallback = self.arena.alloc(FiberNode::new(WorkTag::Fragment, fallback_props, None));
                self.arena[fallback].flags |= Flags::PLACEMENT;
                fallback
            }
        };
        let node = &mut self.arena[fallback];
        node.parent = Some(wip);
        node.sibling = None;
        node.index = 1;
        self.arena[primary].sibling = Some(fallback);
        Ok(Some(fallback))
    }

    fn update_offscreen_component(&mut self, current: Option<FiberId>, wip: FiberId) -> Result<Option<FiberId>, Interrupt> {
        let Props::Offscreen(props) = self.arena[wip].pending_props.clone() else {
            return Ok(None);
        };
        if props.mode == OffscreenMode::Hidden {
            return Ok(None);
        }
        self.reconcile_children(current, wip, &props.children);
        Ok(self.arena[wip].child)
    }
}
