mod common;

use common::{Slot, counter, flush, get, keyed_list, slot};
use host_test_support::{
    HostOp, ManualScheduler, YieldPolicy, assert_lines_eq, new_reconciler, run_microtasks,
    run_next_task,
};
use pretty_assertions::assert_eq;
use reconciler::{
    Child, Component, Dispatch, Element, Lanes, PriorityClass, ReconcilerConfig, Resource,
    TaskStatus,
};

#[test]
fn two_increments_at_default_priority_commit_once() {
    let setter = slot();
    let counter = counter(setter.clone());
    let (mut r, root, container) = new_reconciler(ManualScheduler::default(), ReconcilerConfig::default());

    r.render(root, Element::component(&counter, ())).unwrap();
    flush(&mut r);
    assert_eq!(r.host().render_text(container), "0");
    assert_eq!(
        r.host_mut().take_ops(),
        vec![
            HostOp::CreateContainer { handle: 1 },
            HostOp::CreateText {
                handle: 2,
                content: "0".to_string()
            },
            HostOp::AppendChild { parent: 1, child: 2 },
        ]
    );

    let set = get(&setter);
    set.update(|n| n + 1);
    set.update(|n| n + 1);
    flush(&mut r);

    assert_eq!(r.host().render_text(container), "2");
    assert_eq!(
        r.host_mut().take_ops(),
        vec![HostOp::UpdateText {
            handle: 2,
            content: "2".to_string()
        }]
    );
    assert_eq!(r.counters().commits, 2);
}

#[test]
fn keyed_rotation_moves_without_recreating() {
    let (mut r, root, container) = new_reconciler(ManualScheduler::default(), ReconcilerConfig::default());
    r.render(root, keyed_list(&["a", "b", "c"])).unwrap();
    flush(&mut r);
    r.host_mut().take_ops();

    r.render(root, keyed_list(&["c", "a", "b"])).unwrap();
    flush(&mut r);

    // Handles: "a" text 2, li 3; "b" 4, 5; "c" 6, 7; ul 8. Only the
    // displaced items are re-attached.
    assert_eq!(
        r.host_mut().take_ops(),
        vec![
            HostOp::AppendChild { parent: 8, child: 3 },
            HostOp::AppendChild { parent: 8, child: 5 },
        ]
    );
    assert_lines_eq(
        &["<ul>", "  <li>", "    \"c\"", "  <li>", "    \"a\"", "  <li>", "    \"b\""],
        &r.host().snapshot(container),
    );
    assert!(r.host().errors().is_empty());
}

#[test]
fn sync_update_preempts_default_render_from_committed_base() {
    let setter = slot();
    let counter = counter(setter.clone());
    let (mut r, root, container) = new_reconciler(ManualScheduler::default(), ReconcilerConfig::default());
    r.render(root, Element::component(&counter, ())).unwrap();
    flush(&mut r);

    let set = get(&setter);
    r.scheduler_mut().set_yield_policy(YieldPolicy::EveryUnits(1));
    set.update(|n| n + 10);
    // One unit per slice: the root, then the counter with its new state.
    assert_eq!(run_next_task(&mut r).unwrap(), Some(TaskStatus::Continue));
    assert_eq!(run_next_task(&mut r).unwrap(), Some(TaskStatus::Continue));
    assert_eq!(r.host().render_text(container), "0");
    let in_flight = r.scheduler().pending_tasks()[0].handle;

    r.run_with_priority(PriorityClass::Immediate, || set.update(|n| n + 1));
    assert!(r.scheduler().cancelled().contains(&in_flight));
    assert!(r.scheduler().has_immediates());

    run_microtasks(&mut r).unwrap();
    assert_eq!(r.host().render_text(container), "1");

    flush(&mut r);
    assert_eq!(r.host().render_text(container), "11");
    assert_eq!(r.counters().commits, 3);
    assert!(r.root_lanes(root).unwrap().pending.is_empty());
}

#[test]
fn suspended_child_shows_fallback_until_resolved() {
    let resource: Resource<String> = Resource::pending();
    let profile = {
        let resource = resource.clone();
        Component::new("Profile", move |cx, _: &()| {
            let name = cx.use_resource(&resource)?;
            Ok(Child::text(name))
        })
    };
    let (mut r, root, container) = new_reconciler(ManualScheduler::default(), ReconcilerConfig::default());

    r.render(
        root,
        Element::suspense(Element::component(&profile, ()), Child::text("loading")),
    )
    .unwrap();
    flush(&mut r);
    assert_lines_eq(&["\"loading\""], &r.host().snapshot(container));
    assert_eq!(r.counters().suspensions, 1);

    resource.resolve("Ada".to_string());
    flush(&mut r);
    assert_lines_eq(&["\"Ada\""], &r.host().snapshot(container));
    assert!(r.host().errors().is_empty());
}

/// Shows "ok" until its flag is set, then reads `resource`.
fn gate(setter: Slot<Dispatch<bool>>, resource: Resource<String>) -> Component {
    Component::new("Gate", move |cx, _: &()| {
        let (wait, set) = cx.use_state(|| false)?;
        *setter.borrow_mut() = Some(set);
        if wait {
            let value = cx.use_resource(&resource)?;
            return Ok(Child::text(value));
        }
        Ok(Child::text("ok"))
    })
}

#[test]
fn suspending_without_a_boundary_commits_nothing_until_pinged() {
    let resource: Resource<String> = Resource::pending();
    let profile = {
        let resource = resource.clone();
        Component::new("Profile", move |cx, _: &()| {
            let name = cx.use_resource(&resource)?;
            Ok(Child::text(name))
        })
    };
    let (mut r, root, container) = new_reconciler(ManualScheduler::default(), ReconcilerConfig::default());

    r.render(root, Element::component(&profile, ())).unwrap();
    flush(&mut r);
    assert!(r.host().children(container).is_empty());
    assert_eq!(r.counters().commits, 0);
    assert_eq!(r.root_lanes(root).unwrap().pending, Lanes::SYNC);

    resource.resolve("Ada".to_string());
    flush(&mut r);
    assert_lines_eq(&["\"Ada\""], &r.host().snapshot(container));
    assert_eq!(r.counters().commits, 1);
    assert!(r.root_lanes(root).unwrap().pending.is_empty());
    assert!(r.host().errors().is_empty());
}

#[test]
fn visible_boundary_hides_content_and_restores_it_with_state() {
    let resource: Resource<String> = Resource::pending();
    let counter_setter = slot();
    let gate_setter = slot();
    let counter = counter(counter_setter.clone());
    let gate = gate(gate_setter.clone(), resource.clone());
    let (mut r, root, container) = new_reconciler(ManualScheduler::default(), ReconcilerConfig::default());
    r.render(
        root,
        Element::suspense(
            Child::list([Element::component(&counter, ()), Element::component(&gate, ())]),
            Child::text("loading"),
        ),
    )
    .unwrap();
    flush(&mut r);
    let count = get(&counter_setter);
    count.set(5);
    flush(&mut r);
    assert_lines_eq(&["\"5\"", "\"ok\""], &r.host().snapshot(container));
    r.host_mut().take_ops();

    // Handles: container 1, counter text 2, gate text 3; the fallback is 4.
    get(&gate_setter).set(true);
    flush(&mut r);
    let ops = r.host_mut().take_ops();
    assert!(ops.contains(&HostOp::SetVisibility { handle: 2, hidden: true }));
    assert!(ops.contains(&HostOp::SetVisibility { handle: 3, hidden: true }));
    assert_lines_eq(
        &["\"5\" [hidden]", "\"ok\" [hidden]", "\"loading\""],
        &r.host().snapshot(container),
    );

    resource.resolve("Ada".to_string());
    flush(&mut r);
    let ops = r.host_mut().take_ops();
    assert!(ops.contains(&HostOp::SetVisibility { handle: 2, hidden: false }));
    assert!(ops.contains(&HostOp::SetVisibility { handle: 3, hidden: false }));
    assert!(ops.contains(&HostOp::RemoveChild { parent: 1, child: 4 }));
    assert!(ops.contains(&HostOp::UpdateText {
        handle: 3,
        content: "Ada".to_string()
    }));
    assert_lines_eq(&["\"5\"", "\"Ada\""], &r.host().snapshot(container));

    count.update(|n| n + 1);
    flush(&mut r);
    assert_lines_eq(&["\"6\"", "\"Ada\""], &r.host().snapshot(container));
    assert!(r.host().errors().is_empty());
}

#[test]
fn update_under_a_fallback_survives_until_the_retry() {
    let resource: Resource<String> = Resource::pending();
    let counter_setter = slot();
    let gate_setter = slot();
    let counter = counter(counter_setter.clone());
    let gate = gate(gate_setter.clone(), resource.clone());
    let (mut r, root, container) = new_reconciler(ManualScheduler::default(), ReconcilerConfig::default());
    r.render(
        root,
        Element::suspense(
            Child::list([Element::component(&counter, ()), Element::component(&gate, ())]),
            Child::text("loading"),
        ),
    )
    .unwrap();
    flush(&mut r);
    assert_lines_eq(&["\"0\"", "\"ok\""], &r.host().snapshot(container));

    let wait = get(&gate_setter);
    r.run_with_priority(PriorityClass::Immediate, || wait.set(true));
    flush(&mut r);
    assert_lines_eq(
        &["\"0\" [hidden]", "\"ok\" [hidden]", "\"loading\""],
        &r.host().snapshot(container),
    );
    assert!(r.root_lanes(root).unwrap().pending.is_empty());

    // The default render bails out of the gate, whose synchronous update
    // is still pending; that update then suspends again on its own render.
    get(&counter_setter).update(|n| n + 1);
    flush(&mut r);
    assert_lines_eq(
        &["\"1\" [hidden]", "\"ok\" [hidden]", "\"loading\""],
        &r.host().snapshot(container),
    );
    assert!(r.root_lanes(root).unwrap().pending.is_empty());

    resource.resolve("ready".to_string());
    flush(&mut r);
    assert_lines_eq(&["\"1\"", "\"ready\""], &r.host().snapshot(container));
    assert!(r.root_lanes(root).unwrap().pending.is_empty());
    assert!(r.host().errors().is_empty());
}
