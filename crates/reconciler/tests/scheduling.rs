mod common;

use common::{counter, flush, get, item_texts, slot};
use host_test_support::{
    ManualScheduler, YieldPolicy, new_reconciler, run_microtasks, run_next_task,
};
use pretty_assertions::assert_eq;
use reconciler::{
    Child, Component, Element, Lanes, PriorityClass, ReconcilerConfig, Task, TaskStatus, deps,
};

#[test]
fn updates_in_one_turn_share_one_render() {
    let setter = slot();
    let counter = counter(setter.clone());
    let (mut r, root, container) = new_reconciler(ManualScheduler::default(), ReconcilerConfig::default());
    r.render(root, Element::component(&counter, ())).unwrap();
    flush(&mut r);
    let renders = r.counters().renders_started;

    let set = get(&setter);
    for _ in 0..3 {
        set.update(|n| n + 1);
    }
    run_microtasks(&mut r).unwrap();
    let pending = r.scheduler().pending_tasks();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].priority, PriorityClass::Normal);
    assert_eq!(pending[0].task, Task::PerformConcurrent(root));

    flush(&mut r);
    assert_eq!(r.host().render_text(container), "3");
    assert_eq!(r.counters().renders_started, renders + 1);
}

#[test]
fn immediate_updates_flush_in_a_microtask() {
    let setter = slot();
    let counter = counter(setter.clone());
    let (mut r, root, container) = new_reconciler(ManualScheduler::default(), ReconcilerConfig::default());
    r.render(root, Element::component(&counter, ())).unwrap();
    flush(&mut r);

    let set = get(&setter);
    r.run_with_priority(PriorityClass::Immediate, || set.set(5));
    assert!(r.scheduler().has_immediates());
    assert!(r.scheduler().pending_tasks().is_empty());
    run_microtasks(&mut r).unwrap();
    assert_eq!(r.host().render_text(container), "5");
}

#[test]
fn more_urgent_update_replaces_the_scheduled_callback() {
    let setter = slot();
    let counter = counter(setter.clone());
    let (mut r, root, container) = new_reconciler(ManualScheduler::default(), ReconcilerConfig::default());
    r.render(root, Element::component(&counter, ())).unwrap();
    flush(&mut r);

    let set = get(&setter);
    set.set(1);
    run_microtasks(&mut r).unwrap();
    let normal = r.scheduler().pending_tasks()[0].handle;

    r.run_with_priority(PriorityClass::UserBlocking, || set.set(2));
    assert_eq!(r.scheduler().cancelled(), &[normal]);
    let pending = r.scheduler().pending_tasks();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].priority, PriorityClass::UserBlocking);

    // The urgent lane commits alone; the skipped default update replays on
    // top of the committed base afterwards and lands on the same value.
    assert_eq!(run_next_task(&mut r).unwrap(), Some(TaskStatus::Complete));
    assert_eq!(r.host().render_text(container), "2");
    assert_eq!(r.root_lanes(root).unwrap().pending, Lanes::DEFAULT);

    flush(&mut r);
    assert_eq!(r.host().render_text(container), "2");
    assert!(r.root_lanes(root).unwrap().pending.is_empty());
}

#[test]
fn transition_shows_pending_flag_before_the_new_value() {
    let setter = slot();
    let starter = slot();
    let component = {
        let setter = setter.clone();
        let starter = starter.clone();
        Component::new("Search", move |cx, _: &()| {
            let (query, set) = cx.use_state(|| 0)?;
            let (pending, start) = cx.use_transition()?;
            *setter.borrow_mut() = Some(set);
            *starter.borrow_mut() = Some(start);
            let suffix = if pending { " pending" } else { "" };
            Ok(Child::text(format!("{query}{suffix}")))
        })
    };
    let (mut r, root, container) = new_reconciler(ManualScheduler::default(), ReconcilerConfig::default());
    r.render(root, Element::component(&component, ())).unwrap();
    flush(&mut r);

    let set = get(&setter);
    let start = get(&starter);
    r.run_with_priority(PriorityClass::UserBlocking, || start.start(|| set.set(7)));
    assert_eq!(
        r.root_lanes(root).unwrap().pending,
        Lanes::INPUT_CONTINUOUS | Lanes::TRANSITION
    );

    run_next_task(&mut r).unwrap();
    assert_eq!(r.host().render_text(container), "0 pending");
    assert_eq!(r.scheduler().pending_tasks()[0].priority, PriorityClass::Low);

    flush(&mut r);
    assert_eq!(r.host().render_text(container), "7");
}

#[test]
fn start_transition_schedules_at_low_priority() {
    let setter = slot();
    let counter = counter(setter.clone());
    let (mut r, root, container) = new_reconciler(ManualScheduler::default(), ReconcilerConfig::default());
    r.render(root, Element::component(&counter, ())).unwrap();
    flush(&mut r);

    let set = get(&setter);
    r.start_transition(|| set.set(9));
    let pending = r.scheduler().pending_tasks();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].priority, PriorityClass::Low);
    flush(&mut r);
    assert_eq!(r.host().render_text(container), "9");
}

/// Ten items numbered from the `usize` props.
fn numbered_list() -> Component {
    Component::new("Numbered", |_cx, offset: &usize| {
        let items = (0..10).map(|i| Element::host("li", Vec::new(), Child::text((i + *offset).to_string())));
        Ok(Element::host("ul", Vec::new(), Child::list(items)).into())
    })
}

#[test]
fn time_sliced_render_commits_only_at_the_end() {
    let list = numbered_list();
    let (mut r, root, container) = new_reconciler(ManualScheduler::default(), ReconcilerConfig::default());
    r.render(root, Element::component(&list, 0usize)).unwrap();
    flush(&mut r);
    let before = item_texts(&r, container);
    assert_eq!(before[0], "0");

    r.scheduler_mut().set_yield_policy(YieldPolicy::EveryUnits(4));
    r.render_with_priority(root, Element::component(&list, 100usize), PriorityClass::Normal)
        .unwrap();
    let mut slices = 0;
    loop {
        match run_next_task(&mut r).unwrap() {
            Some(TaskStatus::Continue) => {
                slices += 1;
                assert_eq!(item_texts(&r, container), before);
            }
            Some(TaskStatus::Complete) | None => break,
        }
    }
    assert!(slices >= 3, "expected several slices, got {slices}");
    assert_eq!(item_texts(&r, container)[0], "100");
    assert!(r.host().errors().is_empty());
}

#[test]
fn unit_cap_slices_even_when_the_host_never_yields() {
    let list = numbered_list();
    let config = ReconcilerConfig {
        max_units_per_slice: Some(3),
        ..ReconcilerConfig::default()
    };
    let (mut r, root, container) = new_reconciler(ManualScheduler::default(), config);
    r.render_with_priority(root, Element::component(&list, 0usize), PriorityClass::Normal)
        .unwrap();
    let mut statuses = Vec::new();
    while let Some(status) = run_next_task(&mut r).unwrap() {
        statuses.push(status);
        if status == TaskStatus::Complete {
            break;
        }
    }
    assert!(statuses.iter().filter(|s| **s == TaskStatus::Continue).count() >= 5);
    assert_eq!(item_texts(&r, container).len(), 10);
}

#[test]
fn effect_dispatch_renders_after_commit() {
    let component = Component::new("Loader", |cx, _: &()| {
        let (loaded, set) = cx.use_state(|| false)?;
        cx.use_effect(Some(deps![]), move || {
            set.set(true);
            None
        })?;
        Ok(Child::text(if loaded { "loaded" } else { "loading" }))
    });
    let (mut r, root, container) = new_reconciler(ManualScheduler::default(), ReconcilerConfig::default());
    r.render(root, Element::component(&component, ())).unwrap();
    run_microtasks(&mut r).unwrap();
    assert_eq!(r.host().render_text(container), "loading");
    assert_eq!(
        r.scheduler().pending_tasks()[0].task,
        Task::FlushPassiveEffects(root)
    );

    flush(&mut r);
    assert_eq!(r.host().render_text(container), "loaded");
    assert_eq!(r.counters().commits, 2);
    assert_eq!(r.counters().passive_flushes, 1);
}

#[test]
fn roots_render_independently() {
    let (mut r, first, first_container) =
        new_reconciler(ManualScheduler::default(), ReconcilerConfig::default());
    let second_container = r.host_mut().create_container();
    let second = r.create_root(second_container);

    r.render(first, Child::text("one")).unwrap();
    r.render(second, Child::text("two")).unwrap();
    flush(&mut r);
    assert_eq!(r.host().render_text(first_container), "one");
    assert_eq!(r.host().render_text(second_container), "two");

    r.render(second, Child::Empty).unwrap();
    flush(&mut r);
    assert_eq!(r.host().render_text(first_container), "one");
    assert_eq!(r.host().render_text(second_container), "");
}
