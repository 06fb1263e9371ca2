mod common;

use common::{drain, flush, get, log, slot, teardown};
use host_test_support::{ManualScheduler, new_reconciler, run_until_idle};
use pretty_assertions::assert_eq;
use reconciler::{
    Child, Component, Element, HookKind, HookViolation, HostHandle, NodeRef, ReconcilerConfig,
    ReconcilerError, deps,
};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Declares a second state cell only when `extra` is set.
fn flaky() -> Component {
    Component::new("Flaky", |cx, extra: &bool| {
        cx.use_state(|| 0)?;
        if *extra {
            cx.use_state(|| 1)?;
        }
        Ok(Child::text("ok"))
    })
}

#[test]
fn extra_hook_on_update_is_a_count_mismatch() {
    let flaky = flaky();
    let (mut r, root, container) = new_reconciler(ManualScheduler::default(), ReconcilerConfig::default());
    r.render(root, Element::component(&flaky, false)).unwrap();
    flush(&mut r);

    r.render(root, Element::component(&flaky, true)).unwrap();
    let error = run_until_idle(&mut r).unwrap_err();
    assert!(matches!(
        error,
        ReconcilerError::Hook(HookViolation::CountMismatch {
            component: "Flaky",
            expected: 1,
            found: 2
        })
    ));
    assert_eq!(r.host().render_text(container), "ok");
}

#[test]
fn missing_hook_on_update_is_a_count_mismatch() {
    let flaky = flaky();
    let (mut r, root, _) = new_reconciler(ManualScheduler::default(), ReconcilerConfig::default());
    r.render(root, Element::component(&flaky, true)).unwrap();
    flush(&mut r);

    r.render(root, Element::component(&flaky, false)).unwrap();
    let error = run_until_idle(&mut r).unwrap_err();
    assert!(matches!(
        error,
        ReconcilerError::Hook(HookViolation::CountMismatch {
            expected: 2,
            found: 1,
            ..
        })
    ));
}

#[test]
fn reordered_hooks_are_a_kind_mismatch() {
    let swapped = Component::new("Swapped", |cx, swap: &bool| {
        if *swap {
            cx.use_ref(|| 0u8)?;
            cx.use_state(|| 0)?;
        } else {
            cx.use_state(|| 0)?;
            cx.use_ref(|| 0u8)?;
        }
        Ok(Child::Empty)
    });
    let (mut r, root, _) = new_reconciler(ManualScheduler::default(), ReconcilerConfig::default());
    r.render(root, Element::component(&swapped, false)).unwrap();
    flush(&mut r);

    r.render(root, Element::component(&swapped, true)).unwrap();
    let error = run_until_idle(&mut r).unwrap_err();
    match error {
        ReconcilerError::Hook(violation) => assert_eq!(
            violation,
            HookViolation::KindMismatch {
                component: "Swapped",
                index: 0,
                expected: HookKind::State,
                found: HookKind::Ref,
            }
        ),
        other => panic!("expected a hook violation, got {other}"),
    }
}

#[test]
fn effect_in_place_of_a_ref_is_a_kind_mismatch() {
    let swapped = Component::new("Swapped", |cx, swap: &bool| {
        if *swap {
            cx.use_effect(None, || None)?;
        } else {
            cx.use_ref(|| 0u8)?;
        }
        Ok(Child::Empty)
    });
    let (mut r, root, _) = new_reconciler(ManualScheduler::default(), ReconcilerConfig::default());
    r.render(root, Element::component(&swapped, false)).unwrap();
    flush(&mut r);

    r.render(root, Element::component(&swapped, true)).unwrap();
    let error = run_until_idle(&mut r).unwrap_err();
    assert!(matches!(
        error,
        ReconcilerError::Hook(HookViolation::KindMismatch {
            component: "Swapped",
            index: 0,
            expected: HookKind::Ref,
            found: HookKind::Effect,
        })
    ));
    assert_eq!(r.counters().commits, 1);
}

#[test]
fn effects_run_children_first_and_teardowns_before_setups() {
    let events = log();
    let child_events = Rc::clone(&events);
    let child = Component::new("Child", move |cx, _: &i32| {
        let setup_log = Rc::clone(&child_events);
        cx.use_effect(None, move || {
            setup_log.borrow_mut().push("child setup".to_string());
            teardown(move || setup_log.borrow_mut().push("child teardown".to_string()))
        })?;
        Ok(Child::text("child"))
    });
    let setter = slot();
    let parent = {
        let events = Rc::clone(&events);
        let setter = setter.clone();
        Component::new("Parent", move |cx, _: &()| {
            let (tick, set) = cx.use_state(|| 0)?;
            *setter.borrow_mut() = Some(set);
            let setup_log = Rc::clone(&events);
            cx.use_effect(None, move || {
                setup_log.borrow_mut().push("parent setup".to_string());
                teardown(move || setup_log.borrow_mut().push("parent teardown".to_string()))
            })?;
            Ok(Element::component(&child, tick).into())
        })
    };
    let (mut r, root, _) = new_reconciler(ManualScheduler::default(), ReconcilerConfig::default());
    r.render(root, Element::component(&parent, ())).unwrap();
    flush(&mut r);
    assert_eq!(drain(&events), vec!["child setup", "parent setup"]);

    get(&setter).set(1);
    flush(&mut r);
    assert_eq!(
        drain(&events),
        vec!["child teardown", "parent teardown", "child setup", "parent setup"]
    );

    r.render(root, Child::Empty).unwrap();
    flush(&mut r);
    assert_eq!(drain(&events), vec!["parent teardown", "child teardown"]);
}

#[test]
fn effect_deps_gate_reruns() {
    let events = log();
    let setter = slot();
    let component = {
        let events = Rc::clone(&events);
        let setter = setter.clone();
        Component::new("Gated", move |cx, _: &()| {
            let (n, set) = cx.use_state(|| 0)?;
            *setter.borrow_mut() = Some(set);
            let mount_log = Rc::clone(&events);
            cx.use_effect(Some(deps![]), move || {
                mount_log.borrow_mut().push("mount".to_string());
                None
            })?;
            let n_log = Rc::clone(&events);
            cx.use_effect(Some(deps![n]), move || {
                n_log.borrow_mut().push(format!("n={n}"));
                teardown(move || n_log.borrow_mut().push(format!("cleanup n={n}")))
            })?;
            Ok(Child::text(n.to_string()))
        })
    };
    let (mut r, root, _) = new_reconciler(ManualScheduler::default(), ReconcilerConfig::default());
    r.render(root, Element::component(&component, ())).unwrap();
    flush(&mut r);
    assert_eq!(drain(&events), vec!["mount", "n=0"]);

    get(&setter).set(1);
    flush(&mut r);
    assert_eq!(drain(&events), vec!["cleanup n=0", "n=1"]);

    // Re-rendering from the root with the same state changes no deps.
    r.render(root, Element::component(&component, ())).unwrap();
    flush(&mut r);
    assert!(drain(&events).is_empty());
}

#[test]
fn refs_memos_and_setters_are_stable_across_renders() {
    let computed = Rc::new(Cell::new(0));
    let first_ref = slot();
    let same_ref = Rc::new(Cell::new(true));
    let setters = Rc::new(RefCell::new(Vec::new()));
    let setter = slot();
    let component = {
        let computed = Rc::clone(&computed);
        let first_ref = first_ref.clone();
        let same_ref = Rc::clone(&same_ref);
        let setters = Rc::clone(&setters);
        let setter = setter.clone();
        Component::new("Stable", move |cx, _: &()| {
            let (n, set) = cx.use_state(|| 0)?;
            setters.borrow_mut().push(set.clone());
            *setter.borrow_mut() = Some(set);
            let handle = cx.use_ref(|| 0u32)?;
            let first = first_ref.borrow().clone();
            match first {
                Some(first) => same_ref.set(same_ref.get() && handle.same(&first)),
                None => *first_ref.borrow_mut() = Some(handle.clone()),
            }
            *handle.borrow_mut() += 1;
            let half = cx.use_memo(deps![n / 2], || {
                computed.set(computed.get() + 1);
                n / 2
            })?;
            Ok(Child::text(format!("{n}/{half}")))
        })
    };
    let (mut r, root, container) = new_reconciler(ManualScheduler::default(), ReconcilerConfig::default());
    r.render(root, Element::component(&component, ())).unwrap();
    flush(&mut r);
    for n in 1..=3 {
        get(&setter).set(n);
        flush(&mut r);
    }

    assert_eq!(r.host().render_text(container), "3/1");
    assert_eq!(computed.get(), 2);
    assert!(same_ref.get());
    assert_eq!(*get(&first_ref).borrow(), 4);
    let setters = setters.borrow();
    assert_eq!(setters.len(), 4);
    assert!(setters.iter().all(|s| *s == setters[0]));
}

#[test]
fn node_ref_follows_mount_and_unmount() {
    let node_ref = NodeRef::new();
    let (mut r, root, container) = new_reconciler(ManualScheduler::default(), ReconcilerConfig::default());
    r.render(root, Element::host("div", Vec::new(), Child::Empty).with_ref(&node_ref)).unwrap();
    flush(&mut r);
    assert_eq!(node_ref.get(), Some(HostHandle(2)));
    assert_eq!(r.host().children(container), &[HostHandle(2)]);

    r.render(root, Child::Empty).unwrap();
    flush(&mut r);
    assert_eq!(node_ref.get(), None);
}

#[test]
fn failing_component_reports_its_name() {
    let broken = Component::new("Broken", |_cx, _: &()| Err(reconciler::Interrupt::failed("no data")));
    let (mut r, root, _) = new_reconciler(ManualScheduler::default(), ReconcilerConfig::default());
    r.render(root, Element::component(&broken, ())).unwrap();
    match run_until_idle(&mut r) {
        Err(ReconcilerError::Component { component, message }) => {
            assert_eq!(component, "Broken");
            assert_eq!(message, "no data");
        }
        other => panic!("expected a component failure, got {other:?}"),
    }
}
