#![no_main]

use host_test_support::{ManualScheduler, YieldPolicy, new_reconciler, run_next_task, run_until_idle};
use libfuzzer_sys::fuzz_target;
use reconciler::{Child, Component, Dispatch, Element, PriorityClass, ReconcilerConfig};
use std::cell::RefCell;
use std::rc::Rc;

// Each byte is one step: the low bits choose the priority of an increment,
// a set high bit runs one scheduler slice instead. After draining, the
// rendered value must equal the number of increments.
fuzz_target!(|data: &[u8]| {
    let setter: Rc<RefCell<Option<Dispatch<u32>>>> = Rc::new(RefCell::new(None));
    let counter = {
        let setter = Rc::clone(&setter);
        Component::new("Counter", move |cx, _: &()| {
            let (count, set) = cx.use_state(|| 0u32)?;
            *setter.borrow_mut() = Some(set);
            let rows = (0..4).map(|i| Element::host("span", Vec::new(), Child::text(format!("{i}:{count}"))));
            Ok(Element::fragment([Child::text(count.to_string()), Child::list(rows)]).into())
        })
    };
    let (mut r, root, container) = new_reconciler(ManualScheduler::new(YieldPolicy::EveryUnits(2)), ReconcilerConfig::default());
    r.render(root, Element::component(&counter, ())).expect("render");
    run_until_idle(&mut r).expect("mount");
    let set = setter.borrow().clone().expect("setter published on mount");

    let mut increments = 0u32;
    for byte in data.iter().take(256) {
        if byte & 0x80 != 0 {
            run_next_task(&mut r).expect("slice");
            continue;
        }
        let priority = PriorityClass::ALL[(*byte as usize) % PriorityClass::ALL.len()];
        r.run_with_priority(priority, || set.update(|n| n + 1));
        increments += 1;
    }
    run_until_idle(&mut r).expect("drain");

    let host = r.host();
    assert!(host.errors().is_empty(), "invalid host op: {:?}", host.errors());
    let first = host.children(container)[0];
    assert_eq!(host.text(first), Some(increments.to_string().as_str()));
    assert!(r.root_lanes(root).expect("root").pending.is_empty());
});
