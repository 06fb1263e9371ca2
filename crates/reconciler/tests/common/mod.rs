#![allow(dead_code)]

use host_test_support::{TestReconciler, run_until_idle};
use reconciler::{Child, Component, Dispatch, Element, HostHandle, Teardown};
use std::cell::RefCell;
use std::rc::Rc;

/// Hands a value produced inside a render back to the test body.
pub type Slot<T> = Rc<RefCell<Option<T>>>;

pub fn slot<T>() -> Slot<T> {
    Rc::new(RefCell::new(None))
}

pub fn get<T: Clone>(slot: &Slot<T>) -> T {
    slot.borrow().clone().expect("slot was never filled by a render")
}

pub type Log = Rc<RefCell<Vec<String>>>;

pub fn log() -> Log {
    Rc::new(RefCell::new(Vec::new()))
}

pub fn drain(log: &Log) -> Vec<String> {
    std::mem::take(&mut *log.borrow_mut())
}

pub fn teardown(f: impl FnOnce() + 'static) -> Option<Teardown> {
    Some(Box::new(f))
}

/// Renders its `i32` state as a single text node and publishes the setter.
pub fn counter(setter: Slot<Dispatch<i32>>) -> Component {
    Component::new("Counter", move |cx, _: &()| {
        let (count, set) = cx.use_state(|| 0)?;
        *setter.borrow_mut() = Some(set);
        Ok(Child::text(count.to_string()))
    })
}

/// `<ul>` of `<li>` elements keyed and labelled by `keys`.
pub fn keyed_list<K: AsRef<str>>(keys: &[K]) -> Element {
    let items = keys.iter().map(|key| {
        let key = key.as_ref();
        Element::host("li", Vec::new(), Child::text(key)).with_key(key)
    });
    Element::host("ul", Vec::new(), Child::list(items))
}

pub fn flush(reconciler: &mut TestReconciler) {
    run_until_idle(reconciler).expect("render failed");
}

/// Text of each item of the list mounted directly in `container`.
pub fn item_texts(reconciler: &TestReconciler, container: HostHandle) -> Vec<String> {
    let host = reconciler.host();
    let Some(list) = host.children(container).first().copied() else {
        return Vec::new();
    };
    host.children(list)
        .iter()
        .map(|item| host.render_text(*item))
        .collect()
}
