mod common;

use common::{flush, get, slot};
use host_test_support::{ManualScheduler, new_reconciler};
use pretty_assertions::assert_eq;
use reconciler::{Child, Component, Context, Element, ReconcilerConfig, attrs};
use std::cell::Cell;
use std::rc::Rc;

#[derive(PartialEq)]
struct Label(&'static str);

#[test]
fn memo_skips_child_while_props_compare_equal() {
    let renders = Rc::new(Cell::new(0));
    let label = {
        let renders = Rc::clone(&renders);
        Component::new("Label", move |_cx, props: &Label| {
            renders.set(renders.get() + 1);
            Ok(Child::text(props.0))
        })
        .memo::<Label>()
    };
    let setter = slot();
    let parent = {
        let setter = setter.clone();
        Component::new("Parent", move |cx, _: &()| {
            let (tick, set) = cx.use_state(|| 0)?;
            *setter.borrow_mut() = Some(set);
            let text = if tick < 2 { "fixed" } else { "changed" };
            Ok(Element::fragment([Child::text(tick.to_string()), Element::memo(&label, Label(text)).into()]).into())
        })
    };
    let (mut r, root, container) = new_reconciler(ManualScheduler::default(), ReconcilerConfig::default());
    r.render(root, Element::component(&parent, ())).unwrap();
    flush(&mut r);
    assert_eq!(renders.get(), 1);

    get(&setter).set(1);
    flush(&mut r);
    assert_eq!(r.host().render_text(container), "1fixed");
    assert_eq!(renders.get(), 1);

    get(&setter).set(2);
    flush(&mut r);
    assert_eq!(r.host().render_text(container), "2changed");
    assert_eq!(renders.get(), 2);
}

#[test]
fn context_change_reaches_reader_behind_memo() {
    let theme = Context::new(0);
    let middle_renders = Rc::new(Cell::new(0));
    let reader = {
        let theme = theme.clone();
        Component::new("Reader", move |cx, _: &()| {
            let value = cx.use_context(&theme);
            Ok(Child::text(format!("theme {value}")))
        })
    };
    let middle = {
        let renders = Rc::clone(&middle_renders);
        Component::new("Middle", move |_cx, _: &()| {
            renders.set(renders.get() + 1);
            Ok(Element::component(&reader, ()).into())
        })
        .memo::<()>()
    };
    let setter = slot();
    let app = {
        let setter = setter.clone();
        let theme = theme.clone();
        Component::new("App", move |cx, _: &()| {
            let (value, set) = cx.use_state(|| 1)?;
            *setter.borrow_mut() = Some(set);
            Ok(theme.provide(value, Element::memo(&middle, ())).into())
        })
    };
    let (mut r, root, container) = new_reconciler(ManualScheduler::default(), ReconcilerConfig::default());
    r.render(root, Element::component(&app, ())).unwrap();
    flush(&mut r);
    assert_eq!(r.host().render_text(container), "theme 1");

    get(&setter).set(7);
    flush(&mut r);
    assert_eq!(r.host().render_text(container), "theme 7");
    assert_eq!(middle_renders.get(), 1);
}

#[test]
fn reader_outside_any_provider_sees_the_default() {
    let theme = Context::new("light");
    let reader = Component::new("Reader", move |cx, _: &()| Ok(Child::text(*cx.use_context(&theme))));
    let (mut r, root, container) = new_reconciler(ManualScheduler::default(), ReconcilerConfig::default());
    r.render(root, Element::component(&reader, ())).unwrap();
    flush(&mut r);
    assert_eq!(r.host().render_text(container), "light");
}

#[test]
fn rendering_an_equal_tree_twice_issues_no_host_calls() {
    let tree = || {
        Element::host(
            "div",
            attrs([("id", "main")]),
            Child::list([Element::host("span", Vec::new(), Child::text("a")), Element::host("span", Vec::new(), Child::text("b"))]),
        )
    };
    let (mut r, root, container) = new_reconciler(ManualScheduler::default(), ReconcilerConfig::default());
    r.render(root, tree()).unwrap();
    flush(&mut r);
    r.host_mut().take_ops();

    r.render(root, tree()).unwrap();
    flush(&mut r);
    assert!(r.host().ops().is_empty());

    let same = tree();
    r.render(root, same.clone()).unwrap();
    flush(&mut r);
    let bailouts = r.counters().bailouts;
    r.render(root, same).unwrap();
    flush(&mut r);
    assert!(r.host().ops().is_empty());
    assert!(r.counters().bailouts > bailouts);
    assert_eq!(r.host().render_text(container), "ab");
}

#[test]
fn changed_attributes_update_in_place() {
    let (mut r, root, container) = new_reconciler(ManualScheduler::default(), ReconcilerConfig::default());
    r.render(root, Element::host("div", attrs([("class", "a")]), Child::Empty)).unwrap();
    flush(&mut r);
    let div = r.host().children(container)[0];
    r.host_mut().take_ops();

    r.render(root, Element::host("div", attrs([("class", "b")]), Child::Empty)).unwrap();
    flush(&mut r);
    assert_eq!(r.host().children(container), &[div]);
    assert_eq!(r.host().attribute(div, "class"), Some("b"));
    let lines = r.host().ops_json();
    assert_eq!(lines.len(), 1);
    let op: serde_json::Value = serde_json::from_str(&lines[0]).unwrap();
    assert_eq!(
        op,
        serde_json::json!({"op": "update_props", "handle": div.0, "attributes": [["class", "b"]]})
    );
}
