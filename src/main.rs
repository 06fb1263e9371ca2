//! Walks a small app through mount, update, reorder and suspense against the
//! recording host and prints the host tree after each step.
//!
//! Run with `RUST_LOG=reconciler=debug` to see the render and commit phases.

use core_types::PriorityClass;
use host_test_support::{ManualScheduler, TestReconciler, new_reconciler, run_until_idle};
use mimalloc::MiMalloc;
use reconciler::{Child, Component, Dispatch, Element, HostHandle, ReconcilerConfig, ReconcilerError, Resource, attrs};
use std::cell::RefCell;
use std::rc::Rc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn print_tree(step: &str, r: &TestReconciler, container: HostHandle) {
    println!("== {step} ({} host ops)", r.host().ops().len());
    for line in r.host().snapshot(container) {
        println!("{line}");
    }
}

fn main() -> Result<(), ReconcilerError> {
    env_logger::init();

    let setter: Rc<RefCell<Option<Dispatch<Vec<&'static str>>>>> = Rc::new(RefCell::new(None));
    let profile: Resource<String> = Resource::pending();

    let name = {
        let profile = profile.clone();
        Component::new("Name", move |cx, _: &()| {
            let name = cx.use_resource(&profile)?;
            Ok(Element::host("b", Vec::new(), Child::text(name)).into())
        })
    };
    let app = {
        let setter = Rc::clone(&setter);
        Component::new("App", move |cx, _: &()| {
            let (items, set) = cx.use_state(|| vec!["a", "b", "c"])?;
            *setter.borrow_mut() = Some(set);
            let list = items
                .iter()
                .map(|item| Element::host("li", Vec::new(), Child::text(*item)).with_key(*item));
            Ok(Element::host(
                "main",
                attrs([("id", "app")]),
                Child::list([
                    Element::host("ul", Vec::new(), Child::list(list)),
                    Element::suspense(Element::component(&name, ()), Child::text("loading")),
                ]),
            )
            .into())
        })
    };

    let (mut r, root, container) = new_reconciler(ManualScheduler::default(), ReconcilerConfig::default());
    r.render(root, Element::component(&app, ()))?;
    run_until_idle(&mut r)?;
    print_tree("mount", &r, container);

    let Some(set) = setter.borrow().clone() else {
        log::error!(target: "demo", "App never published its setter");
        return Ok(());
    };
    r.host_mut().take_ops();
    r.run_with_priority(PriorityClass::UserBlocking, || set.set(vec!["c", "a", "b"]));
    run_until_idle(&mut r)?;
    print_tree("rotate", &r, container);

    r.host_mut().take_ops();
    profile.resolve("Ada".to_string());
    run_until_idle(&mut r)?;
    print_tree("resolve", &r, container);

    let counters = r.counters();
    log::info!(
        target: "demo",
        "renders={} commits={} host_mutations={} live_fibers={}",
        counters.renders_started,
        counters.commits,
        counters.host_mutations,
        r.live_fibers()
    );
    Ok(())
}
