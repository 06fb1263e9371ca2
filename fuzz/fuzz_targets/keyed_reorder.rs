#![no_main]

use host_test_support::{ManualScheduler, new_reconciler, run_until_idle};
use libfuzzer_sys::fuzz_target;
use reconciler::{Child, Element, ReconcilerConfig};

const MAX_ROUNDS: usize = 8;

/// Each zero byte ends a round; other bytes pick keys from a small alphabet.
/// Duplicates within a round are dropped so every list is validly keyed.
fn rounds(data: &[u8]) -> Vec<Vec<String>> {
    data.split(|byte| *byte == 0)
        .take(MAX_ROUNDS)
        .map(|round| {
            let mut keys: Vec<String> = Vec::new();
            for byte in round {
                let key = format!("k{}", byte % 32);
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
            keys
        })
        .collect()
}

fn keyed_list(keys: &[String]) -> Element {
    let items = keys
        .iter()
        .map(|key| Element::host("li", Vec::new(), Child::text(key.as_str())).with_key(key.as_str()));
    Element::host("ul", Vec::new(), Child::list(items))
}

fuzz_target!(|data: &[u8]| {
    let (mut r, root, container) = new_reconciler(ManualScheduler::default(), ReconcilerConfig::default());
    for keys in rounds(data) {
        r.render(root, keyed_list(&keys)).expect("render");
        run_until_idle(&mut r).expect("reconcile");

        let host = r.host();
        assert!(host.errors().is_empty(), "invalid host op: {:?}", host.errors());
        let list = host.children(container)[0];
        let texts: Vec<String> = host.children(list).iter().map(|item| host.render_text(*item)).collect();
        assert_eq!(texts, keys);
    }
});
