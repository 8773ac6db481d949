//! Property-based invariants for keyed child reconciliation, checked
//! end-to-end through the memory host:
//!
//! 1. Any permutation of a keyed list commits to exactly the new order.
//! 2. Pure permutations create and remove nothing (all nodes reused).
//! 3. Additions create exactly the added entries; removals detach exactly
//!    the dropped entries.
//! 4. Re-rendering the same list is free (empty operation log).

use std::cell::RefCell;
use std::rc::Rc;

use proptest::prelude::*;

use weft::host::{HostOp, InstanceId, MemoryHost, run_microtasks};
use weft::sched::StepScheduler;
use weft::{Node, WeftRoot, el, text};

struct Fixture {
    host: Rc<RefCell<MemoryHost>>,
    container: InstanceId,
    root: WeftRoot,
}

fn fixture() -> Fixture {
    let host = Rc::new(RefCell::new(MemoryHost::new()));
    let sched = Rc::new(RefCell::new(StepScheduler::new()));
    let container = host.borrow_mut().create_container();
    let root = WeftRoot::new(Rc::clone(&host), sched, container);
    Fixture {
        host,
        container,
        root,
    }
}

fn keyed_list(keys: &[u8]) -> Node {
    el("ul")
        .with_children(
            keys.iter()
                .map(|key| {
                    el("li")
                        .with_key(format!("k{key}"))
                        .with_child(text(format!("k{key}")))
                        .into()
                })
                .collect(),
        )
        .into()
}

/// Committed li order under the single ul child, read back as key strings.
fn committed_keys(fx: &Fixture) -> Vec<String> {
    let host = fx.host.borrow();
    let ul = host.children(fx.container)[0];
    host.children(ul)
        .into_iter()
        .map(|li| host.flat_text(li))
        .collect()
}

fn count_ops(ops: &[HostOp], pred: impl Fn(&HostOp) -> bool) -> usize {
    ops.iter().filter(|op| pred(op)).count()
}

fn permutation(n: usize) -> impl Strategy<Value = Vec<u8>> {
    Just((0..n as u8).collect::<Vec<u8>>()).prop_shuffle()
}

proptest! {
    #[test]
    fn permutations_commit_the_new_order_with_zero_churn(
        (initial, next) in (2usize..7)
            .prop_flat_map(|n| (permutation(n), permutation(n)))
    ) {
        let fx = fixture();
        fx.root.render(keyed_list(&initial));
        run_microtasks(&fx.host);
        fx.host.borrow_mut().take_ops();

        fx.root.render(keyed_list(&next));
        run_microtasks(&fx.host);

        let expected: Vec<String> = next.iter().map(|k| format!("k{k}")).collect();
        prop_assert_eq!(committed_keys(&fx), expected);

        let ops = fx.host.borrow_mut().take_ops();
        prop_assert_eq!(
            0,
            count_ops(&ops, |op| matches!(
                op,
                HostOp::CreateInstance { .. } | HostOp::CreateText { .. } | HostOp::Remove { .. }
            )),
            "a pure permutation must reuse every node: {:?}",
            ops
        );
    }

    #[test]
    fn additions_and_removals_touch_exactly_the_changed_entries(
        (initial, next) in (2usize..6).prop_flat_map(|n| {
            let keys: Vec<u8> = (0..n as u8).collect();
            (
                Just(keys.clone()).prop_shuffle(),
                proptest::sample::subsequence(keys, 0..=n).prop_shuffle(),
                proptest::sample::subsequence(vec![100u8, 101, 102, 103], 0..=4),
            )
                .prop_map(|(initial, kept, added)| {
                    let mut next = kept;
                    next.extend(added);
                    (initial, next)
                })
        })
    ) {
        let fx = fixture();
        fx.root.render(keyed_list(&initial));
        run_microtasks(&fx.host);
        fx.host.borrow_mut().take_ops();

        fx.root.render(keyed_list(&next));
        run_microtasks(&fx.host);

        let expected: Vec<String> = next.iter().map(|k| format!("k{k}")).collect();
        prop_assert_eq!(committed_keys(&fx), expected);

        let added = next.iter().filter(|k| !initial.contains(k)).count();
        let dropped = initial.iter().filter(|k| !next.contains(k)).count();
        let ops = fx.host.borrow_mut().take_ops();

        prop_assert_eq!(
            added,
            count_ops(&ops, |op| matches!(op, HostOp::CreateInstance { .. }))
        );
        prop_assert_eq!(
            dropped,
            count_ops(&ops, |op| matches!(op, HostOp::Remove { .. }))
        );
    }

    #[test]
    fn rerendering_the_same_list_is_free(
        keys in (1usize..7).prop_flat_map(permutation)
    ) {
        let fx = fixture();
        fx.root.render(keyed_list(&keys));
        run_microtasks(&fx.host);
        fx.host.borrow_mut().take_ops();

        fx.root.render(keyed_list(&keys));
        run_microtasks(&fx.host);

        let ops = fx.host.borrow_mut().take_ops();
        prop_assert!(ops.is_empty(), "identical rerender produced {:?}", ops);
    }
}
