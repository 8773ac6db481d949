//! End-to-end structural behavior: mount, diff, reorder, deletion, and
//! commit idempotence, observed through the memory host's operation log.

use std::cell::RefCell;
use std::rc::Rc;

use weft::host::{HostOp, InstanceId, MemoryHost, PropValue, run_microtasks};
use weft::sched::StepScheduler;
use weft::{Node, WeftRoot, el, fragment, text};

struct Fixture {
    host: Rc<RefCell<MemoryHost>>,
    #[allow(dead_code)]
    sched: Rc<RefCell<StepScheduler>>,
    container: InstanceId,
    root: WeftRoot,
}

fn fixture() -> Fixture {
    let host = Rc::new(RefCell::new(MemoryHost::new()));
    let sched = Rc::new(RefCell::new(StepScheduler::new()));
    let container = host.borrow_mut().create_container();
    let root = WeftRoot::new(Rc::clone(&host), Rc::clone(&sched), container);
    Fixture {
        host,
        sched,
        container,
        root,
    }
}

impl Fixture {
    /// Drain the microtask checkpoint (flushes sync-lane renders).
    fn flush(&self) {
        run_microtasks(&self.host);
    }

    fn committed_text(&self) -> String {
        self.host.borrow().flat_text(self.container)
    }

    fn take_ops(&self) -> Vec<HostOp> {
        self.host.borrow_mut().take_ops()
    }
}

fn keyed_li(key: &str) -> Node {
    el("li").with_key(key).with_child(text(key)).into()
}

#[test]
fn mount_commits_a_host_tree() {
    let fx = fixture();
    fx.root.render(
        el("div")
            .with_attr("id", "app")
            .with_child(el("span").with_child(text("hello ")))
            .with_child(text("world")),
    );
    fx.flush();

    assert_eq!(fx.committed_text(), "hello world");
    let children = fx.host.borrow().children(fx.container);
    assert_eq!(children.len(), 1);
    assert_eq!(fx.host.borrow().tag(children[0]), Some("div"));
}

#[test]
fn recommit_without_changes_produces_zero_host_mutations() {
    let fx = fixture();
    let tree = || {
        el("div")
            .with_attr("id", "app")
            .with_child(el("span").with_child(text("stable")))
    };
    fx.root.render(tree());
    fx.flush();
    fx.take_ops();

    fx.root.render(tree());
    fx.flush();

    assert!(fx.take_ops().is_empty(), "clean recommit must not touch the host");
    assert_eq!(fx.committed_text(), "stable");
}

#[test]
fn text_change_patches_in_place() {
    let fx = fixture();
    fx.root.render(el("p").with_child(text("one")));
    fx.flush();
    fx.take_ops();

    fx.root.render(el("p").with_child(text("two")));
    fx.flush();

    let ops = fx.take_ops();
    assert_eq!(ops.len(), 1);
    assert!(matches!(&ops[0], HostOp::PatchText { text, .. } if text == "two"));
    assert_eq!(fx.committed_text(), "two");
}

#[test]
fn prop_change_patches_the_instance() {
    let fx = fixture();
    fx.root.render(el("div").with_attr("class", "a"));
    fx.flush();
    fx.take_ops();

    fx.root.render(el("div").with_attr("class", "b"));
    fx.flush();

    let ops = fx.take_ops();
    assert_eq!(ops.len(), 1);
    assert!(matches!(ops[0], HostOp::PatchProps { .. }));

    let div = fx.host.borrow().children(fx.container)[0];
    let host = fx.host.borrow();
    let props = host.props(div).unwrap();
    assert_eq!(props.get("class"), Some(&PropValue::Str("b".into())));
}

#[test]
fn keyed_reversal_moves_without_creating_or_removing() {
    let fx = fixture();
    fx.root
        .render(el("ul").with_children(vec![keyed_li("a"), keyed_li("b"), keyed_li("c")]));
    fx.flush();
    assert_eq!(fx.committed_text(), "abc");
    fx.take_ops();

    fx.root
        .render(el("ul").with_children(vec![keyed_li("c"), keyed_li("b"), keyed_li("a")]));
    fx.flush();

    assert_eq!(fx.committed_text(), "cba");
    let ops = fx.take_ops();
    assert!(
        ops.iter().all(|op| matches!(
            op,
            HostOp::Append { .. } | HostOp::InsertBefore { .. }
        )),
        "reorder must only move nodes, got {ops:?}"
    );
    // The pivot (c) stays put; exactly two entries relocate.
    assert_eq!(ops.len(), 2);
}

#[test]
fn removing_a_keyed_entry_detaches_exactly_one_host_node() {
    let fx = fixture();
    fx.root
        .render(el("ul").with_children(vec![keyed_li("a"), keyed_li("b"), keyed_li("c")]));
    fx.flush();
    fx.take_ops();

    fx.root
        .render(el("ul").with_children(vec![keyed_li("a"), keyed_li("c")]));
    fx.flush();

    assert_eq!(fx.committed_text(), "ac");
    let removes = fx
        .take_ops()
        .into_iter()
        .filter(|op| matches!(op, HostOp::Remove { .. }))
        .count();
    assert_eq!(removes, 1);
}

#[test]
fn type_change_at_a_key_rebuilds_that_position() {
    let fx = fixture();
    fx.root
        .render(el("ul").with_children(vec![keyed_li("a"), keyed_li("b")]));
    fx.flush();
    fx.take_ops();

    fx.root.render(el("ul").with_children(vec![
        el("p").with_key("a").with_child(text("a")).into(),
        keyed_li("b"),
    ]));
    fx.flush();

    assert_eq!(fx.committed_text(), "ab");
    let ops = fx.take_ops();
    assert!(ops.iter().any(|op| matches!(
        op,
        HostOp::CreateInstance { tag, .. } if tag == "p"
    )));
    assert!(ops.iter().any(|op| matches!(op, HostOp::Remove { .. })));
}

#[test]
fn keyless_fragment_is_transparent() {
    let fx = fixture();
    fx.root
        .render(el("div").with_child(fragment(vec![keyed_li("a"), keyed_li("b")])));
    fx.flush();

    assert_eq!(fx.committed_text(), "ab");
    let div = fx.host.borrow().children(fx.container)[0];
    // The fragment contributes no host node: both li attach to the div.
    assert_eq!(fx.host.borrow().children(div).len(), 2);
}

#[test]
fn keyed_fragments_reorder_as_units() {
    let fx = fixture();
    let frag = |key: &str, items: [&str; 2]| -> Node {
        fragment(vec![keyed_li(items[0]), keyed_li(items[1])])
            .with_key(key)
            .into()
    };
    fx.root.render(el("div").with_children(vec![
        frag("one", ["a", "b"]),
        frag("two", ["c", "d"]),
    ]));
    fx.flush();
    assert_eq!(fx.committed_text(), "abcd");
    fx.take_ops();

    fx.root.render(el("div").with_children(vec![
        frag("two", ["c", "d"]),
        frag("one", ["a", "b"]),
    ]));
    fx.flush();

    assert_eq!(fx.committed_text(), "cdab");
    let ops = fx.take_ops();
    assert!(
        ops.iter()
            .all(|op| !matches!(op, HostOp::CreateInstance { .. } | HostOp::CreateText { .. })),
        "fragment reorder must reuse every host node, got {ops:?}"
    );
}

#[test]
fn single_replacement_discards_the_former_list() {
    let fx = fixture();
    fx.root
        .render(el("ul").with_children(vec![keyed_li("a"), keyed_li("b"), keyed_li("c")]));
    fx.flush();
    fx.take_ops();

    // One key-matching element of a different type replaces the whole list.
    fx.root
        .render(el("ul").with_child(el("p").with_key("a").with_child(text("only"))));
    fx.flush();

    assert_eq!(fx.committed_text(), "only");
    let removes = fx
        .take_ops()
        .iter()
        .filter(|op| matches!(op, HostOp::Remove { .. }))
        .count();
    assert_eq!(removes, 3);
}

#[test]
fn empty_branches_render_nothing() {
    let fx = fixture();
    fx.root.render(el("div").with_children(vec![
        Node::Empty,
        text("visible"),
        Node::Empty,
    ]));
    fx.flush();
    assert_eq!(fx.committed_text(), "visible");
}

#[test]
fn unmount_clears_the_container() {
    let fx = fixture();
    fx.root
        .render(el("div").with_child(text("going away")));
    fx.flush();
    assert_eq!(fx.committed_text(), "going away");

    fx.root.unmount();
    fx.flush();

    assert_eq!(fx.committed_text(), "");
    assert!(fx.host.borrow().children(fx.container).is_empty());
}

#[test]
fn remount_after_unmount_works() {
    let fx = fixture();
    fx.root.render(el("div").with_child(text("first")));
    fx.flush();
    fx.root.unmount();
    fx.flush();
    fx.root.render(el("div").with_child(text("second")));
    fx.flush();

    assert_eq!(fx.committed_text(), "second");
}
