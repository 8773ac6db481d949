#![forbid(unsafe_code)]

//! In-memory reference host.
//!
//! `MemoryHost` keeps instances in an id-keyed arena and records every
//! mutation in an operation log. The log is the assertion surface for
//! commit tests: an idempotent recommit must leave it empty, and a keyed
//! reorder must contain exactly the expected moves.
//!
//! # Invariants
//!
//! 1. A node has at most one parent; attach operations detach first.
//! 2. The operation log records mutations in application order.
//! 3. Microtasks run in enqueue order, and tasks queued while draining run
//!    in the same drain.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use ahash::AHashMap;

use crate::backend::{HostBackend, InstanceId, Microtask};
use crate::props::PropMap;

/// One recorded host mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum HostOp {
    CreateInstance {
        id: InstanceId,
        tag: String,
    },
    CreateText {
        id: InstanceId,
        text: String,
    },
    Append {
        parent: InstanceId,
        child: InstanceId,
    },
    InsertBefore {
        parent: InstanceId,
        child: InstanceId,
        before: InstanceId,
    },
    Remove {
        parent: InstanceId,
        child: InstanceId,
    },
    PatchText {
        instance: InstanceId,
        text: String,
    },
    PatchProps {
        instance: InstanceId,
    },
}

#[derive(Debug, Clone)]
struct MemoryNode {
    tag: Option<String>,
    text: Option<String>,
    props: PropMap,
    children: Vec<InstanceId>,
    parent: Option<InstanceId>,
}

/// Mock tree host with a mutation log.
#[derive(Default)]
pub struct MemoryHost {
    nodes: AHashMap<InstanceId, MemoryNode>,
    next_id: u64,
    ops: Vec<HostOp>,
    microtasks: VecDeque<Microtask>,
}

impl MemoryHost {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a root container. Containers are ordinary nodes that were
    /// never created through the backend trait, so they do not appear in
    /// the operation log.
    pub fn create_container(&mut self) -> InstanceId {
        self.alloc(MemoryNode {
            tag: Some("#container".to_owned()),
            text: None,
            props: PropMap::default(),
            children: Vec::new(),
            parent: None,
        })
    }

    /// Drain and return the mutation log.
    pub fn take_ops(&mut self) -> Vec<HostOp> {
        std::mem::take(&mut self.ops)
    }

    /// Children of `id`, in order.
    #[must_use]
    pub fn children(&self, id: InstanceId) -> Vec<InstanceId> {
        self.nodes
            .get(&id)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    /// Element tag, if `id` is an element.
    #[must_use]
    pub fn tag(&self, id: InstanceId) -> Option<&str> {
        self.nodes.get(&id).and_then(|n| n.tag.as_deref())
    }

    /// Text content, if `id` is a text instance.
    #[must_use]
    pub fn text(&self, id: InstanceId) -> Option<&str> {
        self.nodes.get(&id).and_then(|n| n.text.as_deref())
    }

    /// Attribute map of `id`.
    #[must_use]
    pub fn props(&self, id: InstanceId) -> Option<&PropMap> {
        self.nodes.get(&id).map(|n| &n.props)
    }

    /// Concatenated text content of the subtree under `id`, in tree order.
    /// The cheap way for tests to assert what a committed tree "says".
    #[must_use]
    pub fn flat_text(&self, id: InstanceId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: InstanceId, out: &mut String) {
        let Some(node) = self.nodes.get(&id) else {
            return;
        };
        if let Some(text) = &node.text {
            out.push_str(text);
        }
        for child in &node.children {
            self.collect_text(*child, out);
        }
    }

    fn alloc(&mut self, node: MemoryNode) -> InstanceId {
        self.next_id += 1;
        let id = InstanceId(self.next_id);
        self.nodes.insert(id, node);
        id
    }

    fn detach(&mut self, child: InstanceId) {
        let Some(parent) = self.nodes.get(&child).and_then(|n| n.parent) else {
            return;
        };
        if let Some(parent_node) = self.nodes.get_mut(&parent) {
            parent_node.children.retain(|c| *c != child);
        }
        if let Some(child_node) = self.nodes.get_mut(&child) {
            child_node.parent = None;
        }
    }
}

impl HostBackend for MemoryHost {
    fn create_instance(&mut self, tag: &str, props: &PropMap) -> InstanceId {
        let id = self.alloc(MemoryNode {
            tag: Some(tag.to_owned()),
            text: None,
            props: props.clone(),
            children: Vec::new(),
            parent: None,
        });
        tracing::trace!(id = id.raw(), tag, "host.create_instance");
        self.ops.push(HostOp::CreateInstance {
            id,
            tag: tag.to_owned(),
        });
        id
    }

    fn create_text_instance(&mut self, text: &str) -> InstanceId {
        let id = self.alloc(MemoryNode {
            tag: None,
            text: Some(text.to_owned()),
            props: PropMap::default(),
            children: Vec::new(),
            parent: None,
        });
        self.ops.push(HostOp::CreateText {
            id,
            text: text.to_owned(),
        });
        id
    }

    fn append_child(&mut self, parent: InstanceId, child: InstanceId) {
        self.detach(child);
        if let Some(parent_node) = self.nodes.get_mut(&parent) {
            parent_node.children.push(child);
        }
        if let Some(child_node) = self.nodes.get_mut(&child) {
            child_node.parent = Some(parent);
        }
        self.ops.push(HostOp::Append { parent, child });
    }

    fn insert_before(&mut self, parent: InstanceId, child: InstanceId, before: InstanceId) {
        self.detach(child);
        if let Some(parent_node) = self.nodes.get_mut(&parent) {
            let at = parent_node
                .children
                .iter()
                .position(|c| *c == before)
                .unwrap_or(parent_node.children.len());
            parent_node.children.insert(at, child);
        }
        if let Some(child_node) = self.nodes.get_mut(&child) {
            child_node.parent = Some(parent);
        }
        self.ops.push(HostOp::InsertBefore {
            parent,
            child,
            before,
        });
    }

    fn remove_child(&mut self, parent: InstanceId, child: InstanceId) {
        tracing::trace!(
            parent = parent.raw(),
            child = child.raw(),
            "host.remove_child"
        );
        if let Some(parent_node) = self.nodes.get_mut(&parent) {
            parent_node.children.retain(|c| *c != child);
        }
        if let Some(child_node) = self.nodes.get_mut(&child) {
            child_node.parent = None;
        }
        self.ops.push(HostOp::Remove { parent, child });
    }

    fn commit_text_update(&mut self, instance: InstanceId, text: &str) {
        if let Some(node) = self.nodes.get_mut(&instance) {
            node.text = Some(text.to_owned());
        }
        self.ops.push(HostOp::PatchText {
            instance,
            text: text.to_owned(),
        });
    }

    fn commit_prop_update(&mut self, instance: InstanceId, props: &PropMap) {
        if let Some(node) = self.nodes.get_mut(&instance) {
            node.props = props.clone();
        }
        self.ops.push(HostOp::PatchProps { instance });
    }

    fn schedule_microtask(&mut self, task: Microtask) {
        self.microtasks.push_back(task);
    }
}

/// Drain the host's microtask queue, including tasks enqueued mid-drain.
///
/// No borrow is held while a task body runs, so tasks may call back into
/// the host (and typically do: the sync-lane flush commits through it).
pub fn run_microtasks(host: &Rc<RefCell<MemoryHost>>) {
    loop {
        let Some(task) = host.borrow_mut().microtasks.pop_front() else {
            return;
        };
        task();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
