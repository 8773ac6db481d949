#![forbid(unsafe_code)]

//! Weft public facade.
//!
//! Re-exports the stable surface of the reconciler, host, and scheduler
//! crates plus the element construction helpers.
//!
//! # Example
//!
//! ```
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! use weft::{el, text, WeftRoot};
//! use weft::host::{MemoryHost, run_microtasks};
//! use weft::sched::StepScheduler;
//!
//! let host = Rc::new(RefCell::new(MemoryHost::new()));
//! let scheduler = Rc::new(RefCell::new(StepScheduler::new()));
//! let container = host.borrow_mut().create_container();
//! let root = WeftRoot::new(Rc::clone(&host), Rc::clone(&scheduler), container);
//!
//! root.render(el("div").with_attr("id", "greeting").with_child(text("hello")));
//! run_microtasks(&host);
//! assert_eq!(host.borrow().flat_text(container), "hello");
//!
//! // A second description diffs against the committed tree.
//! root.render(el("div").with_attr("id", "greeting").with_child(text("goodbye")));
//! run_microtasks(&host);
//! assert_eq!(host.borrow().flat_text(container), "goodbye");
//! ```

use std::rc::Rc;

pub use weft_reconciler::{
    ComponentFn, Context, ContextId, Dispatch, EffectCleanup, Element, ElementKind, HookCx,
    HookDep, Lanes, Node, Props, RenderError, Result, TransitionStarter, WeftRoot,
};

/// Host collaborator: backend trait, typed props, in-memory reference host.
pub mod host {
    pub use weft_host::{
        HostBackend, HostOp, InstanceId, MemoryHost, Microtask, PropMap, PropValue,
        run_microtasks,
    };
}

/// Scheduler collaborator: priorities, trait, deterministic run queue.
pub mod sched {
    pub use weft_sched::{
        Scheduler, SchedulerPriority, StepScheduler, Task, TaskContext, TaskHandle, TaskStatus,
        drive, drive_one, run_with_priority,
    };
}

/// Wrap a render function into a reusable component handle.
///
/// The handle's pointer identity is the component's type: build it once
/// and clone the same handle into every description, or each render will
/// look like a brand-new component and remount the subtree.
#[must_use]
pub fn component(
    render: impl Fn(&mut HookCx) -> Result<Node> + 'static,
) -> ComponentFn {
    Rc::new(render)
}

/// A host element description.
#[must_use]
pub fn el(tag: impl Into<String>) -> Element {
    Element::host(tag)
}

/// A text description.
#[must_use]
pub fn text(content: impl Into<String>) -> Node {
    Node::Text(content.into())
}

/// A keyable fragment description grouping `children`.
#[must_use]
pub fn fragment(children: Vec<Node>) -> Element {
    Element::fragment(children)
}
