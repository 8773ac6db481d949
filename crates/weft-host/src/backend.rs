#![forbid(unsafe_code)]

//! The host mutation primitives consumed by commit.
//!
//! Instances are opaque to the reconciler: it stores an [`InstanceId`] per
//! host fiber and never inspects what the id points at. The trait is object
//! safe so the reconciler can hold `Rc<RefCell<dyn HostBackend>>` and mix
//! host implementations per root.

use crate::props::PropMap;

/// Opaque handle to a host instance or container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceId(pub(crate) u64);

impl InstanceId {
    /// Mint an id. Host implementations own the numbering scheme; the
    /// reconciler only ever compares and stores ids.
    #[must_use]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// A callback queued on the host's microtask checkpoint.
pub type Microtask = Box<dyn FnOnce()>;

/// Host-renderer collaborator.
///
/// Structural methods mirror the minimal DOM-equivalent operation set:
/// create element/text, append/insert/remove child, patch text/props. The
/// microtask primitive is how the reconciler guarantees synchronous lanes
/// drain before the host's next checkpoint, independent of the general
/// scheduler.
pub trait HostBackend {
    /// Create a detached element instance.
    fn create_instance(&mut self, tag: &str, props: &PropMap) -> InstanceId;

    /// Create a detached text instance.
    fn create_text_instance(&mut self, text: &str) -> InstanceId;

    /// Append `child` as the last child of `parent`. Re-appending an
    /// attached child moves it (DOM semantics).
    fn append_child(&mut self, parent: InstanceId, child: InstanceId);

    /// Insert `child` immediately before `before` under `parent`. Moving an
    /// attached child repositions it.
    fn insert_before(&mut self, parent: InstanceId, child: InstanceId, before: InstanceId);

    /// Detach `child` from `parent`.
    fn remove_child(&mut self, parent: InstanceId, child: InstanceId);

    /// Replace a text instance's content.
    fn commit_text_update(&mut self, instance: InstanceId, text: &str);

    /// Replace an element instance's attribute map.
    fn commit_prop_update(&mut self, instance: InstanceId, props: &PropMap);

    /// Queue `task` to run at the host's next microtask checkpoint.
    fn schedule_microtask(&mut self, task: Microtask);
}
