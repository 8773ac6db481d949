#![forbid(unsafe_code)]

//! Fiber tree and double buffering.
//!
//! A fiber is the persistent record for one tree position. Fibers live in
//! a [`FiberArena`] and link through [`FiberId`] indices: `child` and
//! `sibling` form the owned child list, `ret` is a back-reference that is
//! never owned, and `alternate` pairs a fiber with its work-in-progress
//! buffer. The arena expresses the intentional two-node alternate cycle
//! without reference counting: each logical identity owns at most two
//! slots, and the pair's `alternate` fields point at each other.
//!
//! # Invariants
//!
//! 1. At most one alternate exists per logical identity at any time;
//!    pairing is mutual.
//! 2. The displayed tree is never mutated during a render; all structural
//!    work happens on alternates produced by [`create_work_in_progress`].
//! 3. On alternate reuse, transient fields (pending props, flags, subtree
//!    flags, deletions) are reset to pristine values; type, queues, child,
//!    memoized props/state, and the host instance carry forward.

use weft_host::InstanceId;

use crate::element::{Element, ElementKind, Node, Props};
use crate::flags::FiberFlags;
use crate::hooks::{EffectList, Hook};
use crate::lanes::Lanes;
use crate::update_queue::{SharedQueue, shared_queue};

/// Index of a fiber in its arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FiberId(u32);

impl FiberId {
    #[must_use]
    pub fn raw(self) -> u32 {
        self.0
    }
}

/// Closed classification of tree positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FiberKind {
    HostRoot,
    HostElement,
    HostText,
    Component,
    Fragment,
    ContextProvider,
}

/// Pending or memoized props, shaped by fiber kind.
#[derive(Debug, Clone, Default)]
pub enum FiberProps {
    #[default]
    None,
    /// Host elements, components, providers.
    Element(Props),
    /// Host text content.
    Text(String),
    /// Fragments: the child sequence itself.
    Children(Vec<Node>),
}

impl FiberProps {
    #[must_use]
    pub fn props(&self) -> Option<&Props> {
        match self {
            Self::Element(props) => Some(props),
            _ => None,
        }
    }

    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    #[must_use]
    pub fn children(&self) -> Option<&[Node]> {
        match self {
            Self::Children(children) => Some(children),
            _ => None,
        }
    }
}

/// Root-element state: the committed description plus the skip/preserve
/// bookkeeping its update queue needs across priority-filtered renders.
#[derive(Clone, Debug, Default)]
pub struct RootElementState {
    pub element: Option<Node>,
    pub base_element: Option<Node>,
    pub base_queue: Vec<crate::update_queue::Update<Option<Node>>>,
}

/// Memoized state, shaped by fiber kind.
#[derive(Clone, Debug, Default)]
pub enum FiberState {
    #[default]
    None,
    Root(Box<RootElementState>),
    Hooks(Vec<Hook>),
}

/// The update queue attached to a host-root fiber.
pub type RootQueue = SharedQueue<Option<Node>>;

/// Persistent record for one tree position.
#[derive(Clone)]
pub struct Fiber {
    pub kind: FiberKind,
    pub key: Option<String>,
    /// Element-type handle; `None` for roots and text.
    pub ty: Option<ElementKind>,
    /// Host instance owned exclusively by this fiber once created.
    pub instance: Option<InstanceId>,

    pub child: Option<FiberId>,
    pub sibling: Option<FiberId>,
    /// Back-reference to the parent; never owned.
    pub ret: Option<FiberId>,
    pub index: usize,

    pub pending_props: FiberProps,
    pub memoized_props: FiberProps,
    pub state: FiberState,
    pub alternate: Option<FiberId>,

    pub flags: FiberFlags,
    pub subtree_flags: FiberFlags,
    pub deletions: Vec<FiberId>,
    pub lanes: Lanes,

    /// Host-root fibers only: the queue `render` feeds.
    pub root_queue: Option<RootQueue>,
    /// Component fibers only: effects collected by the last render.
    pub effects: Option<EffectList>,
}

impl Fiber {
    #[must_use]
    pub fn new(kind: FiberKind, pending_props: FiberProps, key: Option<String>) -> Self {
        Self {
            kind,
            key,
            ty: None,
            instance: None,
            child: None,
            sibling: None,
            ret: None,
            index: 0,
            pending_props,
            memoized_props: FiberProps::None,
            state: FiberState::None,
            alternate: None,
            flags: FiberFlags::empty(),
            subtree_flags: FiberFlags::empty(),
            deletions: Vec::new(),
            lanes: Lanes::empty(),
            root_queue: None,
            effects: None,
        }
    }

    /// A fresh host-root fiber with an empty queue and empty root state.
    #[must_use]
    pub fn new_host_root() -> Self {
        let mut fiber = Self::new(FiberKind::HostRoot, FiberProps::None, None);
        fiber.root_queue = Some(shared_queue());
        fiber.state = FiberState::Root(Box::default());
        fiber
    }

    #[must_use]
    pub fn is_host(&self) -> bool {
        matches!(self.kind, FiberKind::HostElement | FiberKind::HostText)
    }
}

/// Slab of fibers with a free list.
#[derive(Default)]
pub struct FiberArena {
    slots: Vec<Option<Fiber>>,
    free: Vec<u32>,
}

impl FiberArena {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, fiber: Fiber) -> FiberId {
        if let Some(index) = self.free.pop() {
            self.slots[index as usize] = Some(fiber);
            FiberId(index)
        } else {
            self.slots.push(Some(fiber));
            FiberId((self.slots.len() - 1) as u32)
        }
    }

    /// Return a slot to the free list. Releasing an already-vacant slot is
    /// a no-op.
    pub fn release(&mut self, id: FiberId) {
        if self.slots[id.0 as usize].take().is_some() {
            self.free.push(id.0);
        }
    }

    #[must_use]
    pub fn get(&self, id: FiberId) -> &Fiber {
        self.slots[id.0 as usize]
            .as_ref()
            .expect("fiber slot is occupied")
    }

    #[must_use]
    pub fn get_mut(&mut self, id: FiberId) -> &mut Fiber {
        self.slots[id.0 as usize]
            .as_mut()
            .expect("fiber slot is occupied")
    }

    /// Number of live fibers. Test surface for leak checks.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }
}

/// Allocate or reuse the alternate of `current` and prime it as the
/// mutable work-in-progress buffer.
///
/// The result is always safe to mutate without touching the displayed
/// tree; this is what makes interruption and restart safe.
pub fn create_work_in_progress(
    arena: &mut FiberArena,
    current: FiberId,
    pending_props: FiberProps,
) -> FiberId {
    let wip = match arena.get(current).alternate {
        None => {
            let (kind, key, instance) = {
                let cur = arena.get(current);
                (cur.kind, cur.key.clone(), cur.instance)
            };
            let mut fresh = Fiber::new(kind, pending_props, key);
            fresh.instance = instance;
            fresh.alternate = Some(current);
            let wip = arena.alloc(fresh);
            arena.get_mut(current).alternate = Some(wip);
            wip
        }
        Some(wip) => {
            let fiber = arena.get_mut(wip);
            fiber.pending_props = pending_props;
            fiber.flags = FiberFlags::empty();
            fiber.subtree_flags = FiberFlags::empty();
            fiber.deletions.clear();
            wip
        }
    };

    let (ty, root_queue, effects, child, memoized_props, state, instance, lanes) = {
        let cur = arena.get(current);
        (
            cur.ty.clone(),
            cur.root_queue.clone(),
            cur.effects.clone(),
            cur.child,
            cur.memoized_props.clone(),
            cur.state.clone(),
            cur.instance,
            cur.lanes,
        )
    };
    let fiber = arena.get_mut(wip);
    fiber.ty = ty;
    fiber.root_queue = root_queue;
    fiber.effects = effects;
    fiber.child = child;
    fiber.memoized_props = memoized_props;
    fiber.state = state;
    fiber.instance = instance;
    fiber.lanes = lanes;
    wip
}

/// Classify a description into the right fiber kind and stamp the active
/// lane.
pub fn fiber_from_element(arena: &mut FiberArena, element: &Element, lanes: Lanes) -> FiberId {
    if matches!(element.kind, ElementKind::Fragment) {
        return fiber_from_fragment(
            arena,
            element.props.children.clone(),
            lanes,
            element.key.clone(),
        );
    }

    let kind = match element.kind {
        ElementKind::Host(_) => FiberKind::HostElement,
        ElementKind::Component(_) => FiberKind::Component,
        ElementKind::Provider(_) => FiberKind::ContextProvider,
        ElementKind::Fragment => unreachable!("fragments classified above"),
    };
    let mut fiber = Fiber::new(
        kind,
        FiberProps::Element(element.props.clone()),
        element.key.clone(),
    );
    fiber.ty = Some(element.kind.clone());
    fiber.lanes = lanes;
    arena.alloc(fiber)
}

pub fn fiber_from_fragment(
    arena: &mut FiberArena,
    children: Vec<Node>,
    lanes: Lanes,
    key: Option<String>,
) -> FiberId {
    let mut fiber = Fiber::new(FiberKind::Fragment, FiberProps::Children(children), key);
    fiber.ty = Some(ElementKind::Fragment);
    fiber.lanes = lanes;
    arena.alloc(fiber)
}

pub fn fiber_from_text(arena: &mut FiberArena, text: &str) -> FiberId {
    arena.alloc(Fiber::new(
        FiberKind::HostText,
        FiberProps::Text(text.to_owned()),
        None,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_host::PropValue;

    #[test]
    fn first_work_in_progress_allocates_and_pairs() {
        let mut arena = FiberArena::new();
        let current = arena.alloc(Fiber::new_host_root());

        let wip = create_work_in_progress(&mut arena, current, FiberProps::None);
        assert_ne!(wip, current);
        assert_eq!(arena.get(current).alternate, Some(wip));
        assert_eq!(arena.get(wip).alternate, Some(current));
    }

    #[test]
    fn second_work_in_progress_reuses_the_same_slot() {
        let mut arena = FiberArena::new();
        let current = arena.alloc(Fiber::new_host_root());

        let first = create_work_in_progress(&mut arena, current, FiberProps::None);
        let second = create_work_in_progress(&mut arena, current, FiberProps::None);
        assert_eq!(first, second);
        assert_eq!(arena.live_count(), 2);
    }

    #[test]
    fn reuse_resets_transient_fields() {
        let mut arena = FiberArena::new();
        let current = arena.alloc(Fiber::new_host_root());
        let wip = create_work_in_progress(&mut arena, current, FiberProps::None);

        {
            let fiber = arena.get_mut(wip);
            fiber.flags = FiberFlags::PLACEMENT;
            fiber.subtree_flags = FiberFlags::UPDATE;
            fiber.deletions.push(current);
        }

        let again = create_work_in_progress(&mut arena, current, FiberProps::None);
        assert_eq!(again, wip);
        let fiber = arena.get(again);
        assert!(fiber.flags.is_empty());
        assert!(fiber.subtree_flags.is_empty());
        assert!(fiber.deletions.is_empty());
    }

    #[test]
    fn work_in_progress_copies_state_and_instance_forward() {
        let mut arena = FiberArena::new();
        let el = Element::host("div").with_attr("id", "a");
        let current = fiber_from_element(&mut arena, &el, Lanes::SYNC);
        {
            let fiber = arena.get_mut(current);
            fiber.instance = Some(weft_host::InstanceId::from_raw(7));
            fiber.memoized_props = fiber.pending_props.clone();
        }

        let wip = create_work_in_progress(
            &mut arena,
            current,
            FiberProps::Element(el.props.clone()),
        );
        let fiber = arena.get(wip);
        assert_eq!(fiber.instance, arena.get(current).instance);
        assert_eq!(
            fiber.memoized_props.props().unwrap().attrs.get("id"),
            Some(&PropValue::Str("a".into()))
        );
    }

    #[test]
    fn classification_matches_element_kind() {
        let mut arena = FiberArena::new();

        let host = fiber_from_element(&mut arena, &Element::host("p"), Lanes::DEFAULT);
        assert_eq!(arena.get(host).kind, FiberKind::HostElement);
        assert_eq!(arena.get(host).lanes, Lanes::DEFAULT);

        let frag = fiber_from_element(
            &mut arena,
            &Element::fragment(vec![Node::Text("x".into())]),
            Lanes::DEFAULT,
        );
        assert_eq!(arena.get(frag).kind, FiberKind::Fragment);
        assert_eq!(arena.get(frag).pending_props.children().unwrap().len(), 1);

        let text = fiber_from_text(&mut arena, "hi");
        assert_eq!(arena.get(text).kind, FiberKind::HostText);
        assert_eq!(arena.get(text).pending_props.text(), Some("hi"));
    }

    #[test]
    fn release_recycles_slots() {
        let mut arena = FiberArena::new();
        let a = arena.alloc(Fiber::new(FiberKind::Fragment, FiberProps::None, None));
        arena.release(a);
        assert_eq!(arena.live_count(), 0);
        // Double release is inert.
        arena.release(a);
        assert_eq!(arena.live_count(), 0);

        let b = arena.alloc(Fiber::new(FiberKind::Fragment, FiberProps::None, None));
        assert_eq!(a, b);
        assert_eq!(arena.live_count(), 1);
    }
}
