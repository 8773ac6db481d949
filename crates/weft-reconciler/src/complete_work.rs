#![forbid(unsafe_code)]

//! Render-phase completion: runs bottom-up as the traversal returns.
//!
//! Host fibers either diff-and-flag prop/text changes against their
//! alternate or, on first creation, synthesize the host instance and
//! attach already-completed descendant host instances to it (the whole
//! subtree assembles detached and is connected by a single placement at
//! commit). Providers pop their context stack on the way up. Every kind
//! OR-bubbles child flags into `subtree_flags` so commit can skip
//! effect-free subtrees in O(1).

use weft_host::InstanceId;

use crate::element::ElementKind;
use crate::fiber::{FiberId, FiberKind};
use crate::flags::FiberFlags;
use crate::root::{RootCore, RootLink};

pub(crate) fn complete_work(core: &mut RootCore, link: &RootLink, wip: FiberId) {
    let kind = core.arena.get(wip).kind;
    tracing::trace!(fiber = wip.raw(), ?kind, "complete_work");

    match kind {
        FiberKind::HostElement => {
            let (alternate, instance) = {
                let fiber = core.arena.get(wip);
                (fiber.alternate, fiber.instance)
            };
            if let (Some(current), Some(_)) = (alternate, instance) {
                // Update path: flag a prop patch only when the attribute
                // map actually changed.
                let changed = {
                    let old = core.arena.get(current).memoized_props.props();
                    let new = core.arena.get(wip).pending_props.props();
                    match (old, new) {
                        (Some(old), Some(new)) => old.attrs != new.attrs,
                        _ => true,
                    }
                };
                if changed {
                    core.arena.get_mut(wip).flags |= FiberFlags::UPDATE;
                }
            } else {
                let created = {
                    let fiber = core.arena.get(wip);
                    let Some(ElementKind::Host(tag)) = &fiber.ty else {
                        unreachable!("host fiber carries a host type");
                    };
                    let attrs = fiber
                        .pending_props
                        .props()
                        .map(|props| props.attrs.clone())
                        .unwrap_or_default();
                    link.host.borrow_mut().create_instance(tag, &attrs)
                };
                core.arena.get_mut(wip).instance = Some(created);
                append_all_children(core, link, created, wip);
            }
            bubble_properties(core, wip);
        }
        FiberKind::HostText => {
            let (alternate, instance) = {
                let fiber = core.arena.get(wip);
                (fiber.alternate, fiber.instance)
            };
            if let (Some(current), Some(_)) = (alternate, instance) {
                let changed = {
                    let old = core.arena.get(current).memoized_props.text();
                    let new = core.arena.get(wip).pending_props.text();
                    old != new
                };
                if changed {
                    core.arena.get_mut(wip).flags |= FiberFlags::UPDATE;
                }
            } else {
                let created = {
                    let text = core.arena.get(wip).pending_props.text().unwrap_or_default();
                    link.host.borrow_mut().create_text_instance(text)
                };
                core.arena.get_mut(wip).instance = Some(created);
            }
            bubble_properties(core, wip);
        }
        FiberKind::HostRoot | FiberKind::Component | FiberKind::Fragment => {
            bubble_properties(core, wip);
        }
        FiberKind::ContextProvider => {
            if let Some(ElementKind::Provider(context_id)) = core.arena.get(wip).ty.clone() {
                core.pop_provider(context_id);
            }
            bubble_properties(core, wip);
        }
    }
}

/// Attach every completed host descendant to a freshly created instance,
/// skipping over non-host wrappers (components, fragments, providers).
fn append_all_children(core: &mut RootCore, link: &RootLink, parent: InstanceId, wip: FiberId) {
    let mut node = core.arena.get(wip).child;

    while let Some(current) = node {
        let (is_host, instance, child) = {
            let fiber = core.arena.get(current);
            (fiber.is_host(), fiber.instance, fiber.child)
        };

        if is_host {
            if let Some(instance) = instance {
                link.host.borrow_mut().append_child(parent, instance);
            }
        } else if let Some(child) = child {
            core.arena.get_mut(child).ret = Some(current);
            node = Some(child);
            continue;
        }

        // Climb until a sibling exists or we are back at the subtree root.
        let mut cursor = current;
        loop {
            if cursor == wip {
                return;
            }
            if let Some(sibling) = core.arena.get(cursor).sibling {
                let ret = core.arena.get(cursor).ret;
                core.arena.get_mut(sibling).ret = ret;
                node = Some(sibling);
                break;
            }
            match core.arena.get(cursor).ret {
                Some(ret) => cursor = ret,
                None => return,
            }
        }
    }
}

/// OR child flags and subtree flags into the parent, re-anchoring child
/// back-references while walking the list.
fn bubble_properties(core: &mut RootCore, wip: FiberId) {
    let mut subtree = FiberFlags::empty();
    let mut child = core.arena.get(wip).child;
    while let Some(current) = child {
        let sibling = {
            let fiber = core.arena.get(current);
            subtree |= fiber.subtree_flags | fiber.flags;
            fiber.sibling
        };
        core.arena.get_mut(current).ret = Some(wip);
        child = sibling;
    }
    core.arena.get_mut(wip).subtree_flags |= subtree;
}
