#![forbid(unsafe_code)]

//! Mutation-phase commit: walk the finished tree's effect flags depth
//! first and apply host mutations in fixed per-fiber order (Placement,
//! then Update, then ChildDeletion), collecting passive effects for the
//! asynchronous flush along the way.
//!
//! Placement locates the correct "insert before" anchor by scanning
//! forward past non-host wrapper fibers for the nearest following host
//! fiber that is not itself being placed; no anchor means append.
//! Deletion collects the deleted subtree's contiguous top-level host
//! descendants, queues component cleanup for the passive flush, removes
//! the host nodes from their host parent, then severs the subtree's links
//! and returns its arena slots.

use weft_host::InstanceId;

use crate::error::{RenderError, Result};
use crate::fiber::{FiberId, FiberKind};
use crate::flags::FiberFlags;
use crate::root::{RootCore, RootLink};

const WALK_MASK: FiberFlags = FiberFlags::MUTATION_MASK.union(FiberFlags::PASSIVE_MASK);

/// Apply every flagged mutation under `finished`, in tree order.
pub(crate) fn commit_mutation_effects(
    core: &mut RootCore,
    link: &RootLink,
    finished: FiberId,
) -> Result<()> {
    let mut next = Some(finished);

    'outer: while let Some(node) = next {
        let (descend, child) = {
            let fiber = core.arena.get(node);
            (fiber.subtree_flags.intersects(WALK_MASK), fiber.child)
        };
        if descend && child.is_some() {
            next = child;
            continue;
        }

        let mut cursor = node;
        loop {
            commit_effects_on_fiber(core, link, cursor)?;
            if let Some(sibling) = core.arena.get(cursor).sibling {
                next = Some(sibling);
                continue 'outer;
            }
            match core.arena.get(cursor).ret {
                Some(ret) => cursor = ret,
                None => break 'outer,
            }
        }
    }
    Ok(())
}

fn commit_effects_on_fiber(core: &mut RootCore, link: &RootLink, fiber: FiberId) -> Result<()> {
    let flags = core.arena.get(fiber).flags;

    if flags.contains(FiberFlags::PLACEMENT) {
        commit_placement(core, link, fiber)?;
        core.arena.get_mut(fiber).flags -= FiberFlags::PLACEMENT;
    }
    if flags.contains(FiberFlags::UPDATE) {
        commit_update(core, link, fiber);
        core.arena.get_mut(fiber).flags -= FiberFlags::UPDATE;
    }
    if flags.contains(FiberFlags::CHILD_DELETION) {
        let deletions = std::mem::take(&mut core.arena.get_mut(fiber).deletions);
        for deleted in deletions {
            commit_deletion(core, link, deleted)?;
        }
        core.arena.get_mut(fiber).flags -= FiberFlags::CHILD_DELETION;
    }
    if flags.contains(FiberFlags::PASSIVE_EFFECT) {
        if let Some(effects) = core.arena.get(fiber).effects.clone() {
            core.pending_passive.update.push(effects);
        }
        core.arena.get_mut(fiber).flags -= FiberFlags::PASSIVE_EFFECT;
    }

    // Descendants are fully processed by the time the walk lands here;
    // clearing keeps "all flags empty after a clean commit" observable.
    core.arena.get_mut(fiber).subtree_flags = FiberFlags::empty();
    Ok(())
}

fn commit_update(core: &mut RootCore, link: &RootLink, fiber: FiberId) {
    let (kind, instance) = {
        let f = core.arena.get(fiber);
        (f.kind, f.instance)
    };
    let Some(instance) = instance else {
        tracing::warn!(fiber = fiber.raw(), "update flagged on an instance-less fiber");
        return;
    };
    match kind {
        FiberKind::HostText => {
            let text = core
                .arena
                .get(fiber)
                .memoized_props
                .text()
                .unwrap_or_default()
                .to_owned();
            link.host.borrow_mut().commit_text_update(instance, &text);
        }
        FiberKind::HostElement => {
            let attrs = core
                .arena
                .get(fiber)
                .memoized_props
                .props()
                .map(|props| props.attrs.clone())
                .unwrap_or_default();
            link.host.borrow_mut().commit_prop_update(instance, &attrs);
        }
        _ => {
            tracing::warn!(fiber = fiber.raw(), ?kind, "update flagged on a non-host fiber");
        }
    }
}

// ─── Placement ───────────────────────────────────────────────────────────────

fn commit_placement(core: &mut RootCore, link: &RootLink, fiber: FiberId) -> Result<()> {
    tracing::debug!(fiber = fiber.raw(), "commit.placement");
    let host_parent = get_host_parent(core, fiber)?;
    let before = get_host_sibling(core, fiber);
    insert_or_append_placement_node(core, link, fiber, host_parent, before);
    Ok(())
}

/// Nearest enclosing host instance (or the root container) that host
/// nodes in this position attach to.
fn get_host_parent(core: &RootCore, fiber: FiberId) -> Result<InstanceId> {
    let mut parent = core.arena.get(fiber).ret;
    while let Some(id) = parent {
        let node = core.arena.get(id);
        match node.kind {
            FiberKind::HostElement => {
                return node
                    .instance
                    .ok_or(RenderError::MissingHostParent { fiber: fiber.raw() });
            }
            FiberKind::HostRoot => return Ok(core.container),
            _ => parent = node.ret,
        }
    }
    Err(RenderError::MissingHostParent { fiber: fiber.raw() })
}

/// The nearest following host instance that is not itself being placed,
/// scanning forward past non-host wrappers. `None` means append.
fn get_host_sibling(core: &RootCore, fiber: FiberId) -> Option<InstanceId> {
    let mut node = fiber;

    'search: loop {
        // Climb while this position has no following sibling.
        while core.arena.get(node).sibling.is_none() {
            let parent = core.arena.get(node).ret?;
            let parent_kind = core.arena.get(parent).kind;
            if matches!(parent_kind, FiberKind::HostElement | FiberKind::HostRoot) {
                return None;
            }
            node = parent;
        }
        node = core
            .arena
            .get(node)
            .sibling
            .expect("sibling checked above");

        // Descend through wrappers to a host node; a wrapper that is being
        // placed (or is empty) cannot anchor, so resume from it.
        while !core.arena.get(node).is_host() {
            let fiber = core.arena.get(node);
            if fiber.flags.contains(FiberFlags::PLACEMENT) {
                continue 'search;
            }
            match fiber.child {
                None => continue 'search,
                Some(child) => node = child,
            }
        }

        if !core.arena.get(node).flags.contains(FiberFlags::PLACEMENT) {
            return core.arena.get(node).instance;
        }
    }
}

/// Insert (or move) the host nodes under `fiber` relative to `before`,
/// descending through non-host wrappers.
fn insert_or_append_placement_node(
    core: &mut RootCore,
    link: &RootLink,
    fiber: FiberId,
    host_parent: InstanceId,
    before: Option<InstanceId>,
) {
    let (is_host, instance, child) = {
        let f = core.arena.get(fiber);
        (f.is_host(), f.instance, f.child)
    };

    if is_host {
        if let Some(instance) = instance {
            match before {
                Some(before) => link
                    .host
                    .borrow_mut()
                    .insert_before(host_parent, instance, before),
                None => link.host.borrow_mut().append_child(host_parent, instance),
            }
        }
        return;
    }

    let mut node = child;
    while let Some(current) = node {
        insert_or_append_placement_node(core, link, current, host_parent, before);
        node = core.arena.get(current).sibling;
    }
}

// ─── Deletion ────────────────────────────────────────────────────────────────

fn commit_deletion(core: &mut RootCore, link: &RootLink, deleted: FiberId) -> Result<()> {
    tracing::debug!(fiber = deleted.raw(), "commit.deletion");

    // One pass over the deleted subtree: collect its contiguous top-level
    // host fibers, queue component cleanup, and remember every slot for
    // release.
    let mut host_roots: Vec<FiberId> = Vec::new();
    let mut subtree: Vec<FiberId> = Vec::new();

    let mut node = deleted;
    'walk: loop {
        subtree.push(node);
        match core.arena.get(node).kind {
            FiberKind::HostElement | FiberKind::HostText => {
                record_host_child_to_delete(core, &mut host_roots, node);
            }
            FiberKind::Component => {
                if let Some(effects) = core.arena.get(node).effects.clone() {
                    core.pending_passive.unmount.push(effects);
                }
            }
            FiberKind::Fragment | FiberKind::ContextProvider => {}
            FiberKind::HostRoot => {
                tracing::warn!("host root inside a deleted subtree");
            }
        }

        if let Some(child) = core.arena.get(node).child {
            node = child;
            continue;
        }
        if node == deleted {
            break;
        }
        // Climb to the next unvisited sibling, stopping at the subtree
        // root; the deleted fiber's own siblings are not part of it.
        loop {
            if let Some(sibling) = core.arena.get(node).sibling {
                node = sibling;
                continue 'walk;
            }
            match core.arena.get(node).ret {
                Some(ret) if ret != deleted => node = ret,
                _ => break 'walk,
            }
        }
    }

    if !host_roots.is_empty() {
        let host_parent = get_host_parent(core, deleted)?;
        for host_fiber in &host_roots {
            if let Some(instance) = core.arena.get(*host_fiber).instance {
                link.host.borrow_mut().remove_child(host_parent, instance);
            }
        }
    }

    // Sever the deleted root's links, then return every slot (and its
    // alternate) to the arena.
    {
        let fiber = core.arena.get_mut(deleted);
        fiber.ret = None;
        fiber.child = None;
    }
    for id in subtree {
        if let Some(alternate) = core.arena.get(id).alternate {
            core.arena.release(alternate);
        }
        core.arena.release(id);
    }
    Ok(())
}

/// Record only top-level host fibers: the first one found, then only
/// fibers that are siblings of the last recorded one (a fragment being
/// deleted can expose several adjacent host roots).
fn record_host_child_to_delete(core: &RootCore, list: &mut Vec<FiberId>, unmounted: FiberId) {
    let Some(&last) = list.last() else {
        list.push(unmounted);
        return;
    };
    let mut node = core.arena.get(last).sibling;
    while let Some(id) = node {
        if id == unmounted {
            list.push(unmounted);
            return;
        }
        node = core.arena.get(id).sibling;
    }
}
