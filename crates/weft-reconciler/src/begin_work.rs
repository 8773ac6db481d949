#![forbid(unsafe_code)]

//! Render-phase descent: derive each fiber's next child description and
//! feed it to the child reconciler.
//!
//! Dispatch is exhaustive over [`FiberKind`]: root fibers drain their
//! lane-filtered update queue, components render under a hook session,
//! host elements and fragments pass their children straight through, and
//! providers push a context value read by descendants (popped on the way
//! back up in complete). Text fibers are leaves.

use crate::child_reconciler::{ChildInput, ChildReconciler};
use crate::element::{ElementKind, Node};
use crate::error::Result;
use crate::fiber::{FiberId, FiberKind, FiberState, RootElementState};
use crate::hooks::render_with_hooks;
use crate::lanes::Lanes;
use crate::root::{RootCore, RootLink};
use crate::update_queue::process_update_queue;

/// Begin one unit of work. Returns the first child to descend into, or
/// `None` for leaves.
pub(crate) fn begin_work(
    core: &mut RootCore,
    link: &RootLink,
    wip: FiberId,
    render_lanes: Lanes,
) -> Result<Option<FiberId>> {
    let kind = core.arena.get(wip).kind;
    tracing::trace!(fiber = wip.raw(), ?kind, "begin_work");

    match kind {
        FiberKind::HostRoot => update_host_root(core, link, wip, render_lanes),
        FiberKind::HostElement => update_host_element(core, wip, render_lanes),
        FiberKind::HostText => Ok(None),
        FiberKind::Component => update_component(core, link, wip, render_lanes),
        FiberKind::Fragment => update_fragment(core, wip, render_lanes),
        FiberKind::ContextProvider => update_context_provider(core, wip, render_lanes),
    }
}

fn update_host_root(
    core: &mut RootCore,
    _link: &RootLink,
    wip: FiberId,
    render_lanes: Lanes,
) -> Result<Option<FiberId>> {
    let (queue, alternate) = {
        let fiber = core.arena.get(wip);
        (
            fiber
                .root_queue
                .clone()
                .expect("host root carries an update queue"),
            fiber.alternate,
        )
    };
    let rec = match &core.arena.get(wip).state {
        FiberState::Root(rec) => (**rec).clone(),
        _ => RootElementState::default(),
    };

    let mut merged = rec.base_queue.clone();
    let mut pending = queue.borrow_mut().take_pending();
    if !pending.is_empty() {
        merged.append(&mut pending);
        // Persist the merged queue on the displayed fiber so an abandoned
        // work-in-progress cannot lose drained updates.
        if let Some(current) = alternate {
            if let FiberState::Root(cur_rec) = &mut core.arena.get_mut(current).state {
                cur_rec.base_queue = merged.clone();
            }
        }
    }

    let processed = process_update_queue(rec.base_element.clone(), &merged, render_lanes);
    let next_element = processed.memoized_state.clone();
    core.arena.get_mut(wip).state = FiberState::Root(Box::new(RootElementState {
        element: processed.memoized_state,
        base_element: processed.base_state,
        base_queue: processed.base_queue,
    }));

    let input = match &next_element {
        Some(node) => ChildInput::One(node),
        None => ChildInput::None,
    };
    Ok(reconcile_children(core, wip, input, render_lanes))
}

fn update_host_element(
    core: &mut RootCore,
    wip: FiberId,
    render_lanes: Lanes,
) -> Result<Option<FiberId>> {
    let children = core
        .arena
        .get(wip)
        .pending_props
        .props()
        .map(|props| props.children.clone())
        .unwrap_or_default();
    let input = ChildInput::from_children(&children);
    Ok(reconcile_children(core, wip, input, render_lanes))
}

fn update_component(
    core: &mut RootCore,
    link: &RootLink,
    wip: FiberId,
    render_lanes: Lanes,
) -> Result<Option<FiberId>> {
    let children: Node = render_with_hooks(core, link, wip, render_lanes)?;
    Ok(reconcile_children(
        core,
        wip,
        ChildInput::One(&children),
        render_lanes,
    ))
}

fn update_fragment(
    core: &mut RootCore,
    wip: FiberId,
    render_lanes: Lanes,
) -> Result<Option<FiberId>> {
    let children = core
        .arena
        .get(wip)
        .pending_props
        .children()
        .map(<[Node]>::to_vec)
        .unwrap_or_default();
    let input = ChildInput::from_children(&children);
    Ok(reconcile_children(core, wip, input, render_lanes))
}

fn update_context_provider(
    core: &mut RootCore,
    wip: FiberId,
    render_lanes: Lanes,
) -> Result<Option<FiberId>> {
    let props = core
        .arena
        .get(wip)
        .pending_props
        .props()
        .cloned()
        .unwrap_or_default();
    let Some(ElementKind::Provider(context_id)) = core.arena.get(wip).ty.clone() else {
        unreachable!("provider fiber carries a provider type");
    };

    if props.context_value.is_none() {
        tracing::warn!(
            context = context_id.raw(),
            "context provider rendered without a value; descendants fall back to the default"
        );
    }
    core.push_provider(context_id, props.context_value.clone());

    let input = ChildInput::from_children(&props.children);
    Ok(reconcile_children(core, wip, input, render_lanes))
}

fn reconcile_children(
    core: &mut RootCore,
    wip: FiberId,
    input: ChildInput<'_>,
    render_lanes: Lanes,
) -> Option<FiberId> {
    let current = core.arena.get(wip).alternate;
    let first = match current {
        Some(current) => {
            let current_first = core.arena.get(current).child;
            ChildReconciler::new(true).reconcile(
                &mut core.arena,
                wip,
                current_first,
                input,
                render_lanes,
            )
        }
        None => {
            ChildReconciler::new(false).reconcile(&mut core.arena, wip, None, input, render_lanes)
        }
    };
    core.arena.get_mut(wip).child = first;
    first
}
