#![forbid(unsafe_code)]

//! The render-phase state machine.
//!
//! Traversal is an explicit depth-first pre-order descent with post-order
//! completion on the way back up: a non-recursive walk whose single
//! cursor lives on the root, which is what allows suspension *between*
//! any two fibers. Two driving loops share it: the sync variant runs to
//! exhaustion (most urgent lane, never interrupted), the concurrent
//! variant checks the scheduler's should-yield signal between units.
//!
//! The cursor survives yields so a resumed pass continues where it
//! stopped; a change of the active lane before resumption invalidates the
//! partial tree entirely, because it was built against a specific lane
//! filter and cannot be half-merged with a different one. An error during
//! a unit of work discards the cursor; the pass aborts rather than
//! attempting partial recovery, and no partial tree is ever committed.

use weft_sched::{SchedulerPriority, TaskStatus};

use crate::begin_work::begin_work;
use crate::commit::commit_mutation_effects;
use crate::complete_work::complete_work;
use crate::error::{RenderError, Result};
use crate::fiber::{FiberId, FiberProps, create_work_in_progress};
use crate::flags::FiberFlags;
use crate::lanes::Lanes;
use crate::root::{RootCore, RootLink, ensure_root_is_scheduled, flush_passive_effects};

/// How a render pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RootExitStatus {
    /// The concurrent loop yielded with work remaining.
    InProgress,
    /// The whole tree completed.
    Completed,
}

/// Discard any partial tree and point the cursor at a fresh
/// work-in-progress root for `lane`.
pub(crate) fn prepare_fresh_stack(core: &mut RootCore, lane: Lanes) {
    let wip = create_work_in_progress(&mut core.arena, core.current_root, FiberProps::None);
    core.wip = Some(wip);
    core.wip_render_lane = lane;
    core.context_stacks.clear();
}

/// Drive the render phase for `lane`, time-sliced or to exhaustion.
pub(crate) fn render_root(
    core: &mut RootCore,
    link: &RootLink,
    lane: Lanes,
    should_time_slice: bool,
) -> Result<RootExitStatus> {
    if core.wip_render_lane != lane {
        // Either a fresh pass or a lane change mid-flight; both start over.
        prepare_fresh_stack(core, lane);
    }
    tracing::debug!(
        lane = lane.bits(),
        time_sliced = should_time_slice,
        "render_root"
    );

    let driven = if should_time_slice {
        work_loop_concurrent(core, link)
    } else {
        work_loop_sync(core, link)
    };
    if let Err(err) = driven {
        tracing::error!(error = %err, "render pass aborted; cursor discarded");
        core.wip = None;
        core.wip_render_lane = Lanes::empty();
        return Err(err);
    }

    if should_time_slice && core.wip.is_some() {
        return Ok(RootExitStatus::InProgress);
    }
    debug_assert!(
        core.wip.is_none(),
        "render cursor must be empty after completion"
    );
    Ok(RootExitStatus::Completed)
}

fn work_loop_sync(core: &mut RootCore, link: &RootLink) -> Result<()> {
    while let Some(fiber) = core.wip {
        perform_unit_of_work(core, link, fiber)?;
    }
    Ok(())
}

fn work_loop_concurrent(core: &mut RootCore, link: &RootLink) -> Result<()> {
    while let Some(fiber) = core.wip {
        if link.scheduler.borrow().should_yield() {
            tracing::trace!(fiber = fiber.raw(), "work_loop yields");
            break;
        }
        perform_unit_of_work(core, link, fiber)?;
    }
    Ok(())
}

fn perform_unit_of_work(core: &mut RootCore, link: &RootLink, fiber: FiberId) -> Result<()> {
    let next = begin_work(core, link, fiber, core.wip_render_lane)?;
    {
        let f = core.arena.get_mut(fiber);
        f.memoized_props = f.pending_props.clone();
    }
    match next {
        Some(child) => core.wip = Some(child),
        None => complete_unit_of_work(core, link, fiber),
    }
    Ok(())
}

fn complete_unit_of_work(core: &mut RootCore, link: &RootLink, fiber: FiberId) {
    let mut node = Some(fiber);
    while let Some(current) = node {
        complete_work(core, link, current);
        if let Some(sibling) = core.arena.get(current).sibling {
            core.wip = Some(sibling);
            return;
        }
        node = core.arena.get(current).ret;
        core.wip = node;
    }
}

/// Swap the finished tree in and apply its effects.
///
/// Precondition: a finished tree exists and was produced by a real lane;
/// committing with the empty sentinel is fatal. The committed lane leaves
/// the root's pending mask, the passive flush is scheduled (deduplicated
/// by the root-level guard) when any passive flag exists, and the mutation
/// walk runs only when some fiber carries a mutation or passive flag.
pub(crate) fn commit_root(core: &mut RootCore, link: &RootLink) -> Result<()> {
    let Some(finished) = core.finished_work.take() else {
        return Ok(());
    };
    let lane = core.finished_lane;
    core.finished_lane = Lanes::empty();
    if lane.is_empty() {
        return Err(RenderError::CommitWithoutLane);
    }
    tracing::debug!(lane = lane.bits(), "commit_root");

    link.shared.borrow_mut().pending_lanes.remove(lane);

    let (root_flags, subtree_flags) = {
        let fiber = core.arena.get(finished);
        (fiber.flags, fiber.subtree_flags)
    };
    let all_flags = root_flags | subtree_flags;

    if all_flags.intersects(FiberFlags::PASSIVE_MASK) && !core.passive_flush_scheduled {
        core.passive_flush_scheduled = true;
        let flush_link = link.clone();
        link.scheduler.borrow_mut().schedule(
            SchedulerPriority::Normal,
            Box::new(move |_ctx| {
                flush_passive_effects(&flush_link);
                TaskStatus::Finished
            }),
        );
    }

    // The swap is the commit point: `current` now names the new tree.
    core.current_root = finished;
    if all_flags.intersects(FiberFlags::MUTATION_MASK.union(FiberFlags::PASSIVE_MASK)) {
        commit_mutation_effects(core, link, finished)?;
    }

    ensure_root_is_scheduled(link);
    Ok(())
}
