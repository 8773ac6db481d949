#![forbid(unsafe_code)]

//! Root handles and scheduling.
//!
//! Per-root state is split in two so enqueueing never aliases rendering:
//!
//! - [`RootCore`]: the fiber arena and every render-phase cursor
//!   (work-in-progress pointer, active lane, provider stacks, pending
//!   passive effects). Borrowed mutably only by the work/commit pipeline;
//!   the `RefCell` borrow *is* the re-entrancy guard, surfaced as
//!   [`RenderError::Reentrant`] instead of a panic at every entry point.
//! - [`RootShared`]: the pending-lanes bitmask, scheduler callback
//!   bookkeeping, the microtask-flushed synchronous callback queue, and
//!   the transition flag. Dispatchers and `ensure_root_is_scheduled`
//!   touch only this, so state updates enqueued mid-render (from
//!   component code or effects) are always safe.
//!
//! [`ensure_root_is_scheduled`] is the single scheduling decision point:
//! nothing pending cancels and clears; the sync lane goes on the
//! microtask-flushed sync queue; anything else maps to a scheduler
//! priority and replaces (never stacks on) a differently-prioritized
//! callback. Same priority keeps the existing callback, which is what
//! batches a burst of same-lane updates into one render.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use ahash::AHashMap;

use weft_host::{HostBackend, InstanceId};
use weft_sched::{Scheduler, TaskStatus, run_with_priority};

use crate::element::{ContextId, ContextValue, Node};
use crate::error::RenderError;
use crate::fiber::{Fiber, FiberArena, FiberId};
use crate::flags::EffectTag;
use crate::hooks::{EffectCleanup, EffectList};
use crate::lanes::{Lanes, request_update_lane as lane_for};
use crate::update_queue::{Update, UpdateAction};
use crate::work_loop::{RootExitStatus, commit_root, render_root};

/// Deferred passive effects, queued by commit and drained by the flush.
#[derive(Default)]
pub(crate) struct PendingPassiveEffects {
    pub unmount: Vec<EffectList>,
    pub update: Vec<EffectList>,
}

/// Render-phase state for one root. One logical writer at any time.
pub(crate) struct RootCore {
    pub arena: FiberArena,
    /// The currently displayed tree's root fiber.
    pub current_root: FiberId,
    /// The host container the tree mounts into.
    pub container: InstanceId,
    /// A completed alternate waiting for commit, and its lane.
    pub finished_work: Option<FiberId>,
    pub finished_lane: Lanes,
    /// Render cursor; survives yields, discarded on lane change or error.
    pub wip: Option<FiberId>,
    pub wip_render_lane: Lanes,
    pub pending_passive: PendingPassiveEffects,
    /// Root-level guard: at most one passive flush pending.
    pub passive_flush_scheduled: bool,
    /// Provider value stacks, live only during a render pass. An entry of
    /// `None` marks a provider that rendered without a value.
    pub context_stacks: AHashMap<ContextId, Vec<Option<ContextValue>>>,
}

impl RootCore {
    pub(crate) fn push_provider(&mut self, id: ContextId, value: Option<ContextValue>) {
        self.context_stacks.entry(id).or_default().push(value);
    }

    pub(crate) fn pop_provider(&mut self, id: ContextId) {
        let popped = self.context_stacks.get_mut(&id).and_then(Vec::pop);
        debug_assert!(popped.is_some(), "provider stack underflow");
    }

    /// Innermost value per context, for snapshotting into a hook session.
    pub(crate) fn context_tops(&self) -> AHashMap<ContextId, ContextValue> {
        self.context_stacks
            .iter()
            .filter_map(|(id, stack)| {
                stack
                    .last()
                    .and_then(|top| top.clone())
                    .map(|value| (*id, value))
            })
            .collect()
    }
}

/// Scheduling-facing state for one root; never touched by the render walk
/// itself except through explicit, transient borrows.
pub(crate) struct RootShared {
    pub pending_lanes: Lanes,
    /// Outstanding external callback and the lane priority it was made for.
    pub callback_node: Option<weft_sched::TaskHandle>,
    pub callback_priority: Lanes,
    /// Synchronous callbacks drained at the next microtask checkpoint.
    pub sync_queue: Vec<Box<dyn FnOnce()>>,
    pub flushing_sync: bool,
    /// Non-zero inside a transition scope.
    pub transition: u32,
}

impl Default for RootShared {
    fn default() -> Self {
        Self {
            pending_lanes: Lanes::empty(),
            callback_node: None,
            callback_priority: Lanes::empty(),
            sync_queue: Vec::new(),
            flushing_sync: false,
            transition: 0,
        }
    }
}

/// Cheap-clone bundle of everything a render session reaches through.
#[derive(Clone)]
pub(crate) struct RootLink {
    pub core: Rc<RefCell<RootCore>>,
    pub shared: Rc<RefCell<RootShared>>,
    pub host: Rc<RefCell<dyn HostBackend>>,
    pub scheduler: Rc<RefCell<dyn Scheduler>>,
}

impl RootLink {
    pub(crate) fn downgrade(&self) -> WeakLink {
        WeakLink {
            core: Rc::downgrade(&self.core),
            shared: Rc::downgrade(&self.shared),
            host: Rc::downgrade(&self.host),
            scheduler: Rc::downgrade(&self.scheduler),
        }
    }
}

/// Weak form held by dispatchers and transition starters; those handles
/// escape into user code and must not keep the root alive.
#[derive(Clone)]
pub(crate) struct WeakLink {
    core: Weak<RefCell<RootCore>>,
    shared: Weak<RefCell<RootShared>>,
    host: Weak<RefCell<dyn HostBackend>>,
    scheduler: Weak<RefCell<dyn Scheduler>>,
}

impl WeakLink {
    pub(crate) fn upgrade(&self) -> Option<RootLink> {
        Some(RootLink {
            core: self.core.upgrade()?,
            shared: self.shared.upgrade()?,
            host: self.host.upgrade()?,
            scheduler: self.scheduler.upgrade()?,
        })
    }

    #[cfg(test)]
    pub(crate) fn dead() -> Self {
        let host: Rc<RefCell<dyn HostBackend>> =
            Rc::new(RefCell::new(weft_host::MemoryHost::new()));
        let scheduler: Rc<RefCell<dyn Scheduler>> =
            Rc::new(RefCell::new(weft_sched::StepScheduler::new()));
        Self {
            core: Weak::new(),
            shared: Weak::new(),
            host: Rc::downgrade(&host),
            scheduler: Rc::downgrade(&scheduler),
        }
    }
}

/// Lane for a freshly enqueued update, from the ambient transition flag
/// and scheduler priority.
pub(crate) fn request_update_lane(link: &RootLink) -> Lanes {
    let in_transition = link.shared.borrow().transition > 0;
    let ambient = link.scheduler.borrow().current_priority();
    lane_for(in_transition, ambient)
}

/// Merge `lane` into the root's pending mask and (re)schedule.
pub(crate) fn schedule_update_on_root(link: &RootLink, lane: Lanes) {
    {
        let mut shared = link.shared.borrow_mut();
        shared.pending_lanes = shared.pending_lanes.merge(lane);
    }
    ensure_root_is_scheduled(link);
}

/// The single scheduling decision point. See the module docs.
pub(crate) fn ensure_root_is_scheduled(link: &RootLink) {
    let lane = link.shared.borrow().pending_lanes.highest_priority();

    if lane.is_empty() {
        let stale = {
            let mut shared = link.shared.borrow_mut();
            shared.callback_priority = Lanes::empty();
            shared.callback_node.take()
        };
        if let Some(handle) = stale {
            link.scheduler.borrow_mut().cancel(handle);
        }
        return;
    }

    if lane == link.shared.borrow().callback_priority {
        // Same priority: the existing callback (or queued sync flush)
        // already covers this work.
        return;
    }

    let replaced = link.shared.borrow_mut().callback_node.take();
    if let Some(handle) = replaced {
        link.scheduler.borrow_mut().cancel(handle);
    }

    if lane == Lanes::SYNC {
        tracing::debug!("schedule: sync lane on microtask queue");
        let work_link = link.clone();
        link.shared
            .borrow_mut()
            .sync_queue
            .push(Box::new(move || perform_sync_work_on_root(&work_link)));
        let flush_link = link.clone();
        link.host
            .borrow_mut()
            .schedule_microtask(Box::new(move || flush_sync_callbacks(&flush_link)));
        let mut shared = link.shared.borrow_mut();
        shared.callback_node = None;
        shared.callback_priority = Lanes::SYNC;
    } else {
        let priority = lane.to_scheduler_priority();
        tracing::debug!(?priority, "schedule: concurrent callback");
        let work_link = link.clone();
        let handle = link.scheduler.borrow_mut().schedule(
            priority,
            Box::new(move |ctx| perform_concurrent_work_on_root(&work_link, ctx)),
        );
        let mut shared = link.shared.borrow_mut();
        shared.callback_node = Some(handle);
        shared.callback_priority = lane;
    }
}

/// Drain the synchronous callback queue, including callbacks enqueued
/// while draining. Guarded against re-entry.
pub(crate) fn flush_sync_callbacks(link: &RootLink) {
    {
        let mut shared = link.shared.borrow_mut();
        if shared.flushing_sync {
            return;
        }
        shared.flushing_sync = true;
    }
    loop {
        let batch = std::mem::take(&mut link.shared.borrow_mut().sync_queue);
        if batch.is_empty() {
            break;
        }
        for callback in batch {
            callback();
        }
    }
    link.shared.borrow_mut().flushing_sync = false;
}

fn perform_sync_work_on_root(link: &RootLink) {
    let lane = link.shared.borrow().pending_lanes.highest_priority();
    if lane != Lanes::SYNC {
        // A cancellation or an earlier flush already consumed the sync
        // work; fall back to regular scheduling.
        ensure_root_is_scheduled(link);
        return;
    }

    let Ok(mut core) = link.core.try_borrow_mut() else {
        tracing::error!(error = %RenderError::Reentrant, "sync work rejected");
        return;
    };

    match render_root(&mut core, link, Lanes::SYNC, false) {
        Ok(RootExitStatus::Completed) => {
            let finished = core
                .arena
                .get(core.current_root)
                .alternate
                .expect("a completed render leaves a finished alternate");
            core.finished_work = Some(finished);
            core.finished_lane = Lanes::SYNC;
            core.wip_render_lane = Lanes::empty();
            if let Err(err) = commit_root(&mut core, link) {
                tracing::error!(error = %err, "commit aborted");
            }
        }
        Ok(RootExitStatus::InProgress) => {
            tracing::error!("sync render must run to completion");
        }
        Err(_) => {
            // render_root already logged and reset the cursor. Clear the
            // priority record so the next update can re-schedule.
            link.shared.borrow_mut().callback_priority = Lanes::empty();
        }
    }
}

fn perform_concurrent_work_on_root(
    link: &RootLink,
    ctx: weft_sched::TaskContext,
) -> TaskStatus {
    // Stale continuation: the root re-scheduled under a different handle.
    if link.shared.borrow().callback_node != Some(ctx.handle) {
        tracing::debug!(handle = ctx.handle.raw(), "stale continuation dropped");
        return TaskStatus::Finished;
    }

    let lane = link.shared.borrow().pending_lanes.highest_priority();
    if lane.is_empty() {
        return TaskStatus::Finished;
    }
    let need_sync = lane == Lanes::SYNC || ctx.did_timeout;

    let status = {
        let Ok(mut core) = link.core.try_borrow_mut() else {
            tracing::error!(error = %RenderError::Reentrant, "concurrent work rejected");
            return TaskStatus::Finished;
        };
        render_root(&mut core, link, lane, !need_sync)
    };

    match status {
        Err(_) => {
            let mut shared = link.shared.borrow_mut();
            shared.callback_node = None;
            shared.callback_priority = Lanes::empty();
            TaskStatus::Finished
        }
        Ok(RootExitStatus::InProgress) => {
            ensure_root_is_scheduled(link);
            if link.shared.borrow().callback_node != Some(ctx.handle) {
                // Superseded while yielding; the replacement owns the work.
                return TaskStatus::Finished;
            }
            TaskStatus::Yielded
        }
        Ok(RootExitStatus::Completed) => {
            let Ok(mut core) = link.core.try_borrow_mut() else {
                tracing::error!(error = %RenderError::Reentrant, "commit rejected");
                return TaskStatus::Finished;
            };
            let finished = core
                .arena
                .get(core.current_root)
                .alternate
                .expect("a completed render leaves a finished alternate");
            core.finished_work = Some(finished);
            core.finished_lane = lane;
            core.wip_render_lane = Lanes::empty();
            if let Err(err) = commit_root(&mut core, link) {
                tracing::error!(error = %err, "commit aborted");
            }
            TaskStatus::Finished
        }
    }
}

/// Run the deferred passive effects: across the whole batch, unmount
/// destroys, then update destroys, then creates, never interleaved per
/// fiber. Ends by draining any synchronous callbacks the effects enqueued.
pub(crate) fn flush_passive_effects(link: &RootLink) {
    let (unmount, update) = {
        let Ok(mut core) = link.core.try_borrow_mut() else {
            tracing::error!(error = %RenderError::Reentrant, "passive flush rejected");
            return;
        };
        core.passive_flush_scheduled = false;
        (
            std::mem::take(&mut core.pending_passive.unmount),
            std::mem::take(&mut core.pending_passive.update),
        )
    };
    tracing::debug!(
        unmount = unmount.len(),
        update = update.len(),
        "flush_passive_effects"
    );

    for list in &unmount {
        let destroys: Vec<EffectCleanup> = {
            let mut effects = list.borrow_mut();
            effects
                .iter_mut()
                .filter(|effect| effect.tag.contains(EffectTag::PASSIVE))
                .filter_map(|effect| {
                    effect.tag.remove(EffectTag::HAS_EFFECT);
                    effect.destroy.take()
                })
                .collect()
        };
        for destroy in destroys {
            destroy();
        }
    }

    let rerun = EffectTag::PASSIVE | EffectTag::HAS_EFFECT;
    for list in &update {
        let destroys: Vec<EffectCleanup> = {
            let mut effects = list.borrow_mut();
            effects
                .iter_mut()
                .filter(|effect| effect.tag.contains(rerun))
                .filter_map(|effect| effect.destroy.take())
                .collect()
        };
        for destroy in destroys {
            destroy();
        }
    }
    for list in &update {
        let indices: Vec<usize> = list
            .borrow()
            .iter()
            .enumerate()
            .filter(|(_, effect)| effect.tag.contains(rerun))
            .map(|(index, _)| index)
            .collect();
        for index in indices {
            let create = list.borrow()[index].create.clone();
            let destroy = create();
            list.borrow_mut()[index].destroy = destroy;
        }
    }

    flush_sync_callbacks(link);
}

/// A mounted root: the sole ingress for new tree descriptions.
///
/// Cloning yields another handle to the same root.
#[derive(Clone)]
pub struct WeftRoot {
    link: RootLink,
}

impl WeftRoot {
    /// Create a root over `container`, wiring in the host and scheduler
    /// collaborators.
    pub fn new(
        host: Rc<RefCell<impl HostBackend + 'static>>,
        scheduler: Rc<RefCell<impl Scheduler + 'static>>,
        container: InstanceId,
    ) -> Self {
        let host: Rc<RefCell<dyn HostBackend>> = host;
        let scheduler: Rc<RefCell<dyn Scheduler>> = scheduler;

        let mut arena = FiberArena::new();
        let current_root = arena.alloc(Fiber::new_host_root());
        let core = RootCore {
            arena,
            current_root,
            container,
            finished_work: None,
            finished_lane: Lanes::empty(),
            wip: None,
            wip_render_lane: Lanes::empty(),
            pending_passive: PendingPassiveEffects::default(),
            passive_flush_scheduled: false,
            context_stacks: AHashMap::new(),
        };

        let link = RootLink {
            core: Rc::new(RefCell::new(core)),
            shared: Rc::new(RefCell::new(RootShared::default())),
            host,
            scheduler,
        };
        tracing::debug!("root created");
        Self { link }
    }

    /// Enqueue a new tree description at the most urgent priority and
    /// trigger scheduling. The render itself happens at the next
    /// microtask checkpoint.
    pub fn render(&self, node: impl Into<Node>) {
        self.enqueue_root_update(Some(node.into()));
    }

    /// Enqueue removal of the whole tree.
    pub fn unmount(&self) {
        self.enqueue_root_update(None);
    }

    /// Lanes with work outstanding. Diagnostic surface.
    #[must_use]
    pub fn pending_lanes(&self) -> Lanes {
        self.link.shared.borrow().pending_lanes
    }

    fn enqueue_root_update(&self, element: Option<Node>) {
        run_with_priority(
            &self.link.scheduler,
            weft_sched::SchedulerPriority::Immediate,
            || {
                let lane = request_update_lane(&self.link);
                let queue = {
                    let core = self.link.core.borrow();
                    core.arena
                        .get(core.current_root)
                        .root_queue
                        .clone()
                        .expect("host root carries an update queue")
                };
                queue
                    .borrow_mut()
                    .enqueue(Update::new(UpdateAction::Replace(element), lane));
                tracing::debug!(lane = lane.bits(), "root.render enqueued");
                schedule_update_on_root(&self.link, lane);
            },
        );
    }
}
