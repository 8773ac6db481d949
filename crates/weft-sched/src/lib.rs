#![forbid(unsafe_code)]

//! Cooperative priority scheduling for the weft work loop.
//!
//! The reconciler never owns a thread or an event loop. It hands units of
//! work to an external scheduler through the [`Scheduler`] trait and asks
//! that scheduler, between units, whether it should yield control back to
//! the host. This crate defines that seam plus [`StepScheduler`], a
//! deterministic single-threaded run queue used by tests and demos.
//!
//! # Design
//!
//! A scheduled callback is identified by a [`TaskHandle`]. Handles are the
//! identity the reconciler uses to detect stale continuations: a callback
//! that fires after its root has re-scheduled at a different priority
//! compares handles and drops itself. A task that is interrupted mid-run
//! returns [`TaskStatus::Yielded`] and keeps its handle; a finished task
//! returns [`TaskStatus::Finished`] and is dropped.
//!
//! # Invariants
//!
//! 1. Within one priority class, tasks run in schedule order (FIFO).
//! 2. A cancelled handle never runs again, even if cancellation happens
//!    while the task is executing.
//! 3. `should_yield` is side-effect free from the caller's perspective;
//!    the drive loop resets the time-slice budget at each task start.

use std::cell::Cell;
use std::cell::RefCell;
use std::rc::Rc;

/// Priority classes, most urgent first.
///
/// The ordering is total: `Immediate` outranks everything, `Idle` runs
/// last. The reconciler maps its lane bitmask onto these classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SchedulerPriority {
    Immediate,
    UserBlocking,
    Normal,
    Low,
    Idle,
}

/// Identity of a scheduled callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle(u64);

impl TaskHandle {
    #[must_use]
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// What a task reports back to the scheduler when it returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// The task is done; drop it.
    Finished,
    /// The task yielded cooperatively; keep it queued under the same handle.
    Yielded,
}

/// Per-invocation context handed to a task.
#[derive(Debug, Clone, Copy)]
pub struct TaskContext {
    /// The handle this task was scheduled under.
    pub handle: TaskHandle,
    /// True when the scheduler considers the task overdue and expects it to
    /// run to completion without yielding.
    pub did_timeout: bool,
}

/// A unit of schedulable work.
pub type Task = Box<dyn FnMut(TaskContext) -> TaskStatus>;

/// The external-scheduler collaborator consumed by the reconciler.
///
/// Object safe: the reconciler holds `Rc<RefCell<dyn Scheduler>>` and takes
/// only transient borrows, so tasks may re-enter the scheduler (schedule,
/// cancel, query) while running.
pub trait Scheduler {
    /// Queue `task` at `priority` and return its cancellable handle.
    fn schedule(&mut self, priority: SchedulerPriority, task: Task) -> TaskHandle;

    /// Cancel a previously scheduled task. Unknown handles are ignored.
    fn cancel(&mut self, handle: TaskHandle);

    /// Whether the currently running task should yield back to the host.
    fn should_yield(&self) -> bool;

    /// Handle of the next task that would run, if any.
    fn first_scheduled(&self) -> Option<TaskHandle>;

    /// The ambient priority used to tag externally triggered updates.
    fn current_priority(&self) -> SchedulerPriority;

    /// Replace the ambient priority, returning the previous value.
    fn swap_priority(&mut self, priority: SchedulerPriority) -> SchedulerPriority;
}

/// Run `f` with the scheduler's ambient priority set to `priority`,
/// restoring the previous value afterwards.
///
/// The borrow is released before `f` runs, so `f` may schedule or cancel.
pub fn run_with_priority<R>(
    scheduler: &Rc<RefCell<dyn Scheduler>>,
    priority: SchedulerPriority,
    f: impl FnOnce() -> R,
) -> R {
    let previous = scheduler.borrow_mut().swap_priority(priority);
    let result = f();
    scheduler.borrow_mut().swap_priority(previous);
    result
}

struct QueuedTask {
    handle: TaskHandle,
    priority: SchedulerPriority,
    seq: u64,
    task: Task,
}

/// Deterministic cooperative run queue.
///
/// Tasks are ordered by (priority, schedule sequence) and executed one at a
/// time by [`drive`]. Time slicing is simulated with a unit budget: the
/// running task is told to yield after `time_slice` calls to
/// [`should_yield`](Scheduler::should_yield) return `false`.
///
/// # Invariants
///
/// 1. `drive` holds no borrow while a task body runs, so tasks may
///    schedule, cancel, and query freely.
/// 2. A task cancelled while running is not re-queued even if it yields.
pub struct StepScheduler {
    queue: Vec<QueuedTask>,
    next_handle: u64,
    next_seq: u64,
    current_priority: SchedulerPriority,
    running: Option<TaskHandle>,
    running_cancelled: bool,
    time_slice: Option<u32>,
    budget: Cell<u32>,
    force_timeout: bool,
}

impl Default for StepScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl StepScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self {
            queue: Vec::new(),
            next_handle: 1,
            next_seq: 0,
            current_priority: SchedulerPriority::Normal,
            running: None,
            running_cancelled: false,
            time_slice: None,
            budget: Cell::new(u32::MAX),
            force_timeout: false,
        }
    }

    /// Limit each task run to `units` work units before `should_yield`
    /// reports true. `None` disables time slicing.
    pub fn set_time_slice(&mut self, units: Option<u32>) {
        self.time_slice = units;
        self.budget.set(units.unwrap_or(u32::MAX));
    }

    /// Force `did_timeout` on subsequently driven tasks.
    pub fn set_force_timeout(&mut self, force: bool) {
        self.force_timeout = force;
    }

    /// Number of queued tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    fn pop_next(&mut self) -> Option<QueuedTask> {
        let best = self
            .queue
            .iter()
            .enumerate()
            .min_by_key(|(_, t)| (t.priority, t.seq))
            .map(|(i, _)| i)?;
        Some(self.queue.remove(best))
    }
}

impl Scheduler for StepScheduler {
    fn schedule(&mut self, priority: SchedulerPriority, task: Task) -> TaskHandle {
        let handle = TaskHandle(self.next_handle);
        self.next_handle += 1;
        let seq = self.next_seq;
        self.next_seq += 1;
        tracing::debug!(handle = handle.raw(), ?priority, "sched.schedule");
        self.queue.push(QueuedTask {
            handle,
            priority,
            seq,
            task,
        });
        handle
    }

    fn cancel(&mut self, handle: TaskHandle) {
        if self.running == Some(handle) {
            self.running_cancelled = true;
            return;
        }
        let before = self.queue.len();
        self.queue.retain(|t| t.handle != handle);
        if self.queue.len() != before {
            tracing::debug!(handle = handle.raw(), "sched.cancel");
        }
    }

    fn should_yield(&self) -> bool {
        if self.time_slice.is_none() {
            return false;
        }
        let remaining = self.budget.get();
        if remaining == 0 {
            return true;
        }
        self.budget.set(remaining - 1);
        false
    }

    fn first_scheduled(&self) -> Option<TaskHandle> {
        self.queue
            .iter()
            .min_by_key(|t| (t.priority, t.seq))
            .map(|t| t.handle)
    }

    fn current_priority(&self) -> SchedulerPriority {
        self.current_priority
    }

    fn swap_priority(&mut self, priority: SchedulerPriority) -> SchedulerPriority {
        std::mem::replace(&mut self.current_priority, priority)
    }
}

/// Run queued tasks to exhaustion.
///
/// Each iteration pops the most urgent task, releases the scheduler borrow,
/// runs the task body, and re-queues it only if it yielded without being
/// cancelled. New tasks scheduled by a running task participate in the same
/// drive.
pub fn drive(scheduler: &Rc<RefCell<StepScheduler>>) {
    loop {
        if !drive_one(scheduler) {
            break;
        }
    }
}

/// Run at most one task. Returns false when the queue was empty.
pub fn drive_one(scheduler: &Rc<RefCell<StepScheduler>>) -> bool {
    let (mut entry, did_timeout) = {
        let mut sched = scheduler.borrow_mut();
        let Some(entry) = sched.pop_next() else {
            return false;
        };
        sched.running = Some(entry.handle);
        sched.running_cancelled = false;
        let slice = sched.time_slice.unwrap_or(u32::MAX);
        sched.budget.set(slice);
        (entry, sched.force_timeout)
    };

    let status = (entry.task)(TaskContext {
        handle: entry.handle,
        did_timeout,
    });

    let mut sched = scheduler.borrow_mut();
    let cancelled = std::mem::take(&mut sched.running_cancelled);
    sched.running = None;
    if status == TaskStatus::Yielded && !cancelled {
        tracing::trace!(handle = entry.handle.raw(), "sched.requeue");
        sched.queue.push(entry);
    }
    true
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn rc(sched: StepScheduler) -> Rc<RefCell<StepScheduler>> {
        Rc::new(RefCell::new(sched))
    }

    fn record(log: &Rc<RefCell<Vec<u32>>>, value: u32) -> Task {
        let log = Rc::clone(log);
        Box::new(move |_| {
            log.borrow_mut().push(value);
            TaskStatus::Finished
        })
    }

    #[test]
    fn runs_in_priority_order() {
        let sched = rc(StepScheduler::new());
        let log = Rc::new(RefCell::new(Vec::new()));

        sched
            .borrow_mut()
            .schedule(SchedulerPriority::Normal, record(&log, 2));
        sched
            .borrow_mut()
            .schedule(SchedulerPriority::Immediate, record(&log, 1));
        sched
            .borrow_mut()
            .schedule(SchedulerPriority::Idle, record(&log, 3));

        drive(&sched);
        assert_eq!(*log.borrow(), vec![1, 2, 3]);
    }

    #[test]
    fn fifo_within_priority() {
        let sched = rc(StepScheduler::new());
        let log = Rc::new(RefCell::new(Vec::new()));

        for i in 0..4 {
            sched
                .borrow_mut()
                .schedule(SchedulerPriority::Normal, record(&log, i));
        }

        drive(&sched);
        assert_eq!(*log.borrow(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn cancel_prevents_run() {
        let sched = rc(StepScheduler::new());
        let log = Rc::new(RefCell::new(Vec::new()));

        let h = sched
            .borrow_mut()
            .schedule(SchedulerPriority::Normal, record(&log, 1));
        sched.borrow_mut().cancel(h);

        drive(&sched);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn yielded_task_keeps_handle_and_resumes() {
        let sched = rc(StepScheduler::new());
        let log = Rc::new(RefCell::new(Vec::new()));
        let log_clone = Rc::clone(&log);
        let mut runs = 0;

        let h = sched.borrow_mut().schedule(
            SchedulerPriority::Normal,
            Box::new(move |ctx| {
                runs += 1;
                log_clone.borrow_mut().push((ctx.handle.raw(), runs));
                if runs < 3 {
                    TaskStatus::Yielded
                } else {
                    TaskStatus::Finished
                }
            }),
        );

        drive(&sched);
        let log = log.borrow();
        assert_eq!(log.len(), 3);
        assert!(log.iter().all(|&(handle, _)| handle == h.raw()));
    }

    #[test]
    fn cancel_while_running_drops_continuation() {
        let sched = rc(StepScheduler::new());
        let sched_clone = Rc::clone(&sched);
        let runs = Rc::new(Cell::new(0u32));
        let runs_clone = Rc::clone(&runs);

        sched.borrow_mut().schedule(
            SchedulerPriority::Normal,
            Box::new(move |ctx| {
                runs_clone.set(runs_clone.get() + 1);
                sched_clone.borrow_mut().cancel(ctx.handle);
                TaskStatus::Yielded
            }),
        );

        drive(&sched);
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn time_slice_budget_triggers_yield() {
        let mut sched = StepScheduler::new();
        sched.set_time_slice(Some(2));

        assert!(!sched.should_yield());
        assert!(!sched.should_yield());
        assert!(sched.should_yield());
        assert!(sched.should_yield());
    }

    #[test]
    fn no_time_slice_never_yields() {
        let sched = StepScheduler::new();
        for _ in 0..100 {
            assert!(!sched.should_yield());
        }
    }

    #[test]
    fn run_with_priority_restores() {
        let sched: Rc<RefCell<dyn Scheduler>> = rc(StepScheduler::new());
        assert_eq!(
            sched.borrow().current_priority(),
            SchedulerPriority::Normal
        );

        let seen = run_with_priority(&sched, SchedulerPriority::Immediate, || {
            sched.borrow().current_priority()
        });
        assert_eq!(seen, SchedulerPriority::Immediate);
        assert_eq!(
            sched.borrow().current_priority(),
            SchedulerPriority::Normal
        );
    }

    #[test]
    fn first_scheduled_reports_most_urgent() {
        let sched = rc(StepScheduler::new());
        assert!(sched.borrow().first_scheduled().is_none());

        sched
            .borrow_mut()
            .schedule(SchedulerPriority::Low, Box::new(|_| TaskStatus::Finished));
        let urgent = sched.borrow_mut().schedule(
            SchedulerPriority::UserBlocking,
            Box::new(|_| TaskStatus::Finished),
        );
        assert_eq!(sched.borrow().first_scheduled(), Some(urgent));
    }

    #[test]
    fn task_may_schedule_more_work() {
        let sched = rc(StepScheduler::new());
        let log = Rc::new(RefCell::new(Vec::new()));
        let inner = record(&log, 2);
        let sched_clone = Rc::clone(&sched);
        let log_clone = Rc::clone(&log);

        let mut inner = Some(inner);
        sched.borrow_mut().schedule(
            SchedulerPriority::Normal,
            Box::new(move |_| {
                log_clone.borrow_mut().push(1);
                if let Some(task) = inner.take() {
                    sched_clone
                        .borrow_mut()
                        .schedule(SchedulerPriority::Normal, task);
                }
                TaskStatus::Finished
            }),
        );

        drive(&sched);
        assert_eq!(*log.borrow(), vec![1, 2]);
    }
}
