//! Event-loop drivers for a reconciler wired to `ManualScheduler`.
//!
//! Each driver first hands parked dispatches to the reconciler, then runs
//! microtasks before any task, like a browser event loop.

use crate::{ManualScheduler, RecordingHost};
use core_types::HostHandle;
use reconciler::{HostBackend, HostScheduler, Reconciler, ReconcilerConfig, ReconcilerError, RootId, TaskStatus};

pub type TestReconciler = Reconciler<RecordingHost, ManualScheduler>;

/// Upper bound on scheduler turns in `run_until_idle`; reaching it means
/// the reconciler keeps scheduling work.
pub const MAX_TURNS: usize = 10_000;

/// A reconciler over a fresh recording host with one root.
pub fn new_reconciler(scheduler: ManualScheduler, config: ReconcilerConfig) -> (TestReconciler, RootId, HostHandle) {
    let mut host = RecordingHost::new();
    let container = host.create_container();
    let mut reconciler = Reconciler::new(host, scheduler, config);
    let root = reconciler.create_root(container);
    (reconciler, root, container)
}

/// Drains the microtask queue. Returns how many ran.
pub fn run_microtasks<H: HostBackend>(reconciler: &mut Reconciler<H, ManualScheduler>) -> Result<usize, ReconcilerError> {
    reconciler.schedule_pending();
    let mut ran = 0;
    while let Some(task) = reconciler.scheduler_mut().pop_immediate() {
        reconciler.run_task(task)?;
        ran += 1;
    }
    Ok(ran)
}

/// Runs microtasks, then one slice of the most urgent task (followed by the
/// microtasks it queued). Returns the task's status, or `None` when no task
/// was scheduled.
pub fn run_next_task<H: HostBackend>(
    reconciler: &mut Reconciler<H, ManualScheduler>,
) -> Result<Option<TaskStatus>, ReconcilerError> {
    run_microtasks(reconciler)?;
    let Some(scheduled) = reconciler.scheduler_mut().pop_task() else {
        return Ok(None);
    };
    let outer = reconciler.scheduler().current_priority();
    reconciler.scheduler_mut().set_current_priority(scheduled.priority);
    let status = reconciler.run_task(scheduled.task);
    reconciler.scheduler_mut().set_current_priority(outer);
    let status = status?;
    if status == TaskStatus::Continue {
        reconciler.scheduler_mut().requeue(scheduled);
    }
    run_microtasks(reconciler)?;
    Ok(Some(status))
}

/// Runs microtasks and tasks until the scheduler is empty. Returns how
/// many tasks ran.
pub fn run_until_idle<H: HostBackend>(reconciler: &mut Reconciler<H, ManualScheduler>) -> Result<usize, ReconcilerError> {
    let mut turns = 0;
    while run_next_task(reconciler)?.is_some() {
        turns += 1;
        assert!(turns < MAX_TURNS, "scheduler did not go idle after {MAX_TURNS} tasks");
    }
    Ok(turns)
}
