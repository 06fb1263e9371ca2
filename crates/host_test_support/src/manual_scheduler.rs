//! Deterministic host scheduler driven by the test.

use core_types::{PriorityClass, TaskHandle};
use reconciler::{HostScheduler, Task};
use std::collections::VecDeque;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum YieldPolicy {
    /// `should_yield` always answers no; a concurrent render runs to the end.
    Never,
    /// Yield once this many units have run in the current slice.
    EveryUnits(u32),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScheduledTask {
    pub handle: TaskHandle,
    pub priority: PriorityClass,
    pub task: Task,
    seq: u64,
}

pub struct ManualScheduler {
    immediates: VecDeque<Task>,
    tasks: Vec<ScheduledTask>,
    next_handle: u64,
    next_seq: u64,
    current_priority: PriorityClass,
    yield_policy: YieldPolicy,
    polls_this_slice: u32,
    cancelled: Vec<TaskHandle>,
}

impl Default for ManualScheduler {
    fn default() -> Self {
        Self::new(YieldPolicy::Never)
    }
}

impl ManualScheduler {
    pub fn new(yield_policy: YieldPolicy) -> Self {
        Self {
            immediates: VecDeque::new(),
            tasks: Vec::new(),
            next_handle: 1,
            next_seq: 0,
            current_priority: PriorityClass::Normal,
            yield_policy,
            polls_this_slice: 0,
            cancelled: Vec::new(),
        }
    }

    pub fn set_yield_policy(&mut self, policy: YieldPolicy) {
        self.yield_policy = policy;
    }

    pub fn set_current_priority(&mut self, priority: PriorityClass) {
        self.current_priority = priority;
    }

    pub fn has_immediates(&self) -> bool {
        !self.immediates.is_empty()
    }

    pub fn is_idle(&self) -> bool {
        self.immediates.is_empty() && self.tasks.is_empty()
    }

    /// Scheduled tasks in the order they would run.
    pub fn pending_tasks(&self) -> Vec<ScheduledTask> {
        let mut tasks = self.tasks.clone();
        tasks.sort_by_key(|t| (t.priority, t.seq));
        tasks
    }

    /// Handles cancelled so far, oldest first.
    pub fn cancelled(&self) -> &[TaskHandle] {
        &self.cancelled
    }

    pub fn pop_immediate(&mut self) -> Option<Task> {
        self.immediates.pop_front()
    }

    /// Removes the most urgent task, oldest first within a priority, and
    /// starts a new slice.
    pub fn pop_task(&mut self) -> Option<ScheduledTask> {
        let position = self
            .tasks
            .iter()
            .enumerate()
            .min_by_key(|(_, t)| (t.priority, t.seq))
            .map(|(i, _)| i)?;
        self.polls_this_slice = 0;
        Some(self.tasks.remove(position))
    }

    /// Puts back a task that asked to continue, ahead of newer tasks of the
    /// same priority.
    pub fn requeue(&mut self, task: ScheduledTask) {
        self.tasks.push(task);
    }
}

impl HostScheduler for ManualScheduler {
    fn schedule_task(&mut self, priority: PriorityClass, task: Task) -> TaskHandle {
        let handle = TaskHandle(self.next_handle);
        self.next_handle += 1;
        let seq = self.next_seq;
        self.next_seq += 1;
        self.tasks.push(ScheduledTask {
            handle,
            priority,
            task,
            seq,
        });
        handle
    }

    fn cancel_task(&mut self, handle: TaskHandle) {
        self.tasks.retain(|t| t.handle != handle);
        self.cancelled.push(handle);
    }

    fn should_yield(&mut self) -> bool {
        match self.yield_policy {
            YieldPolicy::Never => false,
            YieldPolicy::EveryUnits(budget) => {
                self.polls_this_slice += 1;
                self.polls_this_slice >= budget
            }
        }
    }

    fn schedule_immediate(&mut self, task: Task) {
        self.immediates.push_back(task);
    }

    fn current_priority(&self) -> PriorityClass {
        self.current_priority
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tasks_run_by_priority_then_age() {
        let mut scheduler = ManualScheduler::default();
        let low = scheduler.schedule_task(PriorityClass::Low, Task::FlushSync);
        let normal_a = scheduler.schedule_task(PriorityClass::Normal, Task::FlushSync);
        let normal_b = scheduler.schedule_task(PriorityClass::Normal, Task::FlushSync);
        let order: Vec<TaskHandle> = std::iter::from_fn(|| scheduler.pop_task().map(|t| t.handle)).collect();
        assert_eq!(order, vec![normal_a, normal_b, low]);
    }

    #[test]
    fn cancelled_tasks_never_run() {
        let mut scheduler = ManualScheduler::default();
        let handle = scheduler.schedule_task(PriorityClass::Normal, Task::FlushSync);
        scheduler.cancel_task(handle);
        assert!(scheduler.pop_task().is_none());
        assert_eq!(scheduler.cancelled(), &[handle]);
    }

    #[test]
    fn unit_budget_resets_per_slice() {
        let mut scheduler = ManualScheduler::new(YieldPolicy::EveryUnits(2));
        scheduler.schedule_task(PriorityClass::Normal, Task::FlushSync);
        assert!(!scheduler.should_yield());
        assert!(scheduler.should_yield());
        scheduler.pop_task();
        assert!(!scheduler.should_yield());
    }
}
