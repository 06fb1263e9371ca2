//! Boundaries to the embedding host.
//!
//! The backend owns the native output tree; the reconciler only issues the
//! calls below during commit and treats them as infallible. The scheduler
//! owns the event loop; the reconciler hands it `Task` values and the host
//! feeds them back through `Reconciler::run_task`.

use crate::element::Attributes;
use crate::scheduler::Task;
use core_types::{HostHandle, PriorityClass, TaskHandle};

pub trait HostBackend {
    fn create_primitive(&mut self, kind: &str, attributes: &Attributes) -> HostHandle;
    fn create_text_primitive(&mut self, content: &str) -> HostHandle;
    /// Appends `child` to `parent`, moving it if it is already attached.
    fn append_child(&mut self, parent: HostHandle, child: HostHandle);
    /// Inserts `child` before `before`, moving it if it is already attached.
    fn insert_before(&mut self, parent: HostHandle, child: HostHandle, before: HostHandle);
    fn remove_child(&mut self, parent: HostHandle, child: HostHandle);
    fn update_text_content(&mut self, handle: HostHandle, content: &str);
    fn update_primitive_props(&mut self, handle: HostHandle, attributes: &Attributes);
    fn set_visibility(&mut self, handle: HostHandle, hidden: bool);
}

pub trait HostScheduler {
    /// Queues `task` behind any task of equal or more urgent priority.
    fn schedule_task(&mut self, priority: PriorityClass, task: Task) -> TaskHandle;
    fn cancel_task(&mut self, handle: TaskHandle);
    /// Polled between units of concurrent work.
    fn should_yield(&mut self) -> bool;
    /// Queues `task` to run before any scheduled task (a microtask).
    fn schedule_immediate(&mut self, task: Task);
    /// Priority of the event the host is currently dispatching.
    fn current_priority(&self) -> PriorityClass;
}
