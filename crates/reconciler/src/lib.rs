//! Incremental tree reconciliation.
//!
//! Components describe a tree of host primitives; the reconciler diffs each
//! new description against the committed tree and applies the minimal set
//! of host operations, with prioritized, interruptible rendering.

mod begin_work;
mod child_fiber;
mod commit;
mod complete_work;
mod config;
mod context;
mod counters;
mod element;
mod error;
mod fiber;
mod flags;
mod hooks;
mod host;
mod lanes;
mod scheduler;
mod suspense;
mod update_queue;
mod work_loop;

pub use crate::config::ReconcilerConfig;
pub use crate::context::{Context, ContextId};
pub use crate::counters::Counters;
pub use crate::element::{
    AnyProps, Attributes, Child, Component, Element, HostProps, Key, MemoComponent, NodeRef,
    RenderResult, attrs,
};
pub use crate::error::{HookKind, HookViolation, Interrupt, ReconcilerError};
pub use crate::hooks::{Dep, Deps, Dispatch, Reducer, RefHandle, RenderCx, StartTransition, Teardown};
pub use crate::host::{HostBackend, HostScheduler};
pub use crate::lanes::{Lane, Lanes, RootLanes};
pub use crate::scheduler::{RootId, Task, TaskStatus};
pub use crate::suspense::{Resource, Wakeable, WakeableId};
pub use crate::update_queue::{Action, Processed, Update, UpdateQueue, process_update_queue};
pub use crate::work_loop::Reconciler;
pub use core_types::{HostHandle, PriorityClass, TaskHandle};

