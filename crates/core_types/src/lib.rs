//! Plain identifiers shared by the reconciler and its host collaborators.

/// Opaque handle to a host primitive (element, text node or container).
///
/// Handles are allocated by the host backend; the reconciler only stores and
/// passes them back.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostHandle(pub u32);

/// Cancelable handle returned by the host scheduler for a queued task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskHandle(pub u64);

/// Host scheduler priority classes, most urgent first.
///
/// Each class corresponds to exactly one reconciler lane.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PriorityClass {
    Immediate,
    UserBlocking,
    #[default]
    Normal,
    Low,
    Idle,
}

impl PriorityClass {
    pub const ALL: [PriorityClass; 5] = [
        PriorityClass::Immediate,
        PriorityClass::UserBlocking,
        PriorityClass::Normal,
        PriorityClass::Low,
        PriorityClass::Idle,
    ];
}
