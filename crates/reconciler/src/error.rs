use crate::scheduler::RootId;
use crate::suspense::Wakeable;
use std::fmt;

/// Kind of hook cell recorded at a position of a component's hook list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HookKind {
    State,
    Effect,
    Ref,
    Memo,
}

/// Misuse of the component state primitives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HookViolation {
    /// An update pass declared a different number of hooks than the mount.
    CountMismatch {
        component: &'static str,
        expected: usize,
        found: usize,
    },
    /// The hook at `index` changed kind between passes.
    KindMismatch {
        component: &'static str,
        index: usize,
        expected: HookKind,
        found: HookKind,
    },
    /// A state cell was read back with a different value type.
    StateType {
        component: &'static str,
        index: usize,
    },
    /// The element's props are not the type the component was declared with.
    PropsType { component: &'static str },
}

impl fmt::Display for HookViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookViolation::CountMismatch {
                component,
                expected,
                found,
            } => write!(
                f,
                "hook count mismatch in {component}: previous render declared {expected}, this render declared {found}"
            ),
            HookViolation::KindMismatch {
                component,
                index,
                expected,
                found,
            } => write!(
                f,
                "hook {index} of {component} changed kind from {expected:?} to {found:?}"
            ),
            HookViolation::StateType { component, index } => {
                write!(f, "hook {index} of {component} read with a different state type")
            }
            HookViolation::PropsType { component } => {
                write!(f, "{component} received props of an unexpected type")
            }
        }
    }
}

impl std::error::Error for HookViolation {}

/// Early exit from component execution.
#[derive(Debug)]
pub enum Interrupt {
    /// Data is not ready; retry once the wakeable resolves.
    Suspend(Wakeable),
    Violation(HookViolation),
    Failed(String),
}

impl Interrupt {
    pub fn failed(message: impl Into<String>) -> Self {
        Interrupt::Failed(message.into())
    }
}

impl From<HookViolation> for Interrupt {
    fn from(violation: HookViolation) -> Self {
        Interrupt::Violation(violation)
    }
}

#[derive(Debug)]
pub enum ReconcilerError {
    Hook(HookViolation),
    Component {
        component: &'static str,
        message: String,
    },
    UnknownRoot(RootId),
}

impl fmt::Display for ReconcilerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconcilerError::Hook(violation) => write!(f, "hook contract violation: {violation}"),
            ReconcilerError::Component { component, message } => {
                write!(f, "component {component} failed: {message}")
            }
            ReconcilerError::UnknownRoot(root) => write!(f, "unknown root {root:?}"),
        }
    }
}

impl std::error::Error for ReconcilerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReconcilerError::Hook(violation) => Some(violation),
            _ => None,
        }
    }
}

impl From<HookViolation> for ReconcilerError {
    fn from(violation: HookViolation) -> Self {
        ReconcilerError::Hook(violation)
    }
}
