use core_types::PriorityClass;

#[derive(Clone, Debug)]
pub struct ReconcilerConfig {
    /// Release fibers unreachable from any root after each commit.
    pub sweep_after_commit: bool,
    /// Ambient priority of updates dispatched outside any priority scope.
    pub default_priority: PriorityClass,
    /// Upper bound on units of work per concurrent slice, checked alongside
    /// the host's yield signal.
    pub max_units_per_slice: Option<u32>,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            sweep_after_commit: true,
            default_priority: PriorityClass::Normal,
            max_units_per_slice: None,
        }
    }
}
