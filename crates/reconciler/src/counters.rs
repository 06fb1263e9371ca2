//! Instrumentation counters.

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Counters {
    pub renders_started: u64,
    pub units_of_work: u64,
    pub bailouts: u64,
    pub commits: u64,
    pub host_mutations: u64,
    pub suspensions: u64,
    pub passive_flushes: u64,
    pub fibers_allocated: u64,
    pub fibers_released: u64,
}
