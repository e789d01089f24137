/// The scheduler's only tunable (SPEC_FULL.md §4.3, §10): how many
/// consecutive synchronous resumes a single task's driver future is allowed
/// before it is forced to yield back to the `LocalSet` so sibling tasks get
/// a turn. `0` disables the forced yield entirely, relying solely on
/// `tokio`'s own internal cooperative budget.
#[derive(Debug, Clone, Copy)]
pub struct RunnerConfig {
    pub yield_after: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self { yield_after: 64 }
    }
}
