use std::future::Future;

use tracing::Instrument;

use crate::config::RunnerConfig;
use crate::error::Error;
use crate::scope::Scope;
use crate::task::{spawn_driver, TaskHandle};

/// The public entry point (SPEC_FULL.md §6): takes a factory producing an
/// Operation, creates the root Task, and returns a handle that is itself
/// awaitable (settles with the factory's value or error) and exposes
/// `halt()`. Runs with `RunnerConfig::default()`; use `run_with_config` to
/// tune the scheduler's turn budget.
///
/// Must be called from within a `tokio::task::LocalSet` context, since
/// every task in the tree (this one and anything it `spawn`s) is driven
/// via `spawn_local` — see SPEC_FULL.md §4.3 for why the Scheduler
/// component is realised this way. Typical usage:
///
/// ```ignore
/// let local = tokio::task::LocalSet::new();
/// let result = local
///     .run_until(async { structured_concurrency::run(|scope| async move { Ok(42) }).await })
///     .await;
/// ```
pub fn run<F, Fut, T>(factory: F) -> TaskHandle<T>
where
    F: FnOnce(Scope) -> Fut + 'static,
    Fut: Future<Output = Result<T, Error>> + 'static,
    T: 'static,
{
    run_with_config(factory, RunnerConfig::default())
}

/// Like `run`, but with an explicit `RunnerConfig` rather than the default
/// (SPEC_FULL.md §10 Configuration).
pub fn run_with_config<F, Fut, T>(factory: F, config: RunnerConfig) -> TaskHandle<T>
where
    F: FnOnce(Scope) -> Fut + 'static,
    Fut: Future<Output = Result<T, Error>> + 'static,
    T: 'static,
{
    let (scope, state) = Scope::root(config);
    tracing::debug!(task = %state.id, "root task spawned");
    let span = tracing::debug_span!("task", id = %state.id);
    spawn_driver(state, async move { factory(scope).await }.instrument(span))
}
