//! A single-threaded structured-concurrency runtime: task trees where a
//! parent's settlement is gated on every descendant having settled first,
//! cooperative cancellation ("halt") cascades depth-first with guaranteed
//! cleanup, and resources acquired anywhere in that cascade — including
//! inside cleanup blocks — are released exactly once, in reverse order.
//!
//! See `SPEC_FULL.md` in the repository root for the full specification
//! this crate implements, and `DESIGN.md` for the grounding ledger behind
//! each module's design.

mod adapters;
mod channel;
mod config;
mod error;
mod id;
mod run;
mod scope;
mod task;

pub use adapters::{expect, sleep, suspend};
pub use channel::{channel, Receiver, Sender, Subscription};
pub use config::RunnerConfig;
pub use error::Error;
pub use id::TaskId;
pub use run::{run, run_with_config};
pub use scope::Scope;
pub use task::TaskHandle;

/// `spawn` as a free function, using the ambient scope of the task
/// currently being driven (SPEC_FULL.md §6 lists `spawn` alongside
/// `sleep`/`suspend`/`expect` as top-level operations). Equivalent to
/// `Scope::current().spawn(f)`; prefer the `Scope` method directly when
/// you already have one in hand (e.g. inside `Scope::spawn`'s own
/// closure).
pub fn spawn<F, Fut, U>(f: F) -> TaskHandle<U>
where
    F: FnOnce(Scope) -> Fut + 'static,
    Fut: std::future::Future<Output = Result<U, Error>> + 'static,
    U: 'static,
{
    Scope::current().spawn(f)
}
