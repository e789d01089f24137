use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use futures::future::{FutureExt, LocalBoxFuture};

use crate::error::Error;
use crate::id::TaskId;
use crate::scope::{ScopeState, CURRENT_SCOPE};

/// Forces the wrapped future to yield back to the executor every `limit`
/// polls, realising SPEC_FULL.md §4.3's "turn boundary": after N
/// consecutive synchronous resumes, give sibling tasks on the `LocalSet`'s
/// FIFO run queue a turn before resuming this one. `limit == 0` disables
/// this and falls back to `tokio`'s own internal cooperative budget.
struct YieldBudget<F> {
    inner: F,
    limit: usize,
    count: usize,
}

impl<F: Future + Unpin> Future for YieldBudget<F> {
    type Output = F::Output;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.limit > 0 {
            self.count += 1;
            if self.count >= self.limit {
                self.count = 0;
                cx.waker().wake_by_ref();
                return Poll::Pending;
            }
        }
        Pin::new(&mut self.inner).poll(cx)
    }
}

/// The Frame/Task driver (SPEC_FULL.md §4.1, §4.2): races the task's main
/// body against its own cancellation token, folds the outcome into the
/// dominant-cause cell, then runs the halt/cleanup drain, and finally
/// records the settled result.
///
/// "Inject a synthetic throw at the frame's suspension point" is realised
/// here as abandonment: if `cancel` fires first, `body` is dropped without
/// further polling. Cleanup blocks survive this because they were
/// registered eagerly (at `Scope::defer`/`resource`/`finally`-entry time),
/// not lazily by unwinding through the dropped future.
///
/// The one case where `body` resolves instead of being dropped — a
/// halting-aware reaction such as `suspend()` noticing the cause and a
/// `finally` block then running its cleanup inline — must not be raced
/// against `cancel` a second time, since the cancellation token stays
/// permanently signalled and would otherwise abandon a real in-flight
/// suspension (e.g. a timer) inside that cleanup. `ScopeState::suppress_abandon`
/// is the latch `Scope::finally` sets for exactly this case.
async fn drive<T: 'static>(
    scope: Rc<ScopeState>,
    result_slot: Rc<RefCell<Option<Result<T, Error>>>>,
    body: LocalBoxFuture<'static, Result<T, Error>>,
) {
    let body = YieldBudget { inner: body, limit: scope.yield_after, count: 0 };
    let scope_for_body = scope.clone();
    let outcome: Option<Result<T, Error>> = CURRENT_SCOPE
        .scope(scope.clone(), async move {
            tokio::select! {
                // Biased: a body that already produced a result synchronously
                // (no suspension point reached) never actually yielded to the
                // cancellation race, so it must not be retroactively discarded
                // just because the token happened to be cancelled beforehand
                // (e.g. a forced child-halt racing a same-turn synchronous
                // body). Checking the body first makes the outcome
                // deterministic instead of depending on `select!`'s
                // pseudo-random tie-break.
                biased;
                r = body => Some(r),
                _ = scope_for_body.cancel.cancelled(), if !scope_for_body.suppress_abandon.get() => None,
            }
        })
        .await;

    match &outcome {
        Some(Err(e)) => {
            tracing::debug!(task = %scope.id, error = %e, "task body raised");
            scope.cause.borrow_mut().observe_child_error(e.clone());
        }
        None => {
            tracing::debug!(task = %scope.id, "task abandoned, halting");
            scope.cause.borrow_mut().mark_halted();
        }
        Some(Ok(_)) => {}
    }

    CURRENT_SCOPE.scope(scope.clone(), scope.settle()).await;

    let final_cause_is_halting = scope.cause.borrow().is_halting();
    let final_result = match outcome {
        Some(Ok(v)) if !final_cause_is_halting => Ok(v),
        _ => Err(scope.cause.borrow().as_error().unwrap_or_else(Error::halted)),
    };
    tracing::debug!(task = %scope.id, ok = final_result.is_ok(), "task settled");
    *result_slot.borrow_mut() = Some(final_result);
}

/// Spawn a task's driver future onto the current `LocalSet` (see
/// SPEC_FULL.md §4.3) and return a handle joinable for its result.
pub(crate) fn spawn_driver<T, Fut>(scope: Rc<ScopeState>, body: Fut) -> TaskHandle<T>
where
    T: 'static,
    Fut: Future<Output = Result<T, Error>> + 'static,
{
    let result_slot: Rc<RefCell<Option<Result<T, Error>>>> = Rc::new(RefCell::new(None));
    tokio::task::spawn_local(drive(scope.clone(), result_slot.clone(), body.boxed_local()));
    TaskHandle { scope, result: result_slot, waiting: RefCell::new(None) }
}

/// A handle to a live or settled task, returned by both `run` and
/// `Scope::spawn`. Implements `Future` so it is itself usable as an
/// Operation: awaiting it suspends until settlement, then yields the
/// task's value or propagates its error — the implicit `await()` of
/// SPEC_FULL.md §4.2.
pub struct TaskHandle<T> {
    scope: Rc<ScopeState>,
    result: Rc<RefCell<Option<Result<T, Error>>>>,
    waiting: RefCell<Option<LocalBoxFuture<'static, ()>>>,
}

impl<T> TaskHandle<T> {
    pub fn id(&self) -> TaskId {
        self.scope.id
    }

    pub fn is_settled(&self) -> bool {
        self.scope.is_settled()
    }

    /// Request cancellation of this task (and cascade to its descendants);
    /// resolves once the task has Settled. Idempotent per §4.2.
    pub async fn halt(&self) {
        self.scope.halt().await;
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if !self.scope.is_settled() {
            let mut waiting = self.waiting.borrow_mut();
            if waiting.is_none() {
                let scope = self.scope.clone();
                *waiting = Some(async move { scope.await_settled().await }.boxed_local());
            }
            let poll_result = waiting.as_mut().unwrap().as_mut().poll(cx);
            match poll_result {
                Poll::Ready(()) => *waiting = None,
                Poll::Pending => return Poll::Pending,
            }
        }
        match self.result.borrow_mut().take() {
            Some(result) => Poll::Ready(result),
            None => Poll::Ready(Err(Error::halted())),
        }
    }
}
