use std::cell::{Cell, RefCell};
use std::future::Future;
use std::rc::Rc;

use futures::future::{FutureExt, LocalBoxFuture};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::RunnerConfig;
use crate::error::{Cause, Error};
use crate::id::TaskId;
use crate::task::TaskHandle;

pub(crate) type CleanupFuture = LocalBoxFuture<'static, Result<(), Error>>;
pub(crate) type CleanupFn = Box<dyn FnOnce() -> CleanupFuture>;

tokio::task_local! {
    /// The scope of the task currently being driven. Set by `drive()` for
    /// the lifetime of a task's main body and of its cleanup blocks, so
    /// the free-function adapters (`suspend`, `spawn`) can reach the
    /// ambient scope the way the spec's external interface (§6) implies,
    /// without every `.await` point threading a `&Scope` through by hand.
    pub(crate) static CURRENT_SCOPE: Rc<ScopeState>;
}

/// Per-task ambient state: parent link, children, registered cleanup blocks,
/// the dominant-cause cell, and the cancellation signal. Deliberately
/// non-generic over the task's output type `T` — only the settled *value*
/// needs that, and it lives alongside this in `TaskHandle`/`drive`.
///
/// Grounded on the teacher's `Scope`/`CancelGuard`/`TerminateGuard` shape
/// (`chain/network/src/concurrency/scope/mod.rs`), adapted from `Arc` to
/// `Rc`/`Weak` since this runtime is single-threaded by design, and from
/// `tokio::spawn` to `tokio::task::spawn_local`.
pub(crate) struct ScopeState {
    pub(crate) id: TaskId,
    parent: Option<Rc<ScopeState>>,
    children: RefCell<Vec<Rc<ScopeState>>>,
    cleanups: RefCell<Vec<CleanupFn>>,
    pub(crate) cause: RefCell<Cause>,
    pub(crate) cancel: CancellationToken,
    pub(crate) yield_after: usize,
    pub(crate) suppress_abandon: Cell<bool>,
    settled_tx: watch::Sender<bool>,
    settled_rx: watch::Receiver<bool>,
}

impl ScopeState {
    pub(crate) fn new_root(config: RunnerConfig) -> Rc<Self> {
        let (settled_tx, settled_rx) = watch::channel(false);
        Rc::new(Self {
            id: TaskId::next(),
            parent: None,
            children: RefCell::new(Vec::new()),
            cleanups: RefCell::new(Vec::new()),
            cause: RefCell::new(Cause::default()),
            cancel: CancellationToken::new(),
            yield_after: config.yield_after,
            suppress_abandon: Cell::new(false),
            settled_tx,
            settled_rx,
        })
    }

    fn new_child(parent: &Rc<ScopeState>) -> Rc<Self> {
        let (settled_tx, settled_rx) = watch::channel(false);
        Rc::new(Self {
            id: TaskId::next(),
            parent: Some(parent.clone()),
            children: RefCell::new(Vec::new()),
            cleanups: RefCell::new(Vec::new()),
            cause: RefCell::new(Cause::default()),
            cancel: parent.cancel.child_token(),
            yield_after: parent.yield_after,
            suppress_abandon: Cell::new(false),
            settled_tx,
            settled_rx,
        })
    }

    pub(crate) fn is_settled(&self) -> bool {
        *self.settled_rx.borrow()
    }

    pub(crate) async fn await_settled(&self) {
        let mut rx = self.settled_rx.clone();
        let _ = rx.wait_for(|settled| *settled).await;
    }

    /// Request cancellation and wait for settlement. Idempotent: cancelling
    /// an already-cancelled token and marking an already-halting cause are
    /// both no-ops, so repeated calls just join the same settled signal.
    pub(crate) async fn halt(self: &Rc<Self>) {
        self.cause.borrow_mut().mark_halted();
        self.cancel.cancel();
        self.await_settled().await;
    }

    /// The re-entrant halt/cleanup drain described in SPEC_FULL.md §4.2.
    /// Runs after the task's own main-body future has either completed
    /// naturally or been abandoned (dropped) due to cancellation; loops
    /// haling/awaiting children and popping cleanup entries until both are
    /// empty, re-checking `children` after every cleanup step since cleanup
    /// may itself spawn new ones.
    pub(crate) async fn settle(self: &Rc<Self>) {
        loop {
            let kids: Vec<Rc<ScopeState>> = self.children.borrow().clone();
            if !kids.is_empty() {
                self.children.borrow_mut().clear();
                // LIFO order of spawning, per §4.2 step 3.
                for child in kids.into_iter().rev() {
                    child.halt().await;
                }
                continue;
            }
            let next = self.cleanups.borrow_mut().pop();
            let Some(cleanup) = next else { break };
            if let Err(e) = cleanup().await {
                tracing::debug!(task = %self.id, error = %e, "cleanup block raised, dominating prior cause");
                self.cause.borrow_mut().observe_cleanup_error(e);
                self.cancel.cancel();
            }
        }
        if let Some(parent) = &self.parent {
            if let Cause::Err(e) = &*self.cause.borrow() {
                parent.cause.borrow_mut().observe_child_error(e.clone());
                parent.cancel.cancel();
            }
        }
        let _ = self.settled_tx.send(true);
    }

    pub(crate) fn push_child(self: &Rc<Self>, child: Rc<ScopeState>) {
        self.children.borrow_mut().push(child);
    }

    pub(crate) fn push_cleanup(&self, cleanup: CleanupFn) {
        self.cleanups.borrow_mut().push(cleanup);
    }
}

/// Handle given to an operation's body: the ambient "current scope" API
/// (spawn children, register cleanup, acquire scoped resources).
#[derive(Clone)]
pub struct Scope {
    pub(crate) state: Rc<ScopeState>,
}

impl Scope {
    pub(crate) fn root(config: RunnerConfig) -> (Self, Rc<ScopeState>) {
        let state = ScopeState::new_root(config);
        (Scope { state: state.clone() }, state)
    }

    /// The scope of the task currently being driven. Panics if called
    /// outside of a running operation body (mirrors `tokio::task_local!`'s
    /// own panic-outside-scope contract).
    pub fn current() -> Self {
        CURRENT_SCOPE.with(|s| Scope { state: s.clone() })
    }

    pub fn id(&self) -> TaskId {
        self.state.id
    }

    /// Whether this task is currently in the Halting state (main body
    /// abandoned, running cleanup). Exposed so long-running loops (e.g. a
    /// `takeEvery`-style handler) can check it without depending on halt
    /// actually interrupting their current suspension.
    pub fn is_halting(&self) -> bool {
        self.state.cause.borrow().is_halting()
    }

    /// The current dominant cause, if this task is halting. `None` while
    /// still Running.
    pub(crate) fn halting_cause(&self) -> Option<Error> {
        self.state.cause.borrow().as_error()
    }

    /// Halt the task this `Scope` belongs to — typically captured by a
    /// spawned child closure to let a descendant request cancellation of
    /// an ancestor (SPEC_FULL.md §8 scenario 6), since a `Scope` is plain
    /// data that closures capture like anything else.
    pub async fn halt_self(&self) {
        self.state.halt().await;
    }

    /// Create a child task, registered in this scope's children so it is
    /// awaited (or cascade-halted) before this task can settle. Returns a
    /// handle awaitable for the child's own result.
    pub fn spawn<F, Fut, U>(&self, f: F) -> TaskHandle<U>
    where
        F: FnOnce(Scope) -> Fut + 'static,
        Fut: Future<Output = Result<U, Error>> + 'static,
        U: 'static,
    {
        let child_state = ScopeState::new_child(&self.state);
        self.state.push_child(child_state.clone());
        let child_scope = Scope { state: child_state.clone() };
        let span = tracing::debug_span!("task", id = %child_state.id, parent = %self.state.id);
        crate::task::spawn_driver(child_state.clone(), async move { f(child_scope).await }.instrument(span))
    }

    /// Register a cleanup block to run (in LIFO order with other cleanups
    /// of this task) once the task reaches settlement, whether by natural
    /// completion of its body or by abandonment due to halt. The cleanup
    /// itself may suspend and spawn, per §4.1.
    pub fn defer<F, Fut>(&self, cleanup: F)
    where
        F: FnOnce() -> Fut + 'static,
        Fut: Future<Output = Result<(), Error>> + 'static,
    {
        self.state.push_cleanup(Box::new(move || cleanup().boxed_local()));
    }

    /// `try`/`finally`: run `body`, then always run `cleanup` before
    /// returning, whichever of body/cleanup produced an error dominating
    /// (a cleanup error always wins). The cleanup is also registered
    /// eagerly on this task's cleanup stack so it still runs if the task
    /// is abandoned (halted) while `body` is in flight; that fallback
    /// registration is disarmed once `body` completes and we run cleanup
    /// inline ourselves.
    pub async fn finally<Fut1, T, F2, Fut2>(&self, body: Fut1, cleanup: F2) -> Result<T, Error>
    where
        Fut1: Future<Output = Result<T, Error>>,
        F2: FnOnce() -> Fut2 + 'static,
        Fut2: Future<Output = Result<(), Error>> + 'static,
    {
        let armed = Rc::new(Cell::new(true));
        let slot: Rc<RefCell<Option<F2>>> = Rc::new(RefCell::new(Some(cleanup)));

        let armed_for_fallback = armed.clone();
        let slot_for_fallback = slot.clone();
        self.state.push_cleanup(Box::new(move || {
            if armed_for_fallback.get() {
                if let Some(c) = slot_for_fallback.borrow_mut().take() {
                    return c().boxed_local();
                }
            }
            std::future::ready(Ok(())).boxed_local()
        }));

        let result = body.await;
        armed.set(false);
        // `body` resolved (naturally or via its own halting-aware reaction, e.g.
        // `suspend()` noticing the cause) rather than being dropped by the
        // driver's abandonment race. If the task is already halting, the
        // cleanup we're about to run inline is the unwind itself — it must not
        // be subject to that same race a second time (see `task::drive`).
        if self.state.cause.borrow().is_halting() {
            self.state.suppress_abandon.set(true);
        }
        let cleanup_result = match slot.borrow_mut().take() {
            Some(c) => c().await,
            None => Ok(()),
        };
        match cleanup_result {
            Ok(()) => result,
            Err(e) => Err(e),
        }
    }

    /// Acquire a scoped resource: run `acquire`, then register `release`
    /// to run (LIFO, alongside other cleanups/resources of this task)
    /// before settlement. The acquired value is handed back wrapped in
    /// `Rc` so both the caller and the deferred release closure can refer
    /// to it without requiring `T: Clone`.
    pub async fn resource<T, A, Rel, Fut>(&self, acquire: A, release: Rel) -> Result<Rc<T>, Error>
    where
        T: 'static,
        A: Future<Output = Result<T, Error>>,
        Rel: FnOnce(Rc<T>) -> Fut + 'static,
        Fut: Future<Output = Result<(), Error>> + 'static,
    {
        let value = Rc::new(acquire.await?);
        let for_release = value.clone();
        self.defer(move || release(for_release));
        Ok(value)
    }
}
