use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::error::Error;
use crate::scope::Scope;

/// The distinguished forever-Suspend instruction (SPEC_FULL.md §4.5, §9):
/// never completes on its own — only escapes via the owning task being
/// halted or failing. This is the one primitive whose poll checks the
/// current task's Halting flag directly (rather than relying on the main
/// body being abandoned), because it is the one instruction that can be
/// issued *again* from inside a running cleanup block, where abandonment
/// has already happened and cannot happen a second time.
pub async fn suspend<T>() -> Result<T, Error> {
    SuspendForever { scope: Scope::current(), _marker: std::marker::PhantomData }.await
}

struct SuspendForever<T> {
    scope: Scope,
    _marker: std::marker::PhantomData<T>,
}

impl<T> Future for SuspendForever<T> {
    type Output = Result<T, Error>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(cause) = self.scope.halting_cause() {
            return Poll::Ready(Err(cause));
        }
        Poll::Pending
    }
}
