use std::time::Duration;

/// `sleep(ms)` (SPEC_FULL.md §4.5): a Suspend wired to the host timer.
/// Deliberately *not* halt-aware: per §4.1's edge-case policy, a
/// non-suspend-in-the-forever-sense instruction issued while Halting
/// behaves normally, which is what lets `sleep` inside a `finally` block
/// actually wait out its duration. If the owning task is abandoned (halted)
/// while `sleep` is pending in the *main body*, the surrounding
/// `tokio::select!` in the task driver drops this future outright; "halt
/// cancels the timer before unparking" is realised for free since a
/// dropped `tokio::time::Sleep` is simply deallocated.
pub async fn sleep(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}
