use std::future::Future;

/// Promise-like bridge (SPEC_FULL.md §4.5): converts an externally-settled
/// future into an Operation. Cancellation of the surrounding task does not
/// cancel the external work — there is no generic cancellation of
/// arbitrary futures here — it simply abandons the result, which falls out
/// of `external` being dropped along with the rest of the main body when
/// the task is abandoned.
pub async fn expect<F: Future>(external: F) -> F::Output {
    external.await
}
