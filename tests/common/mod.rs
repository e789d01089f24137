/// Mirrors the teacher's `near_o11y::testonly::init_test_logger` convention
/// (`chain/network/src/peer_manager/tests/accounts_data.rs`), reimplemented
/// locally since that crate isn't part of this crate's dependency set.
pub fn init_test_logger() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
