mod attach_tests;
mod rotation_tests;

/// Sends crate logs to the test harness output; `RUST_LOG` picks the level.
fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
