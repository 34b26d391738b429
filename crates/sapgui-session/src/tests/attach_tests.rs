use super::fakes::{connection, CountingContext, FakeConnection, FakeHost, FakeSession};
use super::init_test_logging;
use crate::attach::{attach, attach_with_cancel, CancelFlag};
use crate::config::{AttachOptions, ServerDisabledPolicy};
use crate::errors::SapError;
use crate::scripting::NoContext;
use std::time::{Duration, Instant};

fn options(timeout_ms: u64, poll_ms: u64) -> AttachOptions {
    AttachOptions::new(
        Duration::from_millis(timeout_ms),
        Duration::from_millis(poll_ms),
    )
}

#[test]
fn test_attach_times_out_within_one_poll_interval() {
    init_test_logging();
    for (timeout_ms, poll_ms) in [(200u64, 50u64), (300, 120), (150, 100)] {
        let host = FakeHost::never();
        let start = Instant::now();

        let result = attach(&host, &NoContext, &options(timeout_ms, poll_ms));
        let elapsed = start.elapsed();

        match result {
            Err(SapError::AttachTimeout { timeout, attempts }) => {
                assert_eq!(timeout, Duration::from_millis(timeout_ms));
                assert_eq!(attempts, host.lookups());
            }
            Err(e) => panic!("Expected AttachTimeout, got {e:?}"),
            Ok(_) => panic!("Expected AttachTimeout, got a session"),
        }
        assert!(
            elapsed >= Duration::from_millis(timeout_ms),
            "gave up early after {elapsed:?}"
        );
        assert!(
            elapsed < Duration::from_millis(timeout_ms + poll_ms),
            "overshot to {elapsed:?} for timeout {timeout_ms}ms / poll {poll_ms}ms"
        );
    }
}

#[test]
fn test_attach_polls_at_constant_interval() {
    init_test_logging();
    let host = FakeHost::never();
    let _ = attach(&host, &NoContext, &options(500, 100));

    // Attempts at roughly 0, 100, ..., 500ms; scheduling jitter may drop one.
    let lookups = host.lookups();
    assert!((5..=6).contains(&lookups), "unexpected attempt count {lookups}");
}

#[test]
fn test_attach_returns_first_session_of_first_connection() {
    init_test_logging();
    let host = FakeHost::ready_after(
        0,
        vec![
            connection(
                "/app/con[0]",
                vec![
                    FakeSession::new("/app/con[0]/ses[0]"),
                    FakeSession::new("/app/con[0]/ses[1]"),
                ],
            ),
            connection("/app/con[1]", vec![FakeSession::new("/app/con[1]/ses[0]")]),
        ],
    );

    let session = attach(&host, &NoContext, &options(1_000, 50)).unwrap();
    assert_eq!(session.id(), "/app/con[0]/ses[0]");
}

#[test]
fn test_attach_stops_polling_once_ready() {
    init_test_logging();
    let host = FakeHost::ready_after(
        3,
        vec![connection(
            "/app/con[0]",
            vec![FakeSession::new("/app/con[0]/ses[0]")],
        )],
    );

    let start = Instant::now();
    let session = attach(&host, &NoContext, &options(2_000, 20)).unwrap();

    assert_eq!(session.id(), "/app/con[0]/ses[0]");
    assert_eq!(host.lookups(), 4);
    assert!(start.elapsed() < Duration::from_millis(1_000));
}

#[test]
fn test_attach_keeps_polling_without_connections() {
    init_test_logging();
    let host = FakeHost::ready_after(0, Vec::new());

    let result = attach(&host, &NoContext, &options(150, 30));

    assert!(matches!(result, Err(SapError::AttachTimeout { .. })));
    assert!(host.lookups() > 1);
}

#[test]
fn test_attach_keeps_polling_without_sessions() {
    init_test_logging();
    let host = FakeHost::ready_after(0, vec![connection("/app/con[0]", Vec::new())]);

    let result = attach(&host, &NoContext, &options(150, 30));

    assert!(matches!(result, Err(SapError::AttachTimeout { .. })));
    assert!(host.lookups() > 1);
}

fn disabled_connection() -> FakeConnection {
    FakeConnection {
        id: "/app/con[0]".to_string(),
        disabled_by_server: true,
        sessions: vec![FakeSession::new("/app/con[0]/ses[0]")],
    }
}

#[test]
fn test_server_disabled_keeps_polling_by_default() {
    init_test_logging();
    let host = FakeHost::ready_after(0, vec![disabled_connection()]);

    let result = attach(&host, &NoContext, &options(150, 30));

    assert!(matches!(result, Err(SapError::AttachTimeout { .. })));
    assert!(host.lookups() > 1);
}

#[test]
fn test_server_disabled_can_fail_immediately() {
    init_test_logging();
    let host = FakeHost::ready_after(0, vec![disabled_connection()]);
    let opts = options(1_000, 30).with_server_disabled(ServerDisabledPolicy::Fail);

    match attach(&host, &NoContext, &opts) {
        Err(SapError::ScriptingDisabledByServer(id)) => assert_eq!(id, "/app/con[0]"),
        Err(e) => panic!("Expected ScriptingDisabledByServer, got {e:?}"),
        Ok(_) => panic!("Expected ScriptingDisabledByServer, got a session"),
    }
    assert_eq!(host.lookups(), 1);
}

#[test]
fn test_context_is_released_on_success_and_timeout() {
    init_test_logging();
    let ready = FakeHost::ready_after(
        1,
        vec![connection(
            "/app/con[0]",
            vec![FakeSession::new("/app/con[0]/ses[0]")],
        )],
    );
    let context = CountingContext::default();
    let session = attach(&ready, &context, &options(500, 10));
    assert!(session.is_ok());
    assert_eq!((context.entered.get(), context.released.get()), (1, 1));

    let context = CountingContext::default();
    let result = attach(&FakeHost::never(), &context, &options(50, 10));
    assert!(result.is_err());
    assert_eq!((context.entered.get(), context.released.get()), (1, 1));
}

#[test]
fn test_zero_poll_interval_is_rejected_before_polling() {
    init_test_logging();
    let host = FakeHost::never();
    let result = attach(&host, &NoContext, &options(100, 0));

    assert!(matches!(result, Err(SapError::InvalidArgument(_))));
    assert_eq!(host.lookups(), 0);
}

#[test]
fn test_cancelled_attach_stops_before_next_attempt() {
    init_test_logging();
    let host = FakeHost::never();
    let cancel = CancelFlag::new();
    cancel.cancel();

    let result = attach_with_cancel(&host, &NoContext, &options(5_000, 10), Some(&cancel));

    assert!(matches!(result, Err(SapError::Cancelled(_))));
    assert_eq!(host.lookups(), 0);
}
