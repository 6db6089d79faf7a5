//! Routing outcomes seen by the caller: local execution, top-level
//! referrals, and lookup failures that never touch a connection

use mailadm_dispatch::protocol::codes;
use mailadm_dispatch::{
    CommandSpec, DispatchConfig, DispatchOutcome, DispatcherSession, UserRequest,
};

use test_helpers::{MockPassdb, MockTransport};

fn remote_config() -> DispatchConfig {
    DispatchConfig {
        admin_port: 2500,
        worker_count: 1,
        ..DispatchConfig::default()
    }
}

#[tokio::test]
async fn test_no_admin_port_always_runs_locally() {
    let transport = MockTransport::new();
    let passdb = MockPassdb::new();
    // even a proxied user runs locally when remote routing is disabled
    passdb.proxy_to("alice", "backend-1", 2500);

    let config = DispatchConfig::default();
    let mut session = DispatcherSession::new(
        config,
        transport.clone(),
        passdb,
        CommandSpec::new("mailbox status"),
    );

    let outcome = session.dispatch(&UserRequest::new("alice")).await.unwrap();
    assert_eq!(outcome, DispatchOutcome::Local);
    assert!(transport.connects().is_empty());

    assert_eq!(session.finish().await, 0);
}

#[tokio::test]
async fn test_unknown_user_runs_locally() {
    let transport = MockTransport::new();
    let passdb = MockPassdb::new();

    let mut session = DispatcherSession::new(
        remote_config(),
        transport.clone(),
        passdb,
        CommandSpec::new("mailbox status"),
    );

    let outcome = session.dispatch(&UserRequest::new("nobody")).await.unwrap();
    assert_eq!(outcome, DispatchOutcome::Local);
    assert!(transport.connects().is_empty());
}

#[tokio::test]
async fn test_top_level_referral_is_returned_not_dispatched() {
    let transport = MockTransport::new();
    let passdb = MockPassdb::new();
    passdb.set_fields("alice", &["nologin", "host=c"]);

    let mut session = DispatcherSession::new(
        remote_config(),
        transport.clone(),
        passdb,
        CommandSpec::new("mailbox status"),
    );

    let outcome = session.dispatch(&UserRequest::new("alice")).await.unwrap();
    assert_eq!(outcome, DispatchOutcome::Referral("alice@c".to_string()));

    // no connection was opened for a referral
    assert!(transport.connects().is_empty());
    assert!(transport.sent().is_empty());
    assert_eq!(session.finish().await, 0);
}

#[tokio::test]
async fn test_lookup_failure_names_endpoint_and_fails_the_run() {
    let transport = MockTransport::new();
    let passdb = MockPassdb::with_socket_path("/run/auth/auth-userdb");
    passdb.set_error("alice", "connection refused");

    let mut session = DispatcherSession::new(
        remote_config(),
        transport.clone(),
        passdb,
        CommandSpec::new("mailbox status"),
    );

    let err = session
        .dispatch(&UserRequest::new("alice"))
        .await
        .unwrap_err();
    assert!(err.is_routing_error());
    assert!(err.to_string().contains("/run/auth/auth-userdb"));

    // nothing was dispatched and the run is recorded as failed
    assert!(transport.sent().is_empty());
    assert_eq!(session.exit_code(), codes::TEMP_FAIL);

    // the routing error is terminal for that one command only
    let outcome = session.dispatch(&UserRequest::new("nobody")).await.unwrap();
    assert_eq!(outcome, DispatchOutcome::Local);

    assert_eq!(session.finish().await, codes::TEMP_FAIL);
}

#[tokio::test]
async fn test_remote_dispatch_sends_wire_line() {
    let transport = MockTransport::new();
    let passdb = MockPassdb::new();
    passdb.proxy_to("alice", "backend-1", 2500);

    let config = DispatchConfig {
        debug: true,
        ..remote_config()
    };
    let command = CommandSpec::new("mailbox status").with_args(vec!["INBOX".to_string()]);
    let mut session = DispatcherSession::new(config, transport.clone(), passdb, command);

    let outcome = session.dispatch(&UserRequest::new("alice")).await.unwrap();
    assert_eq!(outcome, DispatchOutcome::Remote);
    assert_eq!(session.finish().await, 0);

    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].dest, "backend-1:2500");
    assert_eq!(sent[0].line, "D\talice\tmailbox status\tINBOX\n");
}

#[tokio::test]
async fn test_destination_rename_uses_lookup_user() {
    let transport = MockTransport::new();
    let passdb = MockPassdb::new();
    passdb.set_fields(
        "alice",
        &["proxy", "host=b", "destuser=carol", "port=2000"],
    );

    let mut session = DispatcherSession::new(
        remote_config(),
        transport.clone(),
        passdb,
        CommandSpec::new("mailbox status"),
    );

    session.dispatch(&UserRequest::new("alice")).await.unwrap();
    assert_eq!(session.finish().await, 0);

    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    // the renamed user is what goes on the wire
    assert_eq!(sent[0].username, "carol");
    assert_eq!(sent[0].dest, "b:2000");
}
