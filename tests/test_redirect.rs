//! Mid-flight redirects: transparent re-dispatch, input replay, policy
//! inheritance, and fatal redirect failures

use mailadm_dispatch::protocol::{codes, Reply};
use mailadm_dispatch::{
    CommandInput, CommandSpec, DispatchConfig, DispatcherSession, TlsPolicy, UserRequest,
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
async fn test_referral_reply_redispatches_to_new_destination() {
    let transport = MockTransport::new();
    let passdb = MockPassdb::new();
    passdb.proxy_to("alice", "backend-1", 2500);
    transport.script_reply("alice", Reply::failure(codes::REFERRAL, "backend-2:2600"));
    // the replayed attempt succeeds (default reply)

    let mut session = DispatcherSession::new(
        remote_config(),
        transport.clone(),
        passdb,
        CommandSpec::new("mailbox status"),
    );

    session.dispatch(&UserRequest::new("alice")).await.unwrap();
    assert_eq!(session.finish().await, 0);

    let sent = transport.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].dest, "backend-1:2500");
    assert_eq!(sent[1].dest, "backend-2:2600");
    // the same serialized command line is replayed verbatim
    assert_eq!(sent[0].line, sent[1].line);

    assert_eq!(
        transport.connects(),
        vec!["backend-1:2500".to_string(), "backend-2:2600".to_string()]
    );
}

#[tokio::test]
async fn test_redirect_replays_input_from_start() {
    let transport = MockTransport::new();
    let passdb = MockPassdb::new();
    passdb.proxy_to("alice", "backend-1", 2500);
    transport.script_reply("alice", Reply::failure(codes::REFERRAL, "backend-2:2600"));

    let payload = b"From: sender\r\n\r\nmessage body".to_vec();
    let command = CommandSpec::new("save").with_input(CommandInput::from_bytes(payload.clone()));

    let mut session =
        DispatcherSession::new(remote_config(), transport.clone(), passdb, command);

    session.dispatch(&UserRequest::new("alice")).await.unwrap();
    assert_eq!(session.finish().await, 0);

    // the first attempt consumed the payload; the redirected attempt must
    // still observe it from the start
    let sent = transport.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].input.as_deref(), Some(payload.as_slice()));
    assert_eq!(sent[1].input.as_deref(), Some(payload.as_slice()));
}

#[tokio::test]
async fn test_redirect_inherits_port_and_tls_policy() {
    let transport = MockTransport::new();
    let passdb = MockPassdb::new();
    passdb.proxy_to("alice", "backend-1", 2500);
    // redirect names a bare host, no port
    transport.script_reply("alice", Reply::failure(codes::REFERRAL, "backend-2"));

    let config = DispatchConfig {
        tls: TlsPolicy::Ssl,
        ..remote_config()
    };
    let mut session = DispatcherSession::new(
        config,
        transport.clone(),
        passdb,
        CommandSpec::new("mailbox status"),
    );

    session.dispatch(&UserRequest::new("alice")).await.unwrap();
    assert_eq!(session.finish().await, 0);

    let addrs = transport.connect_addrs();
    assert_eq!(addrs.len(), 2);
    assert_eq!(addrs[1].name, "backend-2");
    // port and TLS policy carried over from the original destination
    assert_eq!(addrs[1].port, addrs[0].port);
    assert!(addrs[1].ssl_flags.tls);
}

#[tokio::test]
async fn test_redirect_own_port_wins_over_inherited() {
    let transport = MockTransport::new();
    let passdb = MockPassdb::new();
    passdb.proxy_to("alice", "backend-1", 2500);
    transport.script_reply("alice", Reply::failure(codes::REFERRAL, "backend-2:9999"));

    let mut session = DispatcherSession::new(
        remote_config(),
        transport.clone(),
        passdb,
        CommandSpec::new("mailbox status"),
    );

    session.dispatch(&UserRequest::new("alice")).await.unwrap();
    assert_eq!(session.finish().await, 0);

    let addrs = transport.connect_addrs();
    assert_eq!(addrs[1].port, 9999);
}

#[tokio::test]
async fn test_invalid_redirect_destination_is_fatal() {
    let transport = MockTransport::new();
    let passdb = MockPassdb::new();
    passdb.proxy_to("alice", "backend-1", 2500);
    transport.script_reply("alice", Reply::failure(codes::REFERRAL, ""));

    let mut session = DispatcherSession::new(
        remote_config(),
        transport.clone(),
        passdb,
        CommandSpec::new("mailbox status"),
    );

    session.dispatch(&UserRequest::new("alice")).await.unwrap();

    // the whole run is aborted, not just alice's command
    assert_eq!(session.finish().await, codes::TEMP_FAIL);
    assert_eq!(transport.sent().len(), 1);
}

#[tokio::test]
async fn test_redirect_connect_failure_is_fatal() {
    let transport = MockTransport::new();
    let passdb = MockPassdb::new();
    passdb.proxy_to("alice", "backend-1", 2500);
    transport.script_reply("alice", Reply::failure(codes::REFERRAL, "backend-2:2600"));
    transport.fail_connect("backend-2:2600");

    let mut session = DispatcherSession::new(
        remote_config(),
        transport.clone(),
        passdb,
        CommandSpec::new("mailbox status"),
    );

    session.dispatch(&UserRequest::new("alice")).await.unwrap();
    assert_eq!(session.finish().await, codes::TEMP_FAIL);
    assert_eq!(transport.sent().len(), 1);
}
