//! End-to-end tests driving a client and a server `HandshakeEngine`
//! against each other through their memory buffers.
//!
//! Only the public API of `milli_tls` is used. Certificates are generated
//! per test by `common`.

mod common;

use milli_tls::{
    ClientTlsConfig, Credential, CredentialSource, EngineEvent, Error, HandshakeEngine,
    HandshakeStatus, InstallStep, Method, PeerVerification, Phase, RecordStatus, Role,
    SelectionOrder, ServerTlsConfig, SessionContext,
};
use test_case::test_case;

use common::{issue_ca, issue_leaf, new_key, server_fixture};

const HOST: &str = "svc.milli.test";
const PASSWORD: &str = "correct horse";

// ---------------------------------------------------------------------------
// Test infrastructure
// ---------------------------------------------------------------------------

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Server and client contexts that trust each other.
fn contexts(
    method: Method,
    server_alpn: &[&str],
    client_alpn: &[&str],
    selection: SelectionOrder,
) -> (SessionContext, SessionContext) {
    init_logging();
    let fx = server_fixture(HOST, PASSWORD);

    let mut server = ServerTlsConfig::new(CredentialSource::Pkcs12Bytes {
        der: fx.pfx,
        password: PASSWORD.into(),
    });
    server.method = method;
    server.alpn_protocols = server_alpn.iter().map(|p| p.as_bytes().to_vec()).collect();
    server.selection = selection;

    let client = ClientTlsConfig {
        method,
        server_name: Some(HOST.into()),
        alpn_protocols: client_alpn.iter().map(|p| p.as_bytes().to_vec()).collect(),
        verification: PeerVerification::Trusted(vec![fx.ca]),
        outbound_limit: None,
    };

    (
        SessionContext::client(&client).unwrap(),
        SessionContext::server(&server).unwrap(),
    )
}

fn default_pair() -> (HandshakeEngine, HandshakeEngine) {
    let (c, s) = contexts(
        Method::Tls,
        &["h2", "http/1.1"],
        &["h2", "http/1.1"],
        SelectionOrder::ServerPreference,
    );
    (
        HandshakeEngine::new(&c).unwrap(),
        HandshakeEngine::new(&s).unwrap(),
    )
}

/// Move all pending output in both directions.
fn exchange(client: &mut HandshakeEngine, server: &mut HandshakeEngine) -> bool {
    let mut any = false;

    // Client → Server
    let mut buf = [0u8; 4096];
    while let Some(data) = client.poll_output(&mut buf) {
        let copy = data.to_vec();
        server.feed_data(&copy);
        any = true;
    }

    // Server → Client
    let mut buf2 = [0u8; 4096];
    while let Some(data) = server.poll_output(&mut buf2) {
        let copy = data.to_vec();
        client.feed_data(&copy);
        any = true;
    }

    any
}

/// Run the handshake to completion; returns the number of rounds used.
fn run_handshake(client: &mut HandshakeEngine, server: &mut HandshakeEngine) -> usize {
    for round in 1..=10 {
        let c = client.advance_handshake().unwrap();
        let s = server.advance_handshake().unwrap();
        exchange(client, server);
        if c == HandshakeStatus::Complete && s == HandshakeStatus::Complete {
            return round;
        }
    }
    panic!("handshake did not complete: client={client:?} server={server:?}");
}

fn drain_events(e: &mut HandshakeEngine) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    while let Some(ev) = e.poll_event() {
        events.push(ev);
    }
    events
}

/// Encrypt all of `data`, flushing whenever the engine asks to.
fn send_all(from: &mut HandshakeEngine, data: &[u8]) -> Vec<u8> {
    let mut wire = Vec::new();
    let mut sent = 0;
    while sent < data.len() {
        match from.encrypt(&data[sent..]).unwrap() {
            RecordStatus::Done(n) => sent += n,
            RecordStatus::NeedOutputFlushed => wire.extend_from_slice(&from.take_output()),
            other => panic!("unexpected encrypt status {other:?}"),
        }
    }
    wire.extend_from_slice(&from.take_output());
    wire
}

/// Decrypt until the engine needs more input.
fn recv_all(to: &mut HandshakeEngine) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buf = [0u8; 1500];
    loop {
        match to.decrypt(&mut buf).unwrap() {
            RecordStatus::Done(n) => out.extend_from_slice(&buf[..n]),
            RecordStatus::NeedMoreInput => return out,
            RecordStatus::NeedOutputFlushed => {
                to.take_output();
            }
            RecordStatus::PeerClosed => panic!("unexpected close_notify"),
        }
    }
}

// ---------------------------------------------------------------------------
// Handshake
// ---------------------------------------------------------------------------

#[test_case(Method::Tls12, "TLSv1.2" ; "tls 1.2 only")]
#[test_case(Method::Tls, "TLSv1.3" ; "flexible method")]
fn handshake_establishes_both_sides(method: Method, version: &str) {
    let (c, s) = contexts(method, &["h2"], &["h2"], SelectionOrder::ServerPreference);
    let mut client = HandshakeEngine::new(&c).unwrap();
    let mut server = HandshakeEngine::new(&s).unwrap();

    let rounds = run_handshake(&mut client, &mut server);
    assert!(rounds <= 6, "took {rounds} rounds");

    assert_eq!(client.phase(), Phase::Established);
    assert_eq!(server.phase(), Phase::Established);
    assert_eq!(client.role(), Role::Client);
    assert_eq!(server.role(), Role::Server);
    assert!(drain_events(&mut client).contains(&EngineEvent::HandshakeComplete));
    assert!(drain_events(&mut server).contains(&EngineEvent::HandshakeComplete));

    if method == Method::Tls12 || s.capabilities().tls13 {
        assert_eq!(server.protocol_version(), Some(version));
        assert_eq!(client.protocol_version(), Some(version));
    }
    assert_eq!(server.cipher_name(), client.cipher_name());
}

#[test_case(1 ; "byte at a time")]
#[test_case(3 ; "three bytes")]
#[test_case(5 ; "exactly a record header")]
#[test_case(7 ; "seven bytes")]
#[test_case(100 ; "hundred bytes")]
#[test_case(usize::MAX ; "whole flight")]
fn chunked_client_hello_is_safe(chunk: usize) {
    let (mut client, mut server) = default_pair();

    assert_eq!(
        client.advance_handshake().unwrap(),
        HandshakeStatus::NeedOutputFlushed
    );
    let hello = client.take_output();
    assert!(!hello.is_empty());

    let pieces: Vec<&[u8]> = hello.chunks(chunk.min(hello.len())).collect();
    let (last, partial) = pieces.split_last().unwrap();
    let mut fed = 0;
    for piece in partial {
        server.feed_data(piece);
        fed += piece.len();
        assert_eq!(
            server.advance_handshake().unwrap(),
            HandshakeStatus::NeedMoreInput
        );
        // Nothing is consumed until the record is whole.
        assert_eq!(server.transport().pending_input(), fed);
        assert_eq!(&server.transport().inbound().peek()[..], &hello[..fed]);
        assert_eq!(server.transport().pending_output(), 0);
    }

    server.feed_data(last);
    assert_eq!(
        server.advance_handshake().unwrap(),
        HandshakeStatus::NeedOutputFlushed
    );
    assert_eq!(server.transport().pending_input(), 0);

    exchange(&mut client, &mut server);
    run_handshake(&mut client, &mut server);
    assert!(server.is_established());
    assert_eq!(server.negotiated_protocol(), Some(&b"h2"[..]));
}

#[test]
fn peer_verification_rejects_wrong_host() {
    init_logging();
    let fx = server_fixture(HOST, PASSWORD);
    let mut server = ServerTlsConfig::new(CredentialSource::Pkcs12Bytes {
        der: fx.pfx,
        password: PASSWORD.into(),
    });
    server.method = Method::Tls12;
    let client = ClientTlsConfig {
        method: Method::Tls12,
        server_name: Some("somebody-else.test".into()),
        verification: PeerVerification::Trusted(vec![fx.ca]),
        ..ClientTlsConfig::default()
    };
    let mut client = HandshakeEngine::new(&SessionContext::client(&client).unwrap()).unwrap();
    let mut server = HandshakeEngine::new(&SessionContext::server(&server).unwrap()).unwrap();

    let mut failure = None;
    for _ in 0..6 {
        if let Err(e) = client.advance_handshake() {
            failure = Some(e);
            break;
        }
        let _ = server.advance_handshake();
        exchange(&mut client, &mut server);
    }
    let err = failure.expect("client accepted a certificate for the wrong host");
    assert!(matches!(err, Error::Protocol { .. }), "{err:?}");
    assert_eq!(client.phase(), Phase::Faulted);
    // The alert the client wrote can still be flushed.
    let _ = client.take_output();
}

// ---------------------------------------------------------------------------
// ALPN
// ---------------------------------------------------------------------------

#[test_case(SelectionOrder::ServerPreference, Some("h2") ; "server preference")]
#[test_case(SelectionOrder::ClientPreference, Some("http/1.1") ; "client preference")]
fn alpn_tie_break(order: SelectionOrder, expected: Option<&str>) {
    for _ in 0..4 {
        let (c, s) = contexts(Method::Tls, &["h2", "http/1.1"], &["http/1.1", "h2"], order);
        let mut client = HandshakeEngine::new(&c).unwrap();
        let mut server = HandshakeEngine::new(&s).unwrap();
        run_handshake(&mut client, &mut server);

        let expected = expected.map(str::as_bytes);
        assert_eq!(server.negotiated_protocol(), expected);
        assert_eq!(client.negotiated_protocol(), expected);
    }
}

#[test]
fn alpn_without_overlap_still_completes() {
    let (c, s) = contexts(
        Method::Tls,
        &["h2", "http/1.1"],
        &["spdy/1"],
        SelectionOrder::ServerPreference,
    );
    let mut client = HandshakeEngine::new(&c).unwrap();
    let mut server = HandshakeEngine::new(&s).unwrap();
    run_handshake(&mut client, &mut server);

    assert!(server.is_established());
    assert_eq!(server.negotiated_protocol(), None);
    assert_eq!(client.negotiated_protocol(), None);
}

#[test]
fn alpn_not_offered() {
    let (c, s) = contexts(Method::Tls12, &["h2"], &[], SelectionOrder::ServerPreference);
    let mut client = HandshakeEngine::new(&c).unwrap();
    let mut server = HandshakeEngine::new(&s).unwrap();
    run_handshake(&mut client, &mut server);
    assert_eq!(server.negotiated_protocol(), None);
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

#[test]
fn failed_install_leaves_server_unusable() {
    init_logging();
    let (ca_key, ca) = issue_ca("Real Root");
    let (_, leaf) = issue_leaf(HOST, &ca_key, &ca);

    let mut builder = SessionContext::builder(Role::Server, Method::Tls);
    let err = builder
        .install_credential(Credential::from_parts(new_key(), leaf, vec![ca]))
        .unwrap_err();
    assert!(matches!(
        err,
        Error::CredentialInstall {
            step: InstallStep::PrivateKey,
            ..
        }
    ));
    assert!(err.is_setup_failure());
    assert!(!builder.has_credential());
    let server_ctx = builder.build().unwrap();
    assert!(!server_ctx.has_credential());

    let client_ctx = SessionContext::client(&ClientTlsConfig::default()).unwrap();
    let mut client = HandshakeEngine::new(&client_ctx).unwrap();
    let mut server = HandshakeEngine::new(&server_ctx).unwrap();

    client.advance_handshake().unwrap();
    exchange(&mut client, &mut server);
    let err = server.advance_handshake().unwrap_err();
    assert!(err.is_connection_fatal());
    assert_eq!(server.phase(), Phase::Faulted);
}

#[test]
fn pkcs12_with_leaf_copy_and_extra_root_serves() {
    init_logging();
    let (ca_key, ca) = issue_ca("Real Root");
    let (_, extra) = issue_ca("Extra Root");
    let (key, leaf) = issue_leaf(HOST, &ca_key, &ca);
    let pfx = common::pkcs12_der(&key, &leaf, &[&leaf, &extra, &ca], PASSWORD);

    let mut builder = SessionContext::builder(Role::Server, Method::Tls);
    builder
        .install_credential(Credential::from_pkcs12(&pfx, PASSWORD).unwrap())
        .unwrap();
    let server_ctx = builder.build().unwrap();

    let client_ctx = SessionContext::client(&ClientTlsConfig {
        method: Method::Tls,
        server_name: Some(HOST.into()),
        alpn_protocols: Vec::new(),
        verification: PeerVerification::Trusted(vec![ca]),
        outbound_limit: None,
    })
    .unwrap();
    let mut client = HandshakeEngine::new(&client_ctx).unwrap();
    let mut server = HandshakeEngine::new(&server_ctx).unwrap();
    run_handshake(&mut client, &mut server);
    assert!(client.is_established());
}

#[test]
fn pkcs12_file_source() {
    init_logging();
    let fx = server_fixture(HOST, "");
    let path = std::env::temp_dir().join(format!("milli-tls-{}.pfx", std::process::id()));
    std::fs::write(&path, &fx.pfx).unwrap();

    let config = ServerTlsConfig::new(CredentialSource::Pkcs12File {
        path: path.clone(),
        password: String::new(),
    });
    let server_ctx = SessionContext::server(&config);
    std::fs::remove_file(&path).unwrap();
    let server_ctx = server_ctx.unwrap();

    let client_ctx = SessionContext::client(&ClientTlsConfig {
        server_name: Some(HOST.into()),
        verification: PeerVerification::Trusted(vec![fx.ca]),
        ..ClientTlsConfig::default()
    })
    .unwrap();
    let mut client = HandshakeEngine::new(&client_ctx).unwrap();
    let mut server = HandshakeEngine::new(&server_ctx).unwrap();
    run_handshake(&mut client, &mut server);
}

// ---------------------------------------------------------------------------
// Application data
// ---------------------------------------------------------------------------

#[test_case(Method::Tls12 ; "tls 1.2")]
#[test_case(Method::Tls ; "flexible")]
fn app_data_both_directions(method: Method) {
    let (c, s) = contexts(method, &["h2"], &["h2"], SelectionOrder::ServerPreference);
    let mut client = HandshakeEngine::new(&c).unwrap();
    let mut server = HandshakeEngine::new(&s).unwrap();
    run_handshake(&mut client, &mut server);

    let wire = send_all(&mut client, b"GET / HTTP/1.1\r\n\r\n");
    server.feed_data(&wire);
    assert_eq!(recv_all(&mut server), b"GET / HTTP/1.1\r\n\r\n");

    let wire = send_all(&mut server, b"HTTP/1.1 204 No Content\r\n\r\n");
    client.feed_data(&wire);
    assert_eq!(recv_all(&mut client), b"HTTP/1.1 204 No Content\r\n\r\n");
}

#[test]
fn large_payload_in_small_pieces() {
    let (mut client, mut server) = default_pair();
    run_handshake(&mut client, &mut server);

    let payload: Vec<u8> = (0..50_000u32).map(|i| (i % 251) as u8).collect();
    let wire = send_all(&mut client, &payload);

    let mut got = Vec::new();
    for piece in wire.chunks(777) {
        server.feed_data(piece);
        got.extend(recv_all(&mut server));
    }
    assert_eq!(got, payload);
}

#[test]
fn outbound_limit_applies_backpressure() {
    init_logging();
    let fx = server_fixture(HOST, PASSWORD);
    let server_ctx = SessionContext::server(&ServerTlsConfig::new(CredentialSource::Pkcs12Bytes {
        der: fx.pfx,
        password: PASSWORD.into(),
    }))
    .unwrap();
    let client_ctx = SessionContext::client(&ClientTlsConfig {
        outbound_limit: Some(1024),
        ..ClientTlsConfig::default()
    })
    .unwrap();
    let mut client = HandshakeEngine::new(&client_ctx).unwrap();
    let mut server = HandshakeEngine::new(&server_ctx).unwrap();
    assert_eq!(client.transport().outbound_limit(), Some(1024));
    run_handshake(&mut client, &mut server);

    let payload = vec![0x5a; 40_000];
    let mut wire = Vec::new();
    let mut sent = 0;
    let mut pushed_back = false;
    while sent < payload.len() {
        match client.encrypt(&payload[sent..]).unwrap() {
            RecordStatus::Done(n) => sent += n,
            RecordStatus::NeedOutputFlushed => {
                pushed_back = true;
                wire.extend_from_slice(&client.take_output());
            }
            other => panic!("unexpected {other:?}"),
        }
    }
    wire.extend_from_slice(&client.take_output());
    assert!(pushed_back);

    server.feed_data(&wire);
    assert_eq!(recv_all(&mut server), payload);
}

// ---------------------------------------------------------------------------
// Close and faults
// ---------------------------------------------------------------------------

#[test]
fn close_twice_is_harmless() {
    let (mut client, mut server) = default_pair();
    run_handshake(&mut client, &mut server);

    client.close();
    let notify = client.take_output();
    client.close();
    assert!(client.is_closed());
    assert!(client.take_output().is_empty());
    assert!(matches!(client.decrypt(&mut [0u8; 8]), Err(Error::Closed)));

    server.feed_data(&notify);
    let mut buf = [0u8; 8];
    assert_eq!(server.decrypt(&mut buf).unwrap(), RecordStatus::PeerClosed);
    assert!(drain_events(&mut server).contains(&EngineEvent::PeerClosed));
    server.close();
    server.close();
    assert!(server.is_closed());
}

#[test]
fn close_mid_handshake() {
    let (mut client, mut server) = default_pair();
    client.advance_handshake().unwrap();
    exchange(&mut client, &mut server);
    server.advance_handshake().unwrap();

    server.close();
    assert!(server.is_closed());
    assert!(matches!(server.advance_handshake(), Err(Error::Closed)));
}

#[test]
fn truncated_record_at_eof_faults() {
    let (mut client, mut server) = default_pair();
    run_handshake(&mut client, &mut server);

    let wire = send_all(&mut client, b"this record will be cut short");
    assert_eq!(server.transport().pending_input(), 0);
    let half = &wire[..wire.len() / 2];
    server.feed_data(half);
    assert_eq!(
        server.decrypt(&mut [0u8; 64]).unwrap(),
        RecordStatus::NeedMoreInput
    );
    // The partial record stays buffered, untouched by the library.
    assert_eq!(server.transport().pending_input(), half.len());
    assert_eq!(server.transport().inbound().peek(), half);

    server.feed_eof();
    let err = server.decrypt(&mut [0u8; 64]).unwrap_err();
    assert!(matches!(err, Error::Protocol { .. }), "{err:?}");
    assert_eq!(server.phase(), Phase::Faulted);
    assert!(matches!(
        server.encrypt(b"x"),
        Err(Error::InvalidState(Phase::Faulted))
    ));
}

#[test]
fn tampered_record_faults() {
    let (mut client, mut server) = default_pair();
    run_handshake(&mut client, &mut server);

    let mut wire = send_all(&mut client, b"integrity matters");
    let last = wire.len() - 1;
    wire[last] ^= 0x01;
    server.feed_data(&wire);
    let err = server.decrypt(&mut [0u8; 64]).unwrap_err();
    assert!(err.is_connection_fatal());
    assert_eq!(server.phase(), Phase::Faulted);
}
