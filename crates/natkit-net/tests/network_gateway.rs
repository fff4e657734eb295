use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::time::Duration;

use natkit_core::bus::channel;
use natkit_net::{GatewayConfig, NetworkGateway, NetworkEvent, NetworkRequest};

fn loopback(port: u16) -> SocketAddr {
    format!("127.0.0.1:{port}").parse().unwrap()
}

fn recv_timeout(inbox: &natkit_core::bus::Inbox<NetworkEvent>) -> NetworkEvent {
    match inbox.recv_timeout(Duration::from_secs(5)) {
        natkit_core::bus::RecvOutcome::Message(event) => event,
        natkit_core::bus::RecvOutcome::Timeout => panic!("timed out waiting for event"),
        natkit_core::bus::RecvOutcome::Disconnected => panic!("bus disconnected unexpectedly"),
    }
}

#[test]
fn udp_echo_round_trip() {
    let (handle, _join) = NetworkGateway::spawn(GatewayConfig::default());
    let (response_bus, inbox) = channel();

    handle
        .send(NetworkRequest::CreateUdp {
            source: loopback(0),
            response_bus: response_bus.clone(),
        })
        .unwrap();
    let id = match recv_timeout(&inbox) {
        NetworkEvent::CreateUdpResponse(id) => id,
        other => panic!("unexpected event: {other:?}"),
    };

    // A second socket plays the remote peer.
    let peer = std::net::UdpSocket::bind(loopback(0)).unwrap();
    let peer_addr = peer.local_addr().unwrap();

    handle
        .send(NetworkRequest::WriteUdp {
            id,
            remote: peer_addr,
            bytes: b"ping".to_vec(),
        })
        .unwrap();
    // A freshly registered socket with an empty outgoing queue already
    // satisfies the write-empty hysteresis, so the reactor may post one
    // WriteEmptyUdp the moment the socket is registered, before this
    // WriteUdp request is even dequeued. Ignore any WriteEmptyUdp that
    // arrives ahead of the real WriteUdpResponse; only the one that
    // follows it closes out this drain cycle.
    let mut saw_write_response = false;
    loop {
        match recv_timeout(&inbox) {
            NetworkEvent::WriteUdpResponse(got_id, n) => {
                assert_eq!(got_id, id);
                assert_eq!(n, 4);
                saw_write_response = true;
            }
            NetworkEvent::WriteEmptyUdp(got_id) => {
                assert_eq!(got_id, id);
                if saw_write_response {
                    break;
                }
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    let mut buf = [0u8; 16];
    let (n, from) = peer.recv_from(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"ping");
    peer.send_to(b"pong", from).unwrap();

    match recv_timeout(&inbox) {
        NetworkEvent::ReadUdp(got_id, _local, remote, payload) => {
            assert_eq!(got_id, id);
            assert_eq!(remote, peer_addr);
            assert_eq!(payload, b"pong");
        }
        other => panic!("unexpected event: {other:?}"),
    }

    handle
        .send(NetworkRequest::Close {
            id,
            response_bus: response_bus.clone(),
        })
        .unwrap();
    match recv_timeout(&inbox) {
        NetworkEvent::CloseResponse(got_id) => assert_eq!(got_id, id),
        other => panic!("unexpected event: {other:?}"),
    }
}

#[test]
fn tcp_connect_and_write_drain() {
    let (handle, _join) = NetworkGateway::spawn(GatewayConfig::default());
    let (response_bus, inbox) = channel();

    let listener = StdTcpListener::bind(loopback(0)).unwrap();
    let listener_addr = listener.local_addr().unwrap();

    handle
        .send(NetworkRequest::CreateTcp {
            source: loopback(0),
            destination: listener_addr,
            response_bus: response_bus.clone(),
        })
        .unwrap();
    let id = match recv_timeout(&inbox) {
        NetworkEvent::CreateTcpResponse(id) => id,
        other => panic!("unexpected event: {other:?}"),
    };

    let (mut server_stream, _) = listener.accept().unwrap();

    match recv_timeout(&inbox) {
        NetworkEvent::ConnectedTcp(got_id) => assert_eq!(got_id, id),
        other => panic!("unexpected event: {other:?}"),
    }

    let payload = vec![7u8; 10 * 1024];
    handle
        .send(NetworkRequest::WriteTcp {
            id,
            bytes: payload.clone(),
        })
        .unwrap();

    // Drain the peer concurrently so the kernel send buffer never backs up
    // long enough to time the test out; the property under test is that
    // Write-TCP-Response bytes sum to the full request and exactly one
    // Write-Empty-TCP-Notification follows.
    let drain = std::thread::spawn(move || {
        use std::io::Read;
        let mut total = 0usize;
        let mut buf = [0u8; 4096];
        while total < payload.len() {
            let n = server_stream.read(&mut buf).unwrap();
            assert!(n > 0);
            total += n;
        }
        total
    });

    // As in the UDP case, the just-connected socket may already owe one
    // WriteEmptyTcp from registration before any byte of this write has
    // gone out; only the WriteEmptyTcp that arrives once `written` has
    // reached the full payload size closes out this drain cycle.
    let mut written = 0usize;
    loop {
        match recv_timeout(&inbox) {
            NetworkEvent::WriteTcpResponse(got_id, n) => {
                assert_eq!(got_id, id);
                written += n;
            }
            NetworkEvent::WriteEmptyTcp(got_id) => {
                assert_eq!(got_id, id);
                if written == payload.len() {
                    break;
                }
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
    assert_eq!(written, 10 * 1024);
    assert_eq!(drain.join().unwrap(), 10 * 1024);
}

#[test]
fn tcp_connect_failure_yields_single_identifiable_error() {
    let (handle, _join) = NetworkGateway::spawn(GatewayConfig::default());
    let (response_bus, inbox) = channel();

    // Bind a socket just to reserve a port nobody is listening on, then
    // drop it so the connect fails with ECONNREFUSED instead of timing out.
    let reserved = StdTcpListener::bind(loopback(0)).unwrap();
    let dead_addr = reserved.local_addr().unwrap();
    drop(reserved);

    handle
        .send(NetworkRequest::CreateTcp {
            source: loopback(0),
            destination: dead_addr,
            response_bus: response_bus.clone(),
        })
        .unwrap();
    let id = match recv_timeout(&inbox) {
        NetworkEvent::CreateTcpResponse(id) => id,
        other => panic!("unexpected event: {other:?}"),
    };

    match recv_timeout(&inbox) {
        NetworkEvent::IdentifiableError(err) => assert_eq!(err.id, id),
        other => panic!("expected IdentifiableError, got {other:?}"),
    }
}

#[test]
fn kill_sweeps_every_live_entry() {
    let (handle, join) = NetworkGateway::spawn(GatewayConfig::default());
    let (response_bus, inbox) = channel();

    let mut ids = Vec::new();
    for _ in 0..3 {
        handle
            .send(NetworkRequest::CreateUdp {
                source: loopback(0),
                response_bus: response_bus.clone(),
            })
            .unwrap();
        match recv_timeout(&inbox) {
            NetworkEvent::CreateUdpResponse(id) => ids.push(id),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    let listener = StdTcpListener::bind(loopback(0)).unwrap();
    let listener_addr = listener.local_addr().unwrap();
    handle
        .send(NetworkRequest::CreateTcp {
            source: loopback(0),
            destination: listener_addr,
            response_bus: response_bus.clone(),
        })
        .unwrap();
    match recv_timeout(&inbox) {
        NetworkEvent::CreateTcpResponse(id) => ids.push(id),
        other => panic!("unexpected event: {other:?}"),
    }

    handle.send(NetworkRequest::Kill).unwrap();
    join.join().unwrap();

    let mut seen = Vec::new();
    while seen.len() < ids.len() {
        match recv_timeout(&inbox) {
            NetworkEvent::IdentifiableError(err) => seen.push(err.id),
            NetworkEvent::ConnectedTcp(_) => continue,
            other => panic!("unexpected event: {other:?}"),
        }
    }
    seen.sort_unstable();
    let mut expected = ids.clone();
    expected.sort_unstable();
    assert_eq!(seen, expected);
}

#[test]
fn local_addresses_excludes_loopback() {
    let (handle, _join) = NetworkGateway::spawn(GatewayConfig::default());
    let (response_bus, inbox) = channel();

    handle
        .send(NetworkRequest::GetLocalIpAddresses { response_bus })
        .unwrap();
    match recv_timeout(&inbox) {
        NetworkEvent::LocalAddresses(addrs) => {
            assert!(addrs.iter().all(|ip| !ip.is_loopback()));
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[test]
fn write_empty_fires_once_per_drain_cycle() {
    let (handle, _join) = NetworkGateway::spawn(GatewayConfig::default());
    let (response_bus, inbox) = channel();

    let peer = std::net::UdpSocket::bind(loopback(0)).unwrap();
    let peer_addr = peer.local_addr().unwrap();

    handle
        .send(NetworkRequest::CreateUdp {
            source: loopback(0),
            response_bus: response_bus.clone(),
        })
        .unwrap();
    let id = match recv_timeout(&inbox) {
        NetworkEvent::CreateUdpResponse(id) => id,
        other => panic!("unexpected event: {other:?}"),
    };

    // First drain cycle: three writes, then exactly one WriteEmptyUdp.
    for _ in 0..3 {
        handle
            .send(NetworkRequest::WriteUdp {
                id,
                remote: peer_addr,
                bytes: b"x".to_vec(),
            })
            .unwrap();
    }
    // As with the echo test, the fresh socket may already owe one
    // WriteEmptyUdp from registration before any of these three writes
    // land; only the one that arrives once all three responses are in
    // closes out this cycle.
    let mut write_responses = 0;
    loop {
        match recv_timeout(&inbox) {
            NetworkEvent::WriteUdpResponse(got_id, _) => {
                assert_eq!(got_id, id);
                write_responses += 1;
            }
            NetworkEvent::WriteEmptyUdp(got_id) => {
                assert_eq!(got_id, id);
                if write_responses == 3 {
                    break;
                }
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
    assert_eq!(write_responses, 3);

    // No second WriteEmptyUdp should appear for this same (already-empty)
    // cycle — give the reactor a few idle ticks to prove it stays quiet.
    std::thread::sleep(Duration::from_millis(400));
    assert!(matches!(
        inbox.recv_timeout(Duration::from_millis(50)),
        natkit_core::bus::RecvOutcome::Timeout
    ));

    // A fresh write starts a new drain cycle and fires exactly one more.
    handle
        .send(NetworkRequest::WriteUdp {
            id,
            remote: peer_addr,
            bytes: b"y".to_vec(),
        })
        .unwrap();
    match recv_timeout(&inbox) {
        NetworkEvent::WriteUdpResponse(got_id, _) => assert_eq!(got_id, id),
        other => panic!("unexpected event: {other:?}"),
    }
    match recv_timeout(&inbox) {
        NetworkEvent::WriteEmptyUdp(got_id) => assert_eq!(got_id, id),
        other => panic!("unexpected event: {other:?}"),
    }
}

#[test]
fn tcp_bytes_arrive_in_submission_order() {
    let (handle, _join) = NetworkGateway::spawn(GatewayConfig::default());
    let (response_bus, inbox) = channel();

    let listener = StdTcpListener::bind(loopback(0)).unwrap();
    let listener_addr = listener.local_addr().unwrap();

    handle
        .send(NetworkRequest::CreateTcp {
            source: loopback(0),
            destination: listener_addr,
            response_bus: response_bus.clone(),
        })
        .unwrap();
    let id = match recv_timeout(&inbox) {
        NetworkEvent::CreateTcpResponse(id) => id,
        other => panic!("unexpected event: {other:?}"),
    };
    let (mut server_stream, _) = listener.accept().unwrap();
    match recv_timeout(&inbox) {
        NetworkEvent::ConnectedTcp(got_id) => assert_eq!(got_id, id),
        other => panic!("unexpected event: {other:?}"),
    }

    let chunks: Vec<Vec<u8>> = (0..20u8).map(|i| vec![i; 37]).collect();
    for chunk in &chunks {
        handle
            .send(NetworkRequest::WriteTcp {
                id,
                bytes: chunk.clone(),
            })
            .unwrap();
    }

    let expected: Vec<u8> = chunks.concat();
    let mut received = Vec::new();
    use std::io::Read;
    let mut buf = [0u8; 4096];
    while received.len() < expected.len() {
        let n = server_stream.read(&mut buf).unwrap();
        assert!(n > 0);
        received.extend_from_slice(&buf[..n]);
    }
    assert_eq!(received, expected);
}
