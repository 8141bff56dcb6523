#![allow(dead_code)]
//! Test harness utilities for envil-net integration tests.

use std::time::{Duration, Instant};

use envil_net::server::BroadcastServer;
use envil_net::Subscriber;

/// Bind a server on an ephemeral loopback port.
pub fn bind_server() -> (BroadcastServer, String) {
    let server = BroadcastServer::bind("127.0.0.1:0").unwrap();
    let addr = server.local_addr().unwrap().to_string();
    (server, addr)
}

/// Pump the server until the expected client count is reached, or panic on timeout.
pub fn drive_until_clients(server: &mut BroadcastServer, expected: usize, timeout: Duration) {
    let start = Instant::now();
    while start.elapsed() < timeout {
        server.pump();
        if server.client_count() == expected {
            return;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    panic!(
        "Timed out waiting for {} clients (have {})",
        expected,
        server.client_count()
    );
}

/// Connect a subscriber without reading anything from it.
///
/// The handshake needs the server pumped, so the client connects from a
/// helper thread while this one drives the server.
pub fn connect_silent(server: &mut BroadcastServer, addr: &str) -> Subscriber {
    let expected = server.client_count() + 1;
    let addr = addr.to_string();
    let handle = std::thread::spawn(move || Subscriber::connect(&addr));
    drive_until_clients(server, expected, Duration::from_secs(2));
    handle.join().unwrap().unwrap()
}

/// Connect a subscriber, register it, and consume its hello.
pub fn connect_subscriber(server: &mut BroadcastServer, addr: &str) -> Subscriber {
    let mut sub = connect_silent(server, addr);
    let hello = sub.recv().unwrap();
    assert!(
        matches!(hello, envil_net::ServerMessage::Hello { .. }),
        "Expected Hello, got {:?}",
        hello
    );
    sub
}
