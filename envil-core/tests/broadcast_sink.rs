use std::thread;
use std::time::{Duration, Instant};

use envil_core::{StatementSink, TcpBroadcast};
use envil_net::{ServerMessage, Subscriber};
use envil_types::Statement;

/// Connect from a helper thread while pumping the sink until it registers.
fn connect(sink: &mut TcpBroadcast) -> Subscriber {
    let addr = sink.local_addr().unwrap().to_string();
    let expected = sink.client_count() + 1;
    let handle = thread::spawn(move || Subscriber::connect(&addr));

    let start = Instant::now();
    while sink.client_count() < expected {
        assert!(
            start.elapsed() < Duration::from_secs(2),
            "Timed out waiting for {} clients (have {})",
            expected,
            sink.client_count()
        );
        sink.pump();
        thread::sleep(Duration::from_millis(5));
    }
    handle.join().unwrap().unwrap()
}

#[test]
fn statements_reach_websocket_subscribers() {
    let mut sink = TcpBroadcast::new("127.0.0.1:0");
    sink.open().unwrap();
    let mut sub = connect(&mut sink);

    for text in ["osc(10).out()", "noise().out()"] {
        assert_eq!(sink.publish(&Statement::new(text).unwrap()), 1);
    }
    assert_eq!(sub.next_statement().unwrap().as_deref(), Some("osc(10).out()"));
    assert_eq!(sub.next_statement().unwrap().as_deref(), Some("noise().out()"));
}

#[test]
fn closing_the_sink_notifies_and_disconnects_subscribers() {
    let mut sink = TcpBroadcast::new("127.0.0.1:0");
    sink.open().unwrap();
    let mut sub = connect(&mut sink);
    sink.close();

    assert!(matches!(sub.recv().unwrap(), ServerMessage::Hello { .. }));
    assert_eq!(sub.recv().unwrap(), ServerMessage::Shutdown);
    assert!(sub.recv().is_err());
    assert_eq!(sink.client_count(), 0);
}
