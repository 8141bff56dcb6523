//! Client registry and fan-out publish.

use std::collections::HashMap;
use std::io;
use std::sync::mpsc::Sender;

use crossbeam_channel::TrySendError;
use log::{debug, info, warn};

use envil_types::Statement;

use crate::protocol::{RuntimeClient, ServerMessage};

/// Where messages for one runtime client are written.
pub trait RuntimeSink: Send {
    fn send(&mut self, msg: &ServerMessage) -> io::Result<()>;
}

/// Bounded queue feeding one client's writer thread. Never blocks.
///
/// A full queue means the client has stopped reading; the send fails and the
/// channel drops the client.
pub struct ClientQueue {
    tx: crossbeam_channel::Sender<ServerMessage>,
}

impl ClientQueue {
    pub fn new(tx: crossbeam_channel::Sender<ServerMessage>) -> Self {
        Self { tx }
    }
}

impl RuntimeSink for ClientQueue {
    fn send(&mut self, msg: &ServerMessage) -> io::Result<()> {
        self.tx.try_send(msg.clone()).map_err(|e| match e {
            TrySendError::Full(_) => {
                io::Error::new(io::ErrorKind::WouldBlock, "client send queue is full")
            }
            TrySendError::Disconnected(_) => {
                io::Error::new(io::ErrorKind::BrokenPipe, "client writer has exited")
            }
        })
    }
}

/// In-process subscriber. Fails once the receiving end is dropped.
impl RuntimeSink for Sender<ServerMessage> {
    fn send(&mut self, msg: &ServerMessage) -> io::Result<()> {
        Sender::send(self, msg.clone())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "subscriber dropped"))
    }
}

/// Fan-out channel to zero or more runtime clients.
///
/// Nothing is buffered: a client only sees publishes made while registered.
#[derive(Default)]
pub struct BroadcastChannel {
    clients: HashMap<RuntimeClient, Box<dyn RuntimeSink>>,
    next_client_id: u64,
}

impl BroadcastChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber and hand back its handle.
    pub fn register(&mut self, sink: Box<dyn RuntimeSink>) -> RuntimeClient {
        let client = RuntimeClient::new(self.next_client_id);
        self.next_client_id += 1;
        self.clients.insert(client, sink);
        info!(target: "broadcast", "{} connected ({} total)", client, self.clients.len());
        client
    }

    /// Drop a subscriber. Unknown handles are ignored.
    pub fn unregister(&mut self, client: RuntimeClient) {
        if self.clients.remove(&client).is_some() {
            info!(target: "broadcast", "{} disconnected ({} left)", client, self.clients.len());
        }
    }

    pub fn is_registered(&self, client: RuntimeClient) -> bool {
        self.clients.contains_key(&client)
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Push a statement to every registered client as a `new-command` event.
    ///
    /// Returns how many clients it reached.
    pub fn publish(&mut self, statement: &Statement) -> usize {
        debug!(target: "broadcast", "new-command: {}", statement);
        self.broadcast(&ServerMessage::new_command(statement.as_str()))
    }

    /// Send to one client; a failed send unregisters it.
    pub fn send_to(&mut self, client: RuntimeClient, msg: &ServerMessage) -> bool {
        let failed = match self.clients.get_mut(&client) {
            Some(sink) => match sink.send(msg) {
                Ok(()) => return true,
                Err(e) => {
                    warn!(target: "broadcast", "failed to send to {}: {}", client, e);
                    true
                }
            },
            None => false,
        };
        if failed {
            self.unregister(client);
        }
        false
    }

    /// Send to all clients, dropping any whose send fails.
    pub fn broadcast(&mut self, msg: &ServerMessage) -> usize {
        let mut disconnected = Vec::new();
        let mut delivered = 0;

        for (client, sink) in &mut self.clients {
            match sink.send(msg) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(target: "broadcast", "failed to send to {}: {}", client, e);
                    disconnected.push(*client);
                }
            }
        }

        for client in disconnected {
            self.unregister(client);
        }
        delivered
    }

    /// Remove every client without notifying them. Dropping a client's sink
    /// closes its connection once queued messages are written.
    pub fn clear(&mut self) {
        self.clients.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::{self, Receiver};

    fn subscriber(channel: &mut BroadcastChannel) -> (RuntimeClient, Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel();
        (channel.register(Box::new(tx)), rx)
    }

    fn statement(text: &str) -> Statement {
        Statement::new(text).unwrap()
    }

    #[test]
    fn publish_reaches_every_client_in_order() {
        let mut channel = BroadcastChannel::new();
        let (_, a) = subscriber(&mut channel);
        let (_, b) = subscriber(&mut channel);

        assert_eq!(channel.publish(&statement("foo()")), 2);
        assert_eq!(channel.publish(&statement("bar()")), 2);

        for rx in [a, b] {
            let got: Vec<_> = rx.try_iter().collect();
            assert_eq!(
                got,
                vec![ServerMessage::new_command("foo()"), ServerMessage::new_command("bar()")]
            );
        }
    }

    #[test]
    fn publish_with_no_clients_is_fine() {
        let mut channel = BroadcastChannel::new();
        assert_eq!(channel.publish(&statement("osc().out()")), 0);
    }

    #[test]
    fn late_subscriber_gets_no_replay() {
        let mut channel = BroadcastChannel::new();
        channel.publish(&statement("first()"));
        let (_, rx) = subscriber(&mut channel);
        channel.publish(&statement("second()"));
        let got: Vec<_> = rx.try_iter().collect();
        assert_eq!(got, vec![ServerMessage::new_command("second()")]);
    }

    #[test]
    fn unregister_stops_delivery() {
        let mut channel = BroadcastChannel::new();
        let (id, rx) = subscriber(&mut channel);
        channel.unregister(id);
        channel.unregister(id);
        assert_eq!(channel.publish(&statement("x()")), 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn dropped_receiver_is_pruned_on_publish() {
        let mut channel = BroadcastChannel::new();
        let (gone, rx) = subscriber(&mut channel);
        let (_, kept) = subscriber(&mut channel);
        drop(rx);

        assert_eq!(channel.publish(&statement("x()")), 1);
        assert!(!channel.is_registered(gone));
        assert_eq!(channel.client_count(), 1);
        assert_eq!(kept.try_recv().unwrap(), ServerMessage::new_command("x()"));
    }

    #[test]
    fn full_queue_fails_without_blocking() {
        let mut channel = BroadcastChannel::new();
        let (tx, rx) = crossbeam_channel::bounded(2);
        let stalled = channel.register(Box::new(ClientQueue::new(tx)));

        assert_eq!(channel.publish(&statement("a()")), 1);
        assert_eq!(channel.publish(&statement("b()")), 1);
        assert_eq!(channel.publish(&statement("c()")), 0);
        assert!(!channel.is_registered(stalled));
        assert_eq!(rx.len(), 2);
    }

    #[test]
    fn exited_writer_is_pruned() {
        let mut channel = BroadcastChannel::new();
        let (tx, rx) = crossbeam_channel::bounded(4);
        channel.register(Box::new(ClientQueue::new(tx)));
        drop(rx);
        assert_eq!(channel.publish(&statement("x()")), 0);
        assert_eq!(channel.client_count(), 0);
    }

    #[test]
    fn handles_are_not_reused() {
        let mut channel = BroadcastChannel::new();
        let (first, _rx1) = subscriber(&mut channel);
        channel.unregister(first);
        let (second, _rx2) = subscriber(&mut channel);
        assert_ne!(first, second);
    }
}
