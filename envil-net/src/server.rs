//! WebSocket transport for the broadcast channel.
//!
//! The listener is non-blocking and polled from the host loop via [`BroadcastServer::pump`].
//! Each accepted connection finishes its WebSocket handshake on its own thread.
//! A registered client then gets a reader thread that reports pings and
//! disconnects over an mpsc channel, and a writer thread fed by a bounded
//! queue, so a client that stops reading never stalls a publish.

use std::io;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;

use log::{debug, error, info, warn};
use tungstenite::protocol::Role;
use tungstenite::{Message, WebSocket};

use envil_types::Statement;

use crate::channel::{BroadcastChannel, ClientQueue};
use crate::protocol::{ClientMessage, RuntimeClient, ServerMessage};

/// Messages buffered per client before it counts as stalled.
pub const CLIENT_QUEUE_DEPTH: usize = 64;

/// How long a peer may take to send its upgrade request.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// How long one socket write may block before the client is given up on.
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Something a connection thread observed.
enum ClientEvent {
    Connected(WebSocket<TcpStream>, SocketAddr),
    Message(RuntimeClient, ClientMessage),
    Disconnected(RuntimeClient),
}

/// Broadcast server accepting runtime clients on one TCP port.
pub struct BroadcastServer {
    listener: TcpListener,
    channel: BroadcastChannel,
    event_rx: Receiver<ClientEvent>,
    event_tx: Sender<ClientEvent>,
}

impl BroadcastServer {
    /// Bind the server to an address such as `127.0.0.1:3001`.
    pub fn bind(addr: &str) -> io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;

        let (event_tx, event_rx) = mpsc::channel();

        info!(target: "broadcast", "listening on ws://{}", listener.local_addr()?);

        Ok(Self {
            listener,
            channel: BroadcastChannel::new(),
            event_rx,
            event_tx,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept pending connections and apply client events.
    pub fn pump(&mut self) {
        self.accept_connections();
        self.poll_events();
    }

    /// Hand every pending TCP connection to a handshake thread.
    pub fn accept_connections(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, addr)) => {
                    let event_tx = self.event_tx.clone();
                    thread::spawn(move || handshake_thread(stream, addr, event_tx));
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    error!(target: "broadcast", "accept error: {}", e);
                    break;
                }
            }
        }
    }

    fn register_socket(&mut self, socket: WebSocket<TcpStream>) -> io::Result<RuntimeClient> {
        let stream = socket.get_ref();
        stream.set_write_timeout(Some(WRITE_TIMEOUT))?;
        let writer = WebSocket::from_raw_socket(stream.try_clone()?, Role::Server, None);

        let (queue_tx, queue_rx) = crossbeam_channel::bounded(CLIENT_QUEUE_DEPTH);
        let client = self.channel.register(Box::new(ClientQueue::new(queue_tx)));
        self.channel.send_to(client, &ServerMessage::Hello { client });

        thread::spawn(move || client_writer_thread(client, writer, queue_rx));
        let event_tx = self.event_tx.clone();
        thread::spawn(move || client_reader_thread(client, socket, event_tx));
        Ok(client)
    }

    /// Drain connection events: register handshaken clients, answer pings,
    /// unregister departed clients.
    pub fn poll_events(&mut self) {
        while let Ok(event) = self.event_rx.try_recv() {
            match event {
                ClientEvent::Connected(socket, peer) => match self.register_socket(socket) {
                    Ok(client) => info!(target: "broadcast", "{} connected from {}", client, peer),
                    Err(e) => {
                        error!(target: "broadcast", "failed to register client from {}: {}", peer, e)
                    }
                },
                ClientEvent::Message(client, ClientMessage::Ping) => {
                    self.channel.send_to(client, &ServerMessage::Pong);
                }
                ClientEvent::Message(client, ClientMessage::Goodbye)
                | ClientEvent::Disconnected(client) => {
                    self.channel.unregister(client);
                }
            }
        }
    }

    /// Publish a statement to every connected client.
    pub fn publish(&mut self, statement: &Statement) -> usize {
        self.channel.publish(statement)
    }

    pub fn client_count(&self) -> usize {
        self.channel.client_count()
    }

    pub fn channel_mut(&mut self) -> &mut BroadcastChannel {
        &mut self.channel
    }

    /// Tell every client the server is going away, then drop them.
    ///
    /// Each connection is closed after its writer has sent the notice.
    pub fn shutdown(&mut self) {
        let notified = self.channel.broadcast(&ServerMessage::Shutdown);
        self.channel.clear();
        info!(target: "broadcast", "server closed, {} clients notified", notified);
    }
}

impl Drop for BroadcastServer {
    fn drop(&mut self) {
        if self.channel.client_count() > 0 {
            self.shutdown();
        }
    }
}

/// Completes the server side of the WebSocket upgrade.
fn handshake_thread(stream: TcpStream, peer: SocketAddr, event_tx: Sender<ClientEvent>) {
    // accepted sockets inherit O_NONBLOCK on some platforms
    let prepared = stream
        .set_nonblocking(false)
        .and_then(|_| stream.set_nodelay(true))
        .and_then(|_| stream.set_read_timeout(Some(HANDSHAKE_TIMEOUT)));
    if let Err(e) = prepared {
        warn!(target: "broadcast", "cannot configure connection from {}: {}", peer, e);
        return;
    }

    match tungstenite::accept(stream) {
        Ok(socket) => {
            if let Err(e) = socket.get_ref().set_read_timeout(None) {
                warn!(target: "broadcast", "cannot configure connection from {}: {}", peer, e);
                return;
            }
            let _ = event_tx.send(ClientEvent::Connected(socket, peer));
        }
        Err(e) => warn!(target: "broadcast", "handshake with {} failed: {}", peer, e),
    }
}

/// Writes queued messages until the client is dropped or a write fails,
/// then closes the connection.
fn client_writer_thread(
    client: RuntimeClient,
    mut socket: WebSocket<TcpStream>,
    queue: crossbeam_channel::Receiver<ServerMessage>,
) {
    for msg in queue.iter() {
        let text = match serde_json::to_string(&msg) {
            Ok(text) => text,
            Err(e) => {
                error!(target: "broadcast", "cannot encode message for {}: {}", client, e);
                continue;
            }
        };
        if let Err(e) = socket.send(Message::Text(text)) {
            warn!(target: "broadcast", "{} write failed: {}", client, e);
            break;
        }
    }

    let _ = socket.close(None);
    let _ = socket.flush();
    // also wakes the reader thread blocked on the other handle
    let _ = socket.get_ref().shutdown(Shutdown::Both);
    debug!(target: "broadcast", "{} writer exiting", client);
}

/// Reads client messages until goodbye, close, or error.
fn client_reader_thread(
    client: RuntimeClient,
    mut socket: WebSocket<TcpStream>,
    event_tx: Sender<ClientEvent>,
) {
    loop {
        match socket.read() {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(msg) => {
                    let is_goodbye = msg == ClientMessage::Goodbye;
                    if event_tx.send(ClientEvent::Message(client, msg)).is_err() || is_goodbye {
                        break;
                    }
                }
                Err(e) => warn!(target: "broadcast", "{} sent an unknown message: {}", client, e),
            },
            Ok(Message::Close(_)) => {
                let _ = event_tx.send(ClientEvent::Disconnected(client));
                break;
            }
            Ok(_) => {}
            Err(e) => {
                match e {
                    tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {}
                    other => debug!(target: "broadcast", "{} read ended: {}", client, other),
                }
                let _ = event_tx.send(ClientEvent::Disconnected(client));
                break;
            }
        }
    }
}
