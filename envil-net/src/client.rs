//! A minimal runtime client: connects to a [`BroadcastServer`](crate::BroadcastServer)
//! over WebSocket and reads statements. Used by tests and by headless tooling.

use std::io;
use std::net::TcpStream;
use std::time::Duration;

use tungstenite::{Message, WebSocket};

use crate::protocol::{ClientMessage, RuntimeClient, ServerMessage};

pub struct Subscriber {
    socket: WebSocket<TcpStream>,
    client: Option<RuntimeClient>,
}

fn ws_error(e: tungstenite::Error) -> io::Error {
    match e {
        tungstenite::Error::Io(e) => e,
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            io::Error::new(io::ErrorKind::ConnectionAborted, "connection closed")
        }
        other => io::Error::new(io::ErrorKind::Other, other.to_string()),
    }
}

impl Subscriber {
    /// Connect and complete the WebSocket handshake.
    ///
    /// Blocks until the server has pumped the connection, so a test driving
    /// the server on the same thread must connect from another one.
    pub fn connect(addr: &str) -> io::Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_read_timeout(Some(Duration::from_secs(5)))?;
        let (socket, _response) = tungstenite::client(format!("ws://{}/", addr), stream)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        Ok(Self {
            socket,
            client: None,
        })
    }

    /// Handle assigned by the server, once its hello has been read.
    pub fn client(&self) -> Option<RuntimeClient> {
        self.client
    }

    /// Next server message. A closed connection is `ConnectionAborted`.
    pub fn recv(&mut self) -> io::Result<ServerMessage> {
        loop {
            match self.socket.read().map_err(ws_error)? {
                Message::Text(text) => {
                    let msg: ServerMessage = serde_json::from_str(&text)
                        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                    if let ServerMessage::Hello { client } = msg {
                        self.client = Some(client);
                    }
                    return Ok(msg);
                }
                Message::Close(_) => {
                    return Err(io::Error::new(
                        io::ErrorKind::ConnectionAborted,
                        "server closed the connection",
                    ))
                }
                _ => {}
            }
        }
    }

    /// Next statement text, skipping control messages. `None` on server shutdown.
    pub fn next_statement(&mut self) -> io::Result<Option<String>> {
        loop {
            match self.recv()? {
                ServerMessage::NewCommand { data } => return Ok(Some(data)),
                ServerMessage::Shutdown => return Ok(None),
                ServerMessage::Hello { .. } | ServerMessage::Pong => {}
            }
        }
    }

    fn send(&mut self, msg: &ClientMessage) -> io::Result<()> {
        let text = serde_json::to_string(msg)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        self.socket.send(Message::Text(text)).map_err(ws_error)
    }

    pub fn ping(&mut self) -> io::Result<()> {
        self.send(&ClientMessage::Ping)
    }

    pub fn goodbye(mut self) -> io::Result<()> {
        self.send(&ClientMessage::Goodbye)
    }
}
