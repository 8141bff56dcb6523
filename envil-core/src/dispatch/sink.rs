//! Where segmented statements go.

use std::net::SocketAddr;

use log::{info, warn};

use envil_net::{BroadcastChannel, BroadcastServer};
use envil_types::{DispatchError, Statement};

/// Destination for published statements, brought up and down with the environment.
pub trait StatementSink: Send {
    /// Make the sink ready to accept clients. Opening twice is a no-op.
    fn open(&mut self) -> Result<(), DispatchError>;

    /// Drop every client. The sink may be opened again.
    fn close(&mut self);

    /// Fan one statement out; returns how many clients it reached.
    fn publish(&mut self, statement: &Statement) -> usize;

    /// Service connections between commands.
    fn pump(&mut self) {}

    fn client_count(&self) -> usize;
}

impl StatementSink for BroadcastChannel {
    fn open(&mut self) -> Result<(), DispatchError> {
        Ok(())
    }

    fn close(&mut self) {
        self.clear();
    }

    fn publish(&mut self, statement: &Statement) -> usize {
        BroadcastChannel::publish(self, statement)
    }

    fn client_count(&self) -> usize {
        BroadcastChannel::client_count(self)
    }
}

/// TCP broadcast server bound while the environment is active.
pub struct TcpBroadcast {
    addr: String,
    server: Option<BroadcastServer>,
}

impl TcpBroadcast {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            server: None,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn is_open(&self) -> bool {
        self.server.is_some()
    }

    /// Bound address while open; differs from `addr` when binding port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.as_ref().and_then(|s| s.local_addr().ok())
    }
}

impl StatementSink for TcpBroadcast {
    fn open(&mut self) -> Result<(), DispatchError> {
        if self.server.is_some() {
            return Ok(());
        }
        match BroadcastServer::bind(&self.addr) {
            Ok(server) => {
                self.server = Some(server);
                Ok(())
            }
            Err(e) => {
                warn!(target: "broadcast", "failed to bind {}: {}", self.addr, e);
                Err(DispatchError::Broadcast(format!("cannot listen on {}: {}", self.addr, e)))
            }
        }
    }

    fn close(&mut self) {
        if let Some(mut server) = self.server.take() {
            server.shutdown();
            info!(target: "broadcast", "closed {}", self.addr);
        }
    }

    fn publish(&mut self, statement: &Statement) -> usize {
        self.server.as_mut().map_or(0, |s| s.publish(statement))
    }

    fn pump(&mut self) {
        if let Some(server) = self.server.as_mut() {
            server.pump();
        }
    }

    fn client_count(&self) -> usize {
        self.server.as_ref().map_or(0, |s| s.client_count())
    }
}
