//! Wire protocol between the broadcast server and runtime clients.

use serde::{Deserialize, Serialize};

/// Handle for one connected runtime client, valid for its connection lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuntimeClient(pub u64);

impl RuntimeClient {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for RuntimeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "client#{}", self.0)
    }
}

/// Messages from server to runtime clients, tagged by event name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum ServerMessage {
    /// Sent once right after a client is registered.
    #[serde(rename = "hello")]
    Hello { client: RuntimeClient },
    /// A statement to execute.
    #[serde(rename = "new-command")]
    NewCommand { data: String },
    #[serde(rename = "pong")]
    Pong,
    #[serde(rename = "shutdown")]
    Shutdown,
}

impl ServerMessage {
    pub fn new_command(data: impl Into<String>) -> Self {
        Self::NewCommand { data: data.into() }
    }
}

/// Messages from runtime clients to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ClientMessage {
    Ping,
    Goodbye,
}
