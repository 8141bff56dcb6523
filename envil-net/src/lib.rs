//! Broadcast channel for ENVIL visual live coding.
//!
//! Completed statements are fanned out to every connected runtime client
//! (typically a browser page driving a visual synthesizer) as
//! `{"event":"new-command","data":...}` WebSocket text messages.

pub mod channel;
pub mod client;
pub mod protocol;
pub mod server;

pub use channel::{BroadcastChannel, ClientQueue, RuntimeSink};
pub use client::Subscriber;
pub use protocol::{ClientMessage, RuntimeClient, ServerMessage};
pub use server::BroadcastServer;
