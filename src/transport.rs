//! Narrow capabilities the chat core needs from a stream transport.
//!
//! The core never owns sockets. It holds `Arc<dyn Peer>` handles for live
//! server-side connections, drives a [`Listener`] or a [`ClientTransport`],
//! and consumes [`ServerEvent`]/[`ClientEvent`] values delivered by whatever
//! implements them (see [`crate::tcp`]).

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use crate::error::ChatError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnId(pub u64);

impl ConnId {
    /// Reserved for the server's own console.
    pub const CONSOLE: ConnId = ConnId(0);
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    ServerConsole,
    Client,
}

/// One live server-side connection.
pub trait Peer: Send + Sync {
    fn id(&self) -> ConnId;

    fn origin(&self) -> Origin {
        Origin::Client
    }

    /// Queue one line for delivery. Must not block on the network; the
    /// transport owns per-send timeouts.
    fn send(&self, line: &str) -> Result<(), ChatError>;

    /// Ask the transport to tear the connection down. A `Disconnected` event
    /// follows asynchronously.
    fn close(&self);

    fn is_connected(&self) -> bool;
}

/// Where user-facing lines end up (a terminal, a test recorder).
pub trait ChatUi: Send + Sync {
    fn display(&self, line: &str);
}

pub enum ServerEvent {
    /// `epoch` is the value handed to the [`Listener::listen`] call that
    /// accepted the connection.
    Connected { peer: Arc<dyn Peer>, epoch: u64 },
    Message { conn: ConnId, line: String },
    Disconnected { conn: ConnId, cause: Option<String> },
}

impl fmt::Debug for ServerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connected { peer, epoch } => f
                .debug_struct("Connected")
                .field("peer", &peer.id())
                .field("epoch", epoch)
                .finish(),
            Self::Message { conn, line } => f
                .debug_struct("Message")
                .field("conn", conn)
                .field("line", line)
                .finish(),
            Self::Disconnected { conn, cause } => f
                .debug_struct("Disconnected")
                .field("conn", conn)
                .field("cause", cause)
                .finish(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    Message(String),
    /// The established connection went away without us closing it.
    ConnectionLost(Option<String>),
}

/// Server side: accepting new connections.
#[async_trait]
pub trait Listener: Send + Sync {
    /// Start accepting on `port`, tagging every accepted connection with
    /// `epoch`.
    async fn listen(&self, port: u16, epoch: u64) -> Result<(), ChatError>;

    /// Stop accepting. Returns once the port is released. Connections
    /// already accepted stay open.
    async fn stop_listening(&self);

    fn is_listening(&self) -> bool;
}

/// Client side: one outbound connection at a time.
#[async_trait]
pub trait ClientTransport: Send + Sync {
    async fn open(&self, host: &str, port: u16) -> Result<(), ChatError>;

    async fn close(&self) -> Result<(), ChatError>;

    async fn send(&self, line: &str) -> Result<(), ChatError>;

    fn is_connected(&self) -> bool;
}
