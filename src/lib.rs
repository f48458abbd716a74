pub mod client;
pub mod config;
pub mod console;
pub mod dispatch;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod tcp;
pub mod transport;

#[cfg(test)]
mod testing;

pub use client::{ChatClient, ClientState};
pub use config::{ClientConfig, ServerConfig};
pub use dispatch::Flow;
pub use error::{ChatError, CommandError};
pub use registry::SessionRegistry;
pub use server::ChatServer;
pub use transport::{ChatUi, ClientEvent, ConnId, ServerEvent};
