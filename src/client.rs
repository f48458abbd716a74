use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::ClientConfig;
use crate::error::ChatError;
use crate::protocol;
use crate::transport::ClientTransport;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientState {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub server_role: bool,
    pub connected: bool,
}

pub struct ChatClient<T> {
    transport: T,
    transition: Mutex<()>,
    state: RwLock<ClientState>,
}

impl<T: ClientTransport> ChatClient<T> {
    pub fn new(transport: T, config: &ClientConfig) -> Self {
        Self {
            transport,
            transition: Mutex::new(()),
            state: RwLock::new(ClientState {
                host: config.host.clone(),
                port: config.port,
                username: config.username.clone(),
                server_role: config.server_role,
                connected: false,
            }),
        }
    }

    pub async fn connect(&self) -> Result<(), ChatError> {
        let _guard = self.transition.lock().await;

        self.open_locked().await
    }

    pub async fn login(&self, username: Option<&str>) -> Result<(), ChatError> {
        let _guard = self.transition.lock().await;

        if self.state.read().connected {
            return Err(ChatError::InvalidState(
                "You first must log out (#logoff) before you can log in again".into(),
            ));
        }

        if let Some(name) = username {
            self.state.write().username = Some(name.to_string());
        }

        self.open_locked().await
    }

    async fn open_locked(&self) -> Result<(), ChatError> {
        let state = self.state.read().clone();

        if state.connected {
            return Err(ChatError::InvalidState(
                "You first must log out (#logoff) before you can log in again".into(),
            ));
        }

        let login = match (&state.username, state.server_role) {
            (_, true) => None,
            (Some(name), false) if !name.trim().is_empty() => Some(protocol::login_line(name)),
            _ => {
                return Err(ChatError::Usage(
                    "A login id is required before connecting: #login <loginid>".into(),
                ));
            }
        };

        self.transport
            .open(&state.host, state.port)
            .await
            .map_err(|err| {
                warn!(host = %state.host, port = state.port, error = %err, "connect failed");
                ChatError::Transport("Couldn't connect to the server. Try again.".into())
            })?;

        if let Some(login) = login {
            if let Err(err) = self.transport.send(&login).await {
                warn!(error = %err, "login send failed");
                let _ = self.transport.close().await;
                return Err(ChatError::Transport(
                    "Couldn't connect to the server. Try again.".into(),
                ));
            }
        }

        self.state.write().connected = true;

        info!(host = %state.host, port = state.port, username = ?state.username, "connected");

        Ok(())
    }

    pub async fn disconnect(&self) -> Result<(), ChatError> {
        let _guard = self.transition.lock().await;

        if !self.state.read().connected {
            return Err(ChatError::InvalidState("Not connected to a server".into()));
        }

        self.state.write().connected = false;

        self.transport.close().await.map_err(|err| {
            warn!(error = %err, "close failed");
            ChatError::Transport("Unable to disconnect from server".into())
        })?;

        info!("disconnected");

        Ok(())
    }

    pub async fn quit(&self) -> Result<(), ChatError> {
        match self.disconnect().await {
            Err(ChatError::InvalidState(_)) => Ok(()),
            other => other,
        }
    }

    pub async fn set_host(&self, host: &str) -> Result<(), ChatError> {
        let _guard = self.transition.lock().await;

        let mut state = self.state.write();

        if state.connected {
            return Err(ChatError::InvalidState(
                "You must log out (#logoff) before setting a host".into(),
            ));
        }

        state.host = host.to_string();

        Ok(())
    }

    pub async fn set_port(&self, port: u16) -> Result<(), ChatError> {
        let _guard = self.transition.lock().await;

        let mut state = self.state.write();

        if state.connected {
            return Err(ChatError::InvalidState(
                "You must log out (#logoff) before setting a port".into(),
            ));
        }

        state.port = port;

        Ok(())
    }

    pub async fn send_message(&self, text: &str) -> Result<(), ChatError> {
        if !self.state.read().connected {
            return Err(ChatError::InvalidState(
                "Not connected to a server; message not sent (#login to connect)".into(),
            ));
        }

        self.transport.send(text).await.map_err(|err| {
            warn!(error = %err, "send failed");
            ChatError::Transport("Could not send message to server.".into())
        })
    }

    pub async fn connection_lost(&self) -> bool {
        let _guard = self.transition.lock().await;

        let mut state = self.state.write();

        if !state.connected {
            return false;
        }

        state.connected = false;

        warn!(host = %state.host, port = state.port, "connection lost");

        true
    }

    pub fn host(&self) -> String {
        self.state.read().host.clone()
    }

    pub fn port(&self) -> u16 {
        self.state.read().port
    }

    pub fn username(&self) -> Option<String> {
        self.state.read().username.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state.read().connected
    }

    pub fn state(&self) -> ClientState {
        self.state.read().clone()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}
