use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::ChatError;
use crate::protocol;
use crate::registry::{ConsolePeer, Login, SessionRegistry};
use crate::transport::{ChatUi, ConnId, Listener, Origin, Peer, ServerEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenState {
    pub port: u16,
    pub listening: bool,
    // Bumped by every close; connections accepted under an older epoch are
    // refused on arrival.
    pub epoch: u64,
}

pub struct ChatServer<L> {
    listener: L,
    registry: SessionRegistry,
    // Held across a whole transition, including the transport call.
    transition: Mutex<()>,
    state: RwLock<ListenState>,
}

impl<L: Listener> ChatServer<L> {
    pub fn new(listener: L, port: u16, console: Arc<dyn ChatUi>) -> Self {
        let registry = SessionRegistry::new();
        registry.register(Arc::new(ConsolePeer::new(console)));

        Self {
            listener,
            registry,
            transition: Mutex::new(()),
            state: RwLock::new(ListenState {
                port,
                listening: false,
                epoch: 0,
            }),
        }
    }

    pub async fn start(&self) -> Result<(), ChatError> {
        let _guard = self.transition.lock().await;

        let ListenState { port, listening, epoch } = *self.state.read();

        if listening {
            return Err(ChatError::InvalidState("Server is already listening".into()));
        }

        self.listener.listen(port, epoch).await.map_err(|err| {
            warn!(port, error = %err, "could not listen");
            ChatError::Transport(format!("ERROR - Could not listen for clients on port {port}"))
        })?;

        self.state.write().listening = true;

        info!(port, "Server listening for connections");

        Ok(())
    }

    pub async fn stop(&self) -> Result<(), ChatError> {
        let _guard = self.transition.lock().await;

        if !self.state.read().listening {
            return Err(ChatError::InvalidState("Server is not listening".into()));
        }

        self.listener.stop_listening().await;
        self.state.write().listening = false;

        info!("Server has stopped listening for connections");

        Ok(())
    }

    pub async fn close(&self) -> usize {
        let _guard = self.transition.lock().await;

        let listening = self.state.read().listening;

        if listening {
            self.listener.stop_listening().await;
        }

        {
            let mut state = self.state.write();
            state.listening = false;
            state.epoch += 1;
        }

        let closed = self.registry.close_all();

        info!(closed, "server closed");

        closed
    }

    pub async fn set_port(&self, port: u16) -> Result<(), ChatError> {
        let _guard = self.transition.lock().await;

        let mut state = self.state.write();

        if state.listening {
            return Err(ChatError::InvalidState(
                "You must stop the server (#stop) before setting a port".into(),
            ));
        }

        state.port = port;

        Ok(())
    }

    pub fn port(&self) -> u16 {
        self.state.read().port
    }

    pub fn is_listening(&self) -> bool {
        self.state.read().listening
    }

    pub fn epoch(&self) -> u64 {
        self.state.read().epoch
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn listener(&self) -> &L {
        &self.listener
    }

    pub fn say(&self, text: &str) {
        self.on_message(ConnId::CONSOLE, text);
    }

    pub fn handle_event(&self, event: ServerEvent) {
        match event {
            ServerEvent::Connected { peer, epoch } => self.on_connected(peer, epoch),
            ServerEvent::Message { conn, line } => self.on_message(conn, &line),
            ServerEvent::Disconnected { conn, cause } => {
                info!(conn = %conn, cause = ?cause, "client disconnected");
                self.registry.unregister(conn);
            }
        }
    }

    fn on_connected(&self, peer: Arc<dyn Peer>, epoch: u64) {
        // The read guard keeps a concurrent close from slipping in between
        // the epoch check and the registration.
        let state = self.state.read();

        if epoch < state.epoch {
            info!(conn = %peer.id(), epoch, current = state.epoch, "refusing connection accepted before close");
            peer.close();
            return;
        }

        info!(conn = %peer.id(), "client connected");

        self.registry.register(peer);
    }

    fn on_message(&self, conn: ConnId, line: &str) {
        let Some(origin) = self.registry.origin(conn) else {
            debug!(conn = %conn, "message from unregistered connection dropped");
            return;
        };

        if origin == Origin::ServerConsole {
            self.registry.broadcast(line);
            return;
        }

        if let Some(identity) = protocol::login_identity(line) {
            match self.registry.set_identity(conn, identity) {
                Login::First => {
                    info!(conn = %conn, identity, "Client logged in");
                    self.registry.broadcast(&format!("{identity} joined the chat"));
                }
                Login::Renamed { previous } => {
                    info!(conn = %conn, identity, previous = %previous, "client logged in again");
                }
                Login::UnknownConnection => {}
            }
            return;
        }

        debug!(conn = %conn, line, "message received");

        let identity = self.registry.identity(conn).unwrap_or_default();

        self.registry.broadcast(&format!("{identity}: {line}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeListener, RecordingPeer, RecordingUi};

    fn server() -> (ChatServer<FakeListener>, Arc<RecordingUi>) {
        let ui = RecordingUi::new();
        (ChatServer::new(FakeListener::default(), 5555, ui.clone()), ui)
    }

    fn connect(server: &ChatServer<FakeListener>, id: u64) -> Arc<RecordingPeer> {
        let peer = RecordingPeer::new(id);
        server.handle_event(ServerEvent::Connected {
            peer: peer.clone(),
            epoch: server.epoch(),
        });
        peer
    }

    fn says(server: &ChatServer<FakeListener>, id: u64, line: &str) {
        server.handle_event(ServerEvent::Message {
            conn: ConnId(id),
            line: line.to_string(),
        });
    }

    #[tokio::test]
    async fn start_and_stop_toggle_listening() {
        let (server, _ui) = server();

        assert!(!server.is_listening());
        server.start().await.unwrap();
        assert!(server.is_listening());
        assert!(server.listener().is_listening());
        assert_eq!(server.listener().ports(), vec![5555]);

        let err = server.start().await.unwrap_err();
        assert_eq!(err.to_string(), "Server is already listening");

        server.stop().await.unwrap();
        assert!(!server.is_listening());

        let err = server.stop().await.unwrap_err();
        assert_eq!(err.error_code(), "invalid_state");
    }

    #[tokio::test]
    async fn failed_bind_leaves_server_stopped() {
        let (server, _ui) = server();
        server.listener().refuse_binds(true);

        let err = server.start().await.unwrap_err();
        assert_eq!(err.error_code(), "transport");
        assert!(!server.is_listening());

        server.listener().refuse_binds(false);
        server.start().await.unwrap();
        assert!(server.is_listening());
    }

    #[tokio::test]
    async fn port_only_changes_while_stopped() {
        let (server, _ui) = server();

        server.set_port(6000).await.unwrap();
        assert_eq!(server.port(), 6000);

        server.start().await.unwrap();
        let err = server.set_port(7000).await.unwrap_err();
        assert_eq!(err.error_code(), "invalid_state");
        assert_eq!(server.port(), 6000);

        server.stop().await.unwrap();
        server.set_port(7000).await.unwrap();
        server.start().await.unwrap();
        assert_eq!(server.listener().ports(), vec![6000, 7000]);
    }

    #[tokio::test]
    async fn stop_keeps_existing_connections() {
        let (server, _ui) = server();
        server.start().await.unwrap();
        let peer = connect(&server, 1);

        server.stop().await.unwrap();

        assert!(server.registry().contains(ConnId(1)));
        assert!(!peer.was_closed());
    }

    #[tokio::test]
    async fn close_drops_connections_from_either_state() {
        let (server, _ui) = server();
        let a = connect(&server, 1);

        assert_eq!(server.close().await, 1);
        assert!(a.was_closed());
        assert_eq!(server.registry().ids(), vec![ConnId::CONSOLE]);

        server.start().await.unwrap();
        let b = connect(&server, 2);
        assert_eq!(server.close().await, 1);
        assert!(b.was_closed());
        assert!(!server.is_listening());
        assert!(!server.listener().is_listening());
    }

    #[tokio::test]
    async fn close_refuses_connections_accepted_before_it() {
        let (server, _ui) = server();
        server.start().await.unwrap();
        let late = RecordingPeer::new(1);
        let queued = ServerEvent::Connected {
            peer: late.clone(),
            epoch: server.epoch(),
        };

        assert_eq!(server.close().await, 0);
        server.handle_event(queued);

        assert!(late.was_closed());
        assert_eq!(server.registry().ids(), vec![ConnId::CONSOLE]);

        server.start().await.unwrap();
        assert_eq!(server.listener().epochs(), vec![0, 1]);
        let fresh = connect(&server, 2);
        assert!(!fresh.was_closed());
        assert!(server.registry().contains(ConnId(2)));
    }

    #[tokio::test]
    async fn stop_does_not_refuse_queued_connections() {
        let (server, _ui) = server();
        server.start().await.unwrap();
        let epoch = server.epoch();

        server.stop().await.unwrap();
        let peer = RecordingPeer::new(1);
        server.handle_event(ServerEvent::Connected { peer: peer.clone(), epoch });

        assert!(!peer.was_closed());
        assert!(server.registry().contains(ConnId(1)));
    }

    #[test]
    fn login_announces_join_once() {
        let (server, ui) = server();
        let alice = connect(&server, 1);

        says(&server, 1, "#login alice");
        says(&server, 1, "#login alice");

        assert_eq!(alice.sent(), vec!["alice joined the chat"]);
        assert_eq!(ui.lines(), vec!["alice joined the chat"]);
        assert_eq!(server.registry().identity(ConnId(1)).as_deref(), Some("alice"));
    }

    #[test]
    fn messages_are_attributed_and_looped_back() {
        let (server, ui) = server();
        let bob = connect(&server, 1);
        let other = connect(&server, 2);
        says(&server, 1, "#login bob");

        says(&server, 1, "hello");

        assert_eq!(bob.sent().last().map(String::as_str), Some("bob: hello"));
        assert_eq!(other.sent().last().map(String::as_str), Some("bob: hello"));
        assert_eq!(ui.lines().last().map(String::as_str), Some("bob: hello"));
    }

    #[test]
    fn anonymous_messages_get_an_empty_identity() {
        let (server, _ui) = server();
        let peer = connect(&server, 1);

        says(&server, 1, "anyone?");

        assert_eq!(peer.sent(), vec![": anyone?"]);
    }

    #[test]
    fn client_commands_are_just_text_on_the_server() {
        let (server, _ui) = server();
        let peer = connect(&server, 1);
        says(&server, 1, "#login eve");

        says(&server, 1, "#stop");
        says(&server, 1, "#login");

        assert_eq!(peer.sent()[1..], ["eve: #stop", "eve: #login"]);
    }

    #[test]
    fn console_text_is_broadcast_unprefixed() {
        let (server, ui) = server();
        let peer = connect(&server, 1);

        server.say("hi");

        assert_eq!(peer.sent(), vec!["hi"]);
        assert_eq!(ui.lines(), vec!["hi"]);
    }

    #[test]
    fn departure_is_announced_to_remaining_clients() {
        let (server, _ui) = server();
        let a = connect(&server, 1);
        let b = connect(&server, 2);
        says(&server, 1, "#login a");
        says(&server, 2, "#login b");
        let before = server.registry().len();

        server.handle_event(ServerEvent::Disconnected { conn: ConnId(1), cause: None });

        assert_eq!(server.registry().len(), before - 1);
        assert!(server.registry().contains(ConnId(2)));
        assert_eq!(b.sent().last().map(String::as_str), Some("a left the chat"));
        assert!(!a.sent().contains(&"a left the chat".to_string()));
    }

    #[test]
    fn messages_from_unknown_connections_are_dropped() {
        let (server, ui) = server();

        says(&server, 42, "boo");

        assert!(ui.lines().is_empty());
    }
}
