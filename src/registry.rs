use dashmap::{DashMap, mapref::entry::Entry};
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
};
use tracing::{debug, info, warn};

use crate::error::ChatError;
use crate::transport::{ChatUi, ConnId, Origin, Peer};

struct Session {
    seq: u64,
    peer: Arc<dyn Peer>,
    identity: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Login {
    First,
    Renamed { previous: String },
    UnknownConnection,
}

#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<ConnId, Session>>,
    next_seq: Arc<AtomicU64>,
    draining: Arc<AtomicBool>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, peer: Arc<dyn Peer>) -> bool {
        let id = peer.id();

        let Entry::Vacant(slot) = self.sessions.entry(id) else {
            warn!(conn = %id, "connection registered twice");
            return false;
        };

        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);

        slot.insert(Session {
            seq,
            peer,
            identity: None,
        });

        debug!(conn = %id, seq, "connection registered");

        true
    }

    pub fn set_identity(&self, conn: ConnId, identity: &str) -> Login {
        let Some(mut session) = self.sessions.get_mut(&conn) else {
            return Login::UnknownConnection;
        };

        match session.identity.replace(identity.to_string()) {
            None => Login::First,
            Some(previous) => Login::Renamed { previous },
        }
    }

    pub fn identity(&self, conn: ConnId) -> Option<String> {
        self.sessions.get(&conn).and_then(|s| s.identity.clone())
    }

    pub fn origin(&self, conn: ConnId) -> Option<Origin> {
        self.sessions.get(&conn).map(|s| s.peer.origin())
    }

    pub fn broadcast(&self, text: &str) -> usize {
        let mut delivered = 0;

        for peer in self.snapshot() {
            match peer.send(text) {
                Ok(()) => delivered += 1,
                Err(err) => {
                    warn!(conn = %peer.id(), error = %err, "send failed, dropping connection");
                    peer.close();
                }
            }
        }

        delivered
    }

    pub fn unregister(&self, conn: ConnId) -> bool {
        let Some((_, session)) = self.sessions.remove(&conn) else {
            return false;
        };

        info!(conn = %conn, identity = ?session.identity, "connection unregistered");

        if !self.draining.load(Ordering::SeqCst) {
            self.broadcast(&departure(session.identity.as_deref()));
        }

        true
    }

    pub fn close_all(&self) -> usize {
        self.draining.store(true, Ordering::SeqCst);

        let ids: Vec<ConnId> = self
            .sessions
            .iter()
            .filter(|e| e.value().peer.origin() == Origin::Client)
            .map(|e| *e.key())
            .collect();

        let mut closed = 0;

        for id in ids {
            if let Some((_, session)) = self.sessions.remove(&id) {
                session.peer.close();
                closed += 1;
            }
        }

        self.draining.store(false, Ordering::SeqCst);

        closed
    }

    pub fn contains(&self, conn: ConnId) -> bool {
        self.sessions.contains_key(&conn)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn ids(&self) -> Vec<ConnId> {
        self.snapshot().iter().map(|p| p.id()).collect()
    }

    // Clone the handles out so no map guard is held while sending.
    fn snapshot(&self) -> Vec<Arc<dyn Peer>> {
        let mut peers: Vec<(u64, Arc<dyn Peer>)> = self
            .sessions
            .iter()
            .map(|e| (e.value().seq, e.value().peer.clone()))
            .collect();

        peers.sort_by_key(|(seq, _)| *seq);

        peers.into_iter().map(|(_, peer)| peer).collect()
    }
}

pub fn departure(identity: Option<&str>) -> String {
    match identity {
        Some(id) => format!("{id} left the chat"),
        None => "A client has disconnected from the server".to_string(),
    }
}

pub struct ConsolePeer {
    ui: Arc<dyn ChatUi>,
}

impl ConsolePeer {
    pub fn new(ui: Arc<dyn ChatUi>) -> Self {
        Self { ui }
    }
}

impl Peer for ConsolePeer {
    fn id(&self) -> ConnId {
        ConnId::CONSOLE
    }

    fn origin(&self) -> Origin {
        Origin::ServerConsole
    }

    fn send(&self, line: &str) -> Result<(), ChatError> {
        self.ui.display(line);
        Ok(())
    }

    fn close(&self) {}

    fn is_connected(&self) -> bool {
        true
    }
}
