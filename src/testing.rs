use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use crate::error::ChatError;
use crate::transport::{ChatUi, ClientTransport, ConnId, Listener, Peer};

pub struct RecordingPeer {
    id: ConnId,
    sent: Mutex<Vec<String>>,
    fail: AtomicBool,
    closed: AtomicBool,
}

impl RecordingPeer {
    pub fn new(id: u64) -> Arc<Self> {
        Arc::new(Self {
            id: ConnId(id),
            sent: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        })
    }

    pub fn fail_sends(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    pub fn was_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Peer for RecordingPeer {
    fn id(&self) -> ConnId {
        self.id
    }

    fn send(&self, line: &str) -> Result<(), ChatError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ChatError::Transport("broken pipe".into()));
        }

        self.sent.lock().push(line.to_string());
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_connected(&self) -> bool {
        !self.was_closed()
    }
}

#[derive(Default)]
pub struct RecordingUi {
    lines: Mutex<Vec<String>>,
}

impl RecordingUi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.lines.lock())
    }
}

impl ChatUi for RecordingUi {
    fn display(&self, line: &str) {
        self.lines.lock().push(line.to_string());
    }
}

#[derive(Default)]
pub struct FakeListener {
    listening: AtomicBool,
    refuse: AtomicBool,
    ports: Mutex<Vec<u16>>,
    epochs: Mutex<Vec<u64>>,
}

impl FakeListener {
    pub fn refuse_binds(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    pub fn ports(&self) -> Vec<u16> {
        self.ports.lock().clone()
    }

    pub fn epochs(&self) -> Vec<u64> {
        self.epochs.lock().clone()
    }
}

#[async_trait]
impl Listener for FakeListener {
    async fn listen(&self, port: u16, epoch: u64) -> Result<(), ChatError> {
        self.ports.lock().push(port);
        self.epochs.lock().push(epoch);

        if self.refuse.load(Ordering::SeqCst) {
            return Err(ChatError::Transport("address in use".into()));
        }

        self.listening.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop_listening(&self) {
        self.listening.store(false, Ordering::SeqCst);
    }

    fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct ScriptedTransport {
    connected: AtomicBool,
    refuse: AtomicBool,
    opened: Mutex<Vec<(String, u16)>>,
    sent: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn refuse_opens(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    pub fn opened(&self) -> Vec<(String, u16)> {
        self.opened.lock().clone()
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    pub fn drop_link(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl ClientTransport for ScriptedTransport {
    async fn open(&self, host: &str, port: u16) -> Result<(), ChatError> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(ChatError::Transport("connection refused".into()));
        }

        self.opened.lock().push((host.to_string(), port));
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<(), ChatError> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn send(&self, line: &str) -> Result<(), ChatError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(ChatError::Transport("not connected".into()));
        }

        self.sent.lock().push(line.to_string());
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
