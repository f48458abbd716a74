use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::ChatError;
use crate::transport::{ClientEvent, ClientTransport, ConnId, Listener, Peer, ServerEvent};

// Lines waiting for one client's writer before that client counts as stuck.
pub const OUTBOUND_QUEUE: usize = 512;

pub struct TcpPeer {
    id: ConnId,
    tx: mpsc::Sender<String>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl Peer for TcpPeer {
    fn id(&self) -> ConnId {
        self.id
    }

    fn send(&self, line: &str) -> Result<(), ChatError> {
        if *self.shutdown.borrow() {
            return Err(ChatError::Transport(format!("connection {} is closed", self.id)));
        }

        self.tx.try_send(line.to_string()).map_err(|err| match err {
            TrySendError::Full(_) => {
                ChatError::Transport(format!("connection {} is not keeping up", self.id))
            }
            TrySendError::Closed(_) => {
                ChatError::Transport(format!("connection {} is closed", self.id))
            }
        })
    }

    fn close(&self) {
        self.shutdown.send_replace(true);
    }

    fn is_connected(&self) -> bool {
        !*self.shutdown.borrow()
    }
}

pub struct TcpServerTransport {
    events: mpsc::UnboundedSender<ServerEvent>,
    send_timeout: Duration,
    next_id: Arc<AtomicU64>,
    accept_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl TcpServerTransport {
    pub fn new(events: mpsc::UnboundedSender<ServerEvent>, send_timeout: Duration) -> Self {
        Self {
            events,
            send_timeout,
            // 0 belongs to the server console
            next_id: Arc::new(AtomicU64::new(1)),
            accept_task: parking_lot::Mutex::new(None),
        }
    }
}

#[async_trait]
impl Listener for TcpServerTransport {
    async fn listen(&self, port: u16, epoch: u64) -> Result<(), ChatError> {
        let listener = TcpListener::bind(("0.0.0.0", port)).await?;

        info!(addr = %listener.local_addr()?, epoch, "accepting connections");

        let task = tokio::spawn(accept_loop(
            listener,
            epoch,
            self.events.clone(),
            self.next_id.clone(),
            self.send_timeout,
        ));

        let old = self.accept_task.lock().replace(task);

        if let Some(old) = old {
            old.abort();
            let _ = old.await;
        }

        Ok(())
    }

    async fn stop_listening(&self) {
        let task = self.accept_task.lock().take();

        // The socket is only released once the aborted task has been dropped.
        if let Some(task) = task {
            task.abort();
            let _ = task.await;
        }
    }

    fn is_listening(&self) -> bool {
        self.accept_task
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }
}

async fn accept_loop(
    listener: TcpListener,
    epoch: u64,
    events: mpsc::UnboundedSender<ServerEvent>,
    next_id: Arc<AtomicU64>,
    send_timeout: Duration,
) {
    loop {
        match listener.accept().await {
            Ok((socket, addr)) => {
                let id = ConnId(next_id.fetch_add(1, Ordering::SeqCst));

                spawn_connection(id, epoch, socket, addr, events.clone(), send_timeout);
            }
            Err(err) => {
                warn!(error = %err, "accept failed");
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

fn spawn_connection(
    id: ConnId,
    epoch: u64,
    socket: TcpStream,
    addr: SocketAddr,
    events: mpsc::UnboundedSender<ServerEvent>,
    send_timeout: Duration,
) {
    info!(conn = %id, %addr, epoch, "accepted");

    let (reader, writer) = socket.into_split();

    let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE);

    let shutdown = Arc::new(watch::Sender::new(false));

    let peer = Arc::new(TcpPeer {
        id,
        tx,
        shutdown: shutdown.clone(),
    });

    // Connected goes out before the reader can produce any Message.
    if events.send(ServerEvent::Connected { peer, epoch }).is_err() {
        return;
    }

    tokio::spawn(write_loop(id, writer, rx, shutdown.clone(), send_timeout));
    tokio::spawn(read_loop(id, reader, events, shutdown));
}

async fn closed(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|c| *c).await;
}

async fn read_loop(
    id: ConnId,
    reader: OwnedReadHalf,
    events: mpsc::UnboundedSender<ServerEvent>,
    shutdown: Arc<watch::Sender<bool>>,
) {
    let mut lines = BufReader::new(reader).lines();

    let mut shutdown_rx = shutdown.subscribe();

    let cause = loop {
        tokio::select! {
            _ = closed(&mut shutdown_rx) => break None,

            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if events.send(ServerEvent::Message { conn: id, line }).is_err() {
                        break None;
                    }
                }
                // EOF
                Ok(None) => break None,
                Err(err) => break Some(err.to_string()),
            }
        }
    };

    shutdown.send_replace(true);

    debug!(conn = %id, cause = ?cause, "reader finished");

    let _ = events.send(ServerEvent::Disconnected { conn: id, cause });
}

async fn write_loop(
    id: ConnId,
    mut writer: OwnedWriteHalf,
    mut rx: mpsc::Receiver<String>,
    shutdown: Arc<watch::Sender<bool>>,
    send_timeout: Duration,
) {
    let mut shutdown_rx = shutdown.subscribe();

    loop {
        tokio::select! {
            _ = closed(&mut shutdown_rx) => break,

            msg = rx.recv() => {
                let Some(msg) = msg else { break };

                match tokio::time::timeout(send_timeout, write_line(&mut writer, &msg)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => {
                        debug!(conn = %id, error = %err, "write failed");
                        break;
                    }
                    Err(_) => {
                        warn!(conn = %id, timeout = ?send_timeout, "send timed out");
                        break;
                    }
                }
            }
        }
    }

    shutdown.send_replace(true);

    let _ = writer.shutdown().await;
}

async fn write_line<W: AsyncWriteExt + Unpin>(writer: &mut W, line: &str) -> std::io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}

struct Link {
    writer: OwnedWriteHalf,
    reader: JoinHandle<()>,
    closing: Arc<AtomicBool>,
}

pub struct TcpClientTransport {
    events: mpsc::UnboundedSender<ClientEvent>,
    link: tokio::sync::Mutex<Option<Link>>,
    connected: Arc<AtomicBool>,
}

impl TcpClientTransport {
    pub fn new(events: mpsc::UnboundedSender<ClientEvent>) -> Self {
        Self {
            events,
            link: tokio::sync::Mutex::new(None),
            connected: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[async_trait]
impl ClientTransport for TcpClientTransport {
    async fn open(&self, host: &str, port: u16) -> Result<(), ChatError> {
        let stream = TcpStream::connect((host, port)).await?;

        let (reader, writer) = stream.into_split();

        let closing = Arc::new(AtomicBool::new(false));

        let reader = tokio::spawn(client_read_loop(
            reader,
            self.events.clone(),
            self.connected.clone(),
            closing.clone(),
        ));

        self.connected.store(true, Ordering::SeqCst);

        let old = self.link.lock().await.replace(Link {
            writer,
            reader,
            closing,
        });

        if let Some(old) = old {
            old.closing.store(true, Ordering::SeqCst);
            old.reader.abort();
        }

        Ok(())
    }

    async fn close(&self) -> Result<(), ChatError> {
        let Some(mut link) = self.link.lock().await.take() else {
            return Ok(());
        };

        link.closing.store(true, Ordering::SeqCst);
        link.reader.abort();

        self.connected.store(false, Ordering::SeqCst);

        link.writer.shutdown().await?;

        Ok(())
    }

    async fn send(&self, line: &str) -> Result<(), ChatError> {
        let mut link = self.link.lock().await;

        let link = link
            .as_mut()
            .ok_or_else(|| ChatError::Transport("not connected".into()))?;

        write_line(&mut link.writer, line).await?;

        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

async fn client_read_loop(
    reader: OwnedReadHalf,
    events: mpsc::UnboundedSender<ClientEvent>,
    connected: Arc<AtomicBool>,
    closing: Arc<AtomicBool>,
) {
    let mut lines = BufReader::new(reader).lines();

    let cause = loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let _ = events.send(ClientEvent::Message(line));
            }
            Ok(None) => break None,
            Err(err) => break Some(err.to_string()),
        }
    };

    if closing.load(Ordering::SeqCst) {
        return;
    }

    connected.store(false, Ordering::SeqCst);

    let _ = events.send(ClientEvent::ConnectionLost(cause));
}
