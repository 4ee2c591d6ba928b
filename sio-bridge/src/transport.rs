//! Byte-stream transport for the DATA and ACK channels.
//!
//! A [`Connector`] opens one ordered, reliable byte stream per [`Channel`].
//! Production uses [`TcpConnector`]; tests plug in in-memory streams.
//!
//! Once open, each stream is owned by a *pump* task that multiplexes two
//! directions with `tokio::select!`:
//!
//! ```text
//!            ChannelWriter::write          ChannelIo::events
//!                   │                             ▲
//!                   ▼                             │ one Vec<u8> per read
//!   ┌─────────────────────────────────────────────┴───┐
//!   │  pump task:  outbound rx ─▶ write_all           │
//!   │              read        ─▶ inbound tx          │
//!   └─────────────────────────┬───────────────────────┘
//!                             │ AsyncRead + AsyncWrite
//!                        stream (TCP)
//! ```
//!
//! Writes never wait for the peer: [`ChannelWriter::write`] only hands the
//! bytes to the pump, which preserves their order.  Protocol logic lives in
//! [`crate::engine`]; this module owns only byte I/O.

use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::error::{Direction, TransportError};
use crate::hex::HexBytes;
use crate::protocol::Channel;
use crate::state::ChannelState;

/// Read buffer size per pump.  The peer answers with single bytes, so this
/// only needs to absorb the occasional burst.
const READ_BUF: usize = 256;

// ---------------------------------------------------------------------------
// Connector
// ---------------------------------------------------------------------------

/// Opens the byte stream for one channel.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Stream type produced for each channel.
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Open the stream for `channel`, resolving once it is established.
    async fn open(&self, channel: Channel) -> io::Result<Self::Stream>;

    /// Human-readable peer address for logs and errors.
    fn peer(&self) -> String;
}

/// Connects both channels to the same `hostname:port` over TCP.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    pub hostname: String,
    pub port: u16,
}

impl TcpConnector {
    pub fn new(hostname: impl Into<String>, port: u16) -> Self {
        Self {
            hostname: hostname.into(),
            port,
        }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    type Stream = TcpStream;

    async fn open(&self, channel: Channel) -> io::Result<TcpStream> {
        let stream = TcpStream::connect((self.hostname.as_str(), self.port)).await?;
        // Each byte is its own frame; never let Nagle hold one back.
        stream.set_nodelay(true)?;
        match stream.local_addr() {
            Ok(local) => log::info!("{channel}: connect (local port {})", local.port()),
            Err(_) => log::info!("{channel}: connect"),
        }
        Ok(stream)
    }

    fn peer(&self) -> String {
        format!("{}:{}", self.hostname, self.port)
    }
}

// ---------------------------------------------------------------------------
// Channel handles
// ---------------------------------------------------------------------------

/// Cheap, cloneable write side of a channel.
#[derive(Debug, Clone)]
pub struct ChannelWriter {
    channel: Channel,
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl ChannelWriter {
    /// Queue `bytes` for the pump.
    ///
    /// Returns `false` when the pump has already stopped; the bytes are then
    /// dropped, matching a write to a destroyed socket.
    pub fn write(&self, bytes: &[u8]) -> bool {
        if self.tx.send(bytes.to_vec()).is_err() {
            log::debug!("[{}] write after close dropped: {}", tag(self.channel), HexBytes(bytes));
            return false;
        }
        true
    }
}

/// Owner of a running pump task.
#[derive(Debug)]
pub struct ChannelTask {
    channel: Channel,
    state: Arc<Mutex<ChannelState>>,
    handle: JoinHandle<()>,
}

impl ChannelTask {
    pub fn state(&self) -> ChannelState {
        *lock(&self.state)
    }

    /// Stop the pump and drop the stream at once.  Pending writes are lost.
    pub fn abort(&self) {
        self.handle.abort();
        let mut state = lock(&self.state);
        if *state != ChannelState::Closed {
            *state = ChannelState::Closed;
            log::info!("{}: close", self.channel);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Everything the engine holds for one open channel.
#[derive(Debug)]
pub struct ChannelIo {
    pub writer: ChannelWriter,
    /// One item per chunk read from the peer.  Closed when the pump stops.
    pub events: mpsc::UnboundedReceiver<Vec<u8>>,
    pub task: ChannelTask,
}

/// Hook run once by the pump when the stream closes on its own.
pub type CloseHook = Box<dyn FnOnce() + Send + 'static>;

/// Spawn the pump task for an established `stream`.
///
/// `diagnostics` receives every runtime I/O error; `on_close` runs when the
/// stream ends by EOF or error (not when the task is aborted).
pub fn spawn_channel<S>(
    channel: Channel,
    stream: S,
    diagnostics: broadcast::Sender<TransportError>,
    on_close: Option<CloseHook>,
) -> ChannelIo
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (out_tx, out_rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let (in_tx, in_rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let state = Arc::new(Mutex::new(ChannelState::Connected));

    let handle = tokio::spawn(pump(
        channel,
        stream,
        out_rx,
        in_tx,
        diagnostics,
        Arc::clone(&state),
        on_close,
    ));

    ChannelIo {
        writer: ChannelWriter { channel, tx: out_tx },
        events: in_rx,
        task: ChannelTask {
            channel,
            state,
            handle,
        },
    }
}

// ---------------------------------------------------------------------------
// Pump
// ---------------------------------------------------------------------------

async fn pump<S>(
    channel: Channel,
    mut stream: S,
    mut outbound: mpsc::UnboundedReceiver<Vec<u8>>,
    inbound: mpsc::UnboundedSender<Vec<u8>>,
    diagnostics: broadcast::Sender<TransportError>,
    state: Arc<Mutex<ChannelState>>,
    on_close: Option<CloseHook>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = [0u8; READ_BUF];
    let tag = tag(channel);

    loop {
        tokio::select! {
            // ── outbound: bytes queued by the engine ─────────────────────
            Some(bytes) = outbound.recv() => {
                log::debug!("[{tag}] ---> {}", HexBytes(&bytes));
                let result = async {
                    stream.write_all(&bytes).await?;
                    stream.flush().await
                }
                .await;
                if let Err(e) = result {
                    report(&diagnostics, TransportError::new(channel, Direction::Write, &e));
                    break;
                }
            }

            // ── inbound: anything the peer sends ─────────────────────────
            read = stream.read(&mut buf) => match read {
                Ok(0) => break,
                Ok(n) => {
                    log::debug!("[{tag}] <--- {}", HexBytes(&buf[..n]));
                    // Nobody listening any more is not an error for the pump.
                    let _ = inbound.send(buf[..n].to_vec());
                }
                Err(e) => {
                    report(&diagnostics, TransportError::new(channel, Direction::Read, &e));
                    break;
                }
            },
        }
    }

    *lock(&state) = ChannelState::Closed;
    log::info!("{channel}: close");
    if let Some(hook) = on_close {
        hook();
    }
}

fn report(diagnostics: &broadcast::Sender<TransportError>, err: TransportError) {
    log::error!("socket error for {}: {}", err.channel, err.message);
    // No subscribers is fine; the log line above is the primary sink.
    let _ = diagnostics.send(err);
}

fn tag(channel: Channel) -> &'static str {
    match channel {
        Channel::Data => "data",
        Channel::Ack => "ack",
    }
}

/// Lock `m`, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::duplex;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(2);

    #[tokio::test]
    async fn writes_reach_peer_in_order() {
        let (local, mut peer) = duplex(64);
        let (diag, _) = broadcast::channel(4);
        let io = spawn_channel(Channel::Data, local, diag, None);

        assert!(io.writer.write(&[0x90, 0x81]));
        assert!(io.writer.write(&[0x40, 0x81]));

        let mut got = [0u8; 4];
        timeout(WAIT, peer.read_exact(&mut got)).await.unwrap().unwrap();
        assert_eq!(got, [0x90, 0x81, 0x40, 0x81]);
        io.task.abort();
    }

    #[tokio::test]
    async fn reads_become_events() {
        let (local, mut peer) = duplex(64);
        let (diag, _) = broadcast::channel(4);
        let mut io = spawn_channel(Channel::Ack, local, diag, None);

        peer.write_all(&[0x00]).await.unwrap();
        let ev = timeout(WAIT, io.events.recv()).await.unwrap();
        assert_eq!(ev, Some(vec![0x00]));
        io.task.abort();
    }

    #[tokio::test]
    async fn peer_close_runs_hook_and_closes_events() {
        let (local, peer) = duplex(64);
        let (diag, _) = broadcast::channel(4);
        let (hook_tx, hook_rx) = tokio::sync::oneshot::channel::<()>();
        let hook: CloseHook = Box::new(move || {
            let _ = hook_tx.send(());
        });
        let mut io = spawn_channel(Channel::Data, local, diag, Some(hook));

        drop(peer);

        timeout(WAIT, hook_rx).await.unwrap().unwrap();
        assert_eq!(timeout(WAIT, io.events.recv()).await.unwrap(), None);
        assert_eq!(io.task.state(), ChannelState::Closed);
        assert!(io.task.is_finished());
        assert!(!io.writer.write(&[0x00]));
    }

    #[tokio::test]
    async fn abort_closes_stream_without_hook() {
        let (local, mut peer) = duplex(64);
        let (diag, _) = broadcast::channel(4);
        let hook: CloseHook = Box::new(|| panic!("hook must not run on abort"));
        let io = spawn_channel(Channel::Data, local, diag, Some(hook));

        io.task.abort();
        assert_eq!(io.task.state(), ChannelState::Closed);

        let mut buf = [0u8; 1];
        let n = timeout(WAIT, peer.read(&mut buf)).await.unwrap().unwrap();
        assert_eq!(n, 0, "peer should observe EOF once the pump is gone");
    }
}
