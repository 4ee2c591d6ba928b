//! Byte-transfer engine: queue, single-flight drain, and the per-byte
//! DATA/ACK handshake.
//!
//! # Architecture
//!
//! ```text
//!   enqueue(bytes)                        drain task (at most one)
//!        │                                ┌──────────────────────────┐
//!        ▼                                │ loop:                    │
//!   ┌──────────────┐   start if idle      │   byte = queue.next()    │
//!   │ Shared       │ ───────────────────▶ │   Link::transfer(byte)   │
//!   │  queue       │ ◀─── next() ──────── │ until empty → flag off   │
//!   │  draining    │                      └──────────┬───────────────┘
//!   └──────────────┘                                 │
//!                                     DATA writer / events, ACK writer / events
//!                                                    │
//!                                      pump tasks ([`crate::transport`])
//! ```
//!
//! # Single-flight contract
//!
//! - `draining` is set by `enqueue` when it spawns a drain and cleared by the
//!   drain in the same critical section that observes the empty queue, so a
//!   byte is never stranded and two drains never overlap.
//! - The lock around [`Shared`] is never held across an `.await`.
//! - Handshake N+1 starts only after both completion signals of handshake N.
//!
//! # Stalls
//!
//! There is no handshake timeout.  A peer that never answers parks the drain
//! on that byte forever; later bytes stay queued.

use std::sync::{Arc, Mutex};

use tokio::sync::{broadcast, mpsc, Mutex as AsyncMutex, Notify};
use tokio::task::JoinHandle;

use crate::config::EngineConfig;
use crate::error::{ConnectError, TransportError};
use crate::hex::{to_hex, HexBytes};
use crate::protocol::{data_frame, Channel, ACK_FRAME};
use crate::queue::ByteQueue;
use crate::state::{ChannelState, EngineState};
use crate::transport::{lock, spawn_channel, ChannelTask, ChannelWriter, Connector, TcpConnector};

/// Capacity of the diagnostics broadcast.  Slow subscribers lose the oldest
/// errors, never the engine.
const DIAGNOSTICS_CAPACITY: usize = 32;

// ---------------------------------------------------------------------------
// Disconnect hook
// ---------------------------------------------------------------------------

type Callback = Box<dyn FnOnce() + Send + 'static>;

/// Runs the user's `on_disconnect` at most once, whoever closes DATA first.
#[derive(Clone, Default)]
struct DisconnectHook(Arc<Mutex<Option<Callback>>>);

impl DisconnectHook {
    fn set(&self, f: Callback) {
        *lock(&self.0) = Some(f);
    }

    fn fire(&self) {
        let f = lock(&self.0).take();
        if let Some(f) = f {
            f();
        }
    }
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// State touched by both `enqueue` and the drain task.
#[derive(Default)]
struct Shared {
    state: EngineState,
    queue: ByteQueue,
    /// Single-flight guard for the drain task.
    draining: bool,
    drain_task: Option<JoinHandle<()>>,
    drains_started: u64,
    transfers_completed: u64,
}

impl Shared {
    fn transition(&mut self, next: EngineState) {
        debug_assert!(
            self.state.can_transition(next),
            "illegal engine transition {} -> {next}",
            self.state
        );
        log::debug!("engine: {} -> {next}", self.state);
        self.state = next;
    }
}

/// Counters exposed by [`Engine::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineStats {
    /// How many times a drain task was spawned.
    pub drains_started: u64,
    /// Handshakes that received both completion signals.
    pub transfers_completed: u64,
    /// Bytes still waiting in the queue.
    pub pending: usize,
    /// `true` while a drain task is running.
    pub draining: bool,
}

// ---------------------------------------------------------------------------
// Link — the drain task's view of both channels
// ---------------------------------------------------------------------------

struct Link {
    data: ChannelWriter,
    ack: ChannelWriter,
    data_events: mpsc::UnboundedReceiver<Vec<u8>>,
    ack_events: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl Link {
    /// Run the full handshake for one byte.
    ///
    /// Returns once the peer has acknowledged the byte on ACK *and* sent its
    /// response on DATA (which is acknowledged before returning).
    async fn transfer(&mut self, byte: u8) {
        self.discard_stale();

        log::debug!("[data] --> {}", to_hex(byte));
        // 1. ---> DATA [byte, SC]
        // 2. ---> ACK
        if !self.data.write(&data_frame(byte)) {
            log::warn!("[drain] DATA closed; {} not sent", to_hex(byte));
        }
        self.send_ack();

        let Link {
            ack,
            data_events,
            ack_events,
            ..
        } = self;

        // 3. <--- ACK
        let peer_ack = async {
            if ack_events.recv().await.is_none() {
                stall(Channel::Ack).await;
            }
        };

        // 4. <--- response on DATA, then 5. ---> ACK
        let response = async {
            match data_events.recv().await {
                Some(_) => {
                    log::debug!("[ack] --> (response)");
                    if !ack.write(&ACK_FRAME) {
                        log::warn!("[drain] ACK closed; response not acknowledged");
                    }
                }
                None => stall(Channel::Data).await,
            }
        };

        tokio::join!(peer_ack, response);
    }

    fn send_ack(&self) {
        log::debug!("[ack] -->");
        if !self.ack.write(&ACK_FRAME) {
            log::warn!("[drain] ACK closed; local ack not sent");
        }
    }

    /// Drop input that arrived while no handshake was waiting for it.
    fn discard_stale(&mut self) {
        while let Ok(chunk) = self.data_events.try_recv() {
            log::debug!("[data] ignoring unsolicited {}", HexBytes(&chunk));
        }
        while let Ok(chunk) = self.ack_events.try_recv() {
            log::debug!("[ack] ignoring unsolicited {}", HexBytes(&chunk));
        }
    }
}

/// Park forever: the channel is gone, so this handshake can never finish.
async fn stall(channel: Channel) {
    log::warn!("[drain] {channel} closed mid-handshake; transfer stalled");
    std::future::pending::<()>().await
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Owns the DATA/ACK connection pair and serialises every byte through the
/// per-byte handshake.
///
/// ```ignore
/// let mut engine = Engine::new(EngineConfig::default())
///     .on_disconnect(|| log::warn!("peer went away"));
/// engine.connect().await?;
/// engine.enqueue(&[0x90, 0x40, 0x7f]);
/// ```
///
/// `enqueue` and `disconnect` must be called from within a tokio runtime.
pub struct Engine<C: Connector = TcpConnector> {
    connector: C,
    shared: Arc<Mutex<Shared>>,
    link: Option<Arc<AsyncMutex<Link>>>,
    channels: Vec<ChannelTask>,
    on_disconnect: DisconnectHook,
    diagnostics: broadcast::Sender<TransportError>,
    idle: Arc<Notify>,
}

impl Engine<TcpConnector> {
    /// Engine that connects both channels over TCP to `config`.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_connector(config.connector())
    }
}

impl<C: Connector> Engine<C> {
    /// Engine over an arbitrary transport.
    pub fn with_connector(connector: C) -> Self {
        let (diagnostics, _) = broadcast::channel(DIAGNOSTICS_CAPACITY);
        Self {
            connector,
            shared: Arc::new(Mutex::new(Shared::default())),
            link: None,
            channels: Vec::new(),
            on_disconnect: DisconnectHook::default(),
            diagnostics,
            idle: Arc::new(Notify::new()),
        }
    }

    /// Register the callback run once when the DATA connection closes,
    /// whether the peer closed it or [`Engine::disconnect`] did.
    ///
    /// Dropping the engine also closes DATA but does not run the callback.
    pub fn on_disconnect<F>(self, f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.on_disconnect.set(Box::new(f));
        self
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Open DATA, then ACK.  Fails as a whole if either cannot be opened; ACK
    /// is never attempted when DATA fails.
    pub async fn connect(&mut self) -> Result<(), ConnectError> {
        {
            let mut shared = lock(&self.shared);
            if shared.state != EngineState::Idle {
                return Err(ConnectError::BadState(shared.state));
            }
            shared.transition(EngineState::Connecting);
        }

        let data_stream = match self.open(Channel::Data).await {
            Ok(s) => s,
            Err(e) => {
                lock(&self.shared).transition(EngineState::Idle);
                return Err(e);
            }
        };

        let ack_stream = match self.open(Channel::Ack).await {
            Ok(s) => s,
            Err(e) => {
                drop(data_stream);
                lock(&self.shared).transition(EngineState::Idle);
                return Err(e);
            }
        };

        let hook = self.on_disconnect.clone();
        let data = spawn_channel(
            Channel::Data,
            data_stream,
            self.diagnostics.clone(),
            Some(Box::new(move || hook.fire())),
        );
        let ack = spawn_channel(Channel::Ack, ack_stream, self.diagnostics.clone(), None);

        self.link = Some(Arc::new(AsyncMutex::new(Link {
            data: data.writer,
            ack: ack.writer,
            data_events: data.events,
            ack_events: ack.events,
        })));
        self.channels = vec![data.task, ack.task];

        lock(&self.shared).transition(EngineState::Connected);
        log::info!("connected to {}", self.connector.peer());
        Ok(())
    }

    async fn open(&self, channel: Channel) -> Result<C::Stream, ConnectError> {
        log::debug!("{channel}: connecting to {}", self.connector.peer());
        self.connector.open(channel).await.map_err(|source| {
            log::error!("socket error for {channel}: {source}");
            ConnectError::Channel {
                channel,
                addr: self.connector.peer(),
                source,
            }
        })
    }

    /// Tear down both connections now.
    ///
    /// The in-flight handshake is abandoned (never completed, never failed)
    /// and queued bytes are discarded.  Idempotent; the engine cannot be
    /// reconnected afterwards.
    pub fn disconnect(&self) {
        let discarded = {
            let mut shared = lock(&self.shared);
            if shared.state.is_terminal() {
                return;
            }
            shared.transition(EngineState::Disconnected);
            if let Some(task) = shared.drain_task.take() {
                task.abort();
            }
            shared.draining = false;
            shared.queue.clear()
        };

        for task in &self.channels {
            task.abort();
        }
        log::debug!("[drain] disconnected, {discarded} queued byte(s) discarded");
        self.idle.notify_waiters();

        if !self.channels.is_empty() {
            self.on_disconnect.fire();
        }
    }

    // -----------------------------------------------------------------------
    // Send path
    // -----------------------------------------------------------------------

    /// Queue `bytes` in order and make sure a drain is running.
    ///
    /// Ignored unless the engine is connected.
    pub fn enqueue(&self, bytes: &[u8]) {
        let Some(link) = &self.link else {
            log::warn!("enqueue of {} ignored: not connected", HexBytes(bytes));
            return;
        };

        let mut shared = lock(&self.shared);
        if shared.state != EngineState::Connected {
            log::warn!("enqueue of {} ignored: engine is {}", HexBytes(bytes), shared.state);
            return;
        }

        shared.queue.extend(bytes);
        if shared.draining || !shared.queue.has_next() {
            return;
        }

        shared.draining = true;
        shared.drains_started += 1;
        shared.drain_task = Some(tokio::spawn(drain(
            Arc::clone(&self.shared),
            Arc::clone(link),
            Arc::clone(&self.idle),
        )));
    }

    /// Resolve once the queue is empty and no drain is running, or once the
    /// engine is disconnected.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            {
                let shared = lock(&self.shared);
                if shared.state.is_terminal()
                    || (!shared.draining && !shared.queue.has_next())
                {
                    return;
                }
            }
            notified.await;
        }
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    pub fn state(&self) -> EngineState {
        lock(&self.shared).state
    }

    pub fn channel_state(&self, channel: Channel) -> ChannelState {
        let idx = match channel {
            Channel::Data => 0,
            Channel::Ack => 1,
        };
        self.channels
            .get(idx)
            .map_or(ChannelState::Disconnected, ChannelTask::state)
    }

    pub fn stats(&self) -> EngineStats {
        let shared = lock(&self.shared);
        EngineStats {
            drains_started: shared.drains_started,
            transfers_completed: shared.transfers_completed,
            pending: shared.queue.size(),
            draining: shared.draining,
        }
    }

    /// Subscribe to runtime transport errors.  These are also logged.
    pub fn subscribe_errors(&self) -> broadcast::Receiver<TransportError> {
        self.diagnostics.subscribe()
    }
}

impl<C: Connector> Drop for Engine<C> {
    fn drop(&mut self) {
        if let Some(task) = lock(&self.shared).drain_task.take() {
            task.abort();
        }
        for task in &self.channels {
            task.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// Drain task
// ---------------------------------------------------------------------------

async fn drain(shared: Arc<Mutex<Shared>>, link: Arc<AsyncMutex<Link>>, idle: Arc<Notify>) {
    let mut link = link.lock().await;
    log::debug!("[drain] start, {} pending", lock(&shared).queue.size());

    loop {
        let byte = {
            let mut s = lock(&shared);
            match s.queue.next() {
                Some(b) => b,
                None => {
                    s.draining = false;
                    s.drain_task = None;
                    break;
                }
            }
        };

        link.transfer(byte).await;
        lock(&shared).transfers_completed += 1;
    }

    log::debug!("[drain] idle");
    idle.notify_waiters();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::io::DuplexStream;

    /// Connector that refuses every channel.
    struct Refusing;

    #[async_trait]
    impl Connector for Refusing {
        type Stream = DuplexStream;

        async fn open(&self, _channel: Channel) -> io::Result<DuplexStream> {
            Err(io::ErrorKind::ConnectionRefused.into())
        }

        fn peer(&self) -> String {
            "nowhere".into()
        }
    }

    #[tokio::test]
    async fn enqueue_before_connect_is_ignored() {
        let engine = Engine::with_connector(Refusing);
        engine.enqueue(&[1, 2, 3]);
        assert_eq!(engine.stats(), EngineStats::default());
        assert_eq!(engine.state(), EngineState::Idle);
    }

    #[tokio::test]
    async fn failed_connect_returns_to_idle() {
        let mut engine = Engine::with_connector(Refusing);
        let err = engine.connect().await.unwrap_err();
        assert_eq!(err.channel(), Some(Channel::Data));
        assert_eq!(engine.state(), EngineState::Idle);
        assert_eq!(engine.channel_state(Channel::Data), ChannelState::Disconnected);
    }

    #[tokio::test]
    async fn connect_after_disconnect_is_rejected() {
        let mut engine = Engine::with_connector(Refusing);
        engine.disconnect();
        assert_eq!(engine.state(), EngineState::Disconnected);
        assert!(matches!(
            engine.connect().await,
            Err(ConnectError::BadState(EngineState::Disconnected))
        ));
    }

    #[tokio::test]
    async fn disconnect_without_connection_skips_hook() {
        let fired = Arc::new(AtomicUsize::new(0));
        let f = Arc::clone(&fired);
        let engine = Engine::with_connector(Refusing).on_disconnect(move || {
            f.fetch_add(1, Ordering::SeqCst);
        });
        engine.disconnect();
        engine.disconnect();
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn wait_idle_returns_immediately_when_nothing_queued() {
        let engine = Engine::with_connector(Refusing);
        tokio::time::timeout(std::time::Duration::from_secs(1), engine.wait_idle())
            .await
            .expect("idle engine should not block");
    }

    #[test]
    fn hook_fires_once() {
        let hook = DisconnectHook::default();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        hook.set(Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        hook.fire();
        hook.clone().fire();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
