//! Entry point for `sio-bridge`.
//!
//! Reads MIDI messages from stdin (one message per line, hex bytes such as
//! `90 40 7f`), filters them, and forwards the bytes to the link peer.  All
//! protocol work is delegated to the library; `main.rs` owns only process
//! setup (logging, signal handling, argument parsing) and the byte source.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Notify;

use sio_bridge::hex::{parse_line, HexBytes};
use sio_bridge::midi::MidiFilter;
use sio_bridge::protocol::{DEFAULT_HOSTNAME, DEFAULT_PORT};
use sio_bridge::{Engine, EngineConfig};

/// Relay MIDI bytes to an emulated link-cable peer.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Peer hostname.
    #[arg(long, env = "SIO_HOST", default_value = DEFAULT_HOSTNAME)]
    host: String,

    /// Peer port (shared by the DATA and ACK connections).
    #[arg(short, long, env = "SIO_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Log level when RUST_LOG is unset (error, warn, info, debug, trace).
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Forward polyphonic aftertouch instead of dropping it.
    #[arg(long)]
    no_filter: bool,
}

/// Why the relay loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shutdown {
    Interrupted,
    PeerClosed,
    InputClosed,
    InputError,
}

impl Shutdown {
    /// Process exit status for this shutdown reason.
    fn exit_code(self) -> i32 {
        match self {
            Shutdown::InputError => 1,
            Shutdown::Interrupted | Shutdown::PeerClosed | Shutdown::InputClosed => 0,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins when set; otherwise --log-level / LOG_LEVEL.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level))
        .init();

    let filter = if cli.no_filter {
        MidiFilter::pass_all()
    } else {
        MidiFilter::default()
    };

    let peer_closed = Arc::new(Notify::new());
    let notify = Arc::clone(&peer_closed);
    let config = EngineConfig::new(cli.host, cli.port);
    let mut engine = Engine::new(config.clone()).on_disconnect(move || notify.notify_one());

    engine
        .connect()
        .await
        .with_context(|| format!("could not reach link peer at {}", config.addr()))?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let shutdown = loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                log::info!("interrupted");
                break Shutdown::Interrupted;
            }
            _ = peer_closed.notified() => {
                log::warn!("peer closed the DATA connection");
                break Shutdown::PeerClosed;
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    let message = match parse_line(&line) {
                        Ok(m) => m,
                        Err(e) => {
                            log::warn!("skipping input line {line:?}: {e}");
                            continue;
                        }
                    };
                    if !filter.accepts(&message) {
                        continue;
                    }
                    log::info!("MIDI: {}", HexBytes(&message));
                    engine.enqueue(&message);
                }
                Ok(None) => {
                    log::info!("input closed; flushing {} queued byte(s)", engine.stats().pending);
                    break tokio::select! {
                        _ = engine.wait_idle() => Shutdown::InputClosed,
                        _ = &mut ctrl_c => {
                            log::info!("interrupted");
                            Shutdown::Interrupted
                        }
                        _ = peer_closed.notified() => {
                            log::warn!("peer closed the DATA connection");
                            Shutdown::PeerClosed
                        }
                    };
                }
                Err(e) => {
                    log::error!("reading input: {e}");
                    break Shutdown::InputError;
                }
            },
        }
    };

    engine.disconnect();
    drop(lines);
    // The stdin reader runs on a blocking thread that would hold the
    // runtime open until the next line arrives.
    std::process::exit(shutdown.exit_code());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_error_exits_non_zero() {
        assert_ne!(Shutdown::InputError.exit_code(), 0);
    }

    #[test]
    fn orderly_shutdowns_exit_zero() {
        for s in [Shutdown::Interrupted, Shutdown::PeerClosed, Shutdown::InputClosed] {
            assert_eq!(s.exit_code(), 0, "{s:?}");
        }
    }
}
