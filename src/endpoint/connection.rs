//! Connection lifecycle and the per-connection event loop.
//!
//! Every endpoint owns at most one connection, driven by a single spawned
//! task. The task multiplexes queued sends, the local shutdown signal and
//! transport readiness, and runs each event to completion before taking
//! the next, so delegate callbacks for one endpoint never overlap. The
//! shutdown signal travels outside the send queue and is checked around
//! every write, so a peer that stops reading cannot stall a local close.
//!
//! Phase lifecycle:
//!
//! ```text
//! Idle ──► Establishing ──► Open ──► Closed
//!               │                       ▲
//!               └───────────────────────┘
//!            (setup failure or local close)
//! ```
//!
//! `Closed` is terminal. An endpoint whose connection ended can only be
//! replaced, never restarted.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{RwLock, mpsc, oneshot};

use super::delegate::{EndpointDelegate, Termination};
use crate::core::EndpointConfig;
use crate::message::{FrameDecoder, encode};
use crate::transport::{SetupError, TetherListener, TetherStream};

/// Lifecycle phase of an endpoint's single connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionPhase {
    /// No connection exists yet.
    #[default]
    Idle,
    /// Setup has begun: listening for, or dialing, the peer.
    Establishing,
    /// Connected; messages flow.
    Open,
    /// The connection ended.
    Closed,
}

impl ConnectionPhase {
    /// Check whether messages can be sent in this phase.
    pub fn is_open(self) -> bool {
        matches!(self, ConnectionPhase::Open)
    }

    /// Check whether the phase can still change.
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionPhase::Closed)
    }

    /// Check whether setup may begin from this phase.
    pub fn can_activate(self) -> bool {
        matches!(self, ConnectionPhase::Idle)
    }
}

impl std::fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionPhase::Idle => "idle",
            ConnectionPhase::Establishing => "establishing",
            ConnectionPhase::Open => "open",
            ConnectionPhase::Closed => "closed",
        };
        write!(f, "{name}")
    }
}

/// How a guarded write ended.
enum WriteOutcome {
    /// The whole frame reached the kernel.
    Completed,
    /// A local close or drop interrupted the write.
    Interrupted,
}

/// State observable from the endpoint handle while the task runs.
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) phase: RwLock<ConnectionPhase>,
    pub(crate) messages_received: AtomicU64,
    pub(crate) connections_opened: AtomicU64,
    pub(crate) local_addr: RwLock<Option<SocketAddr>>,
    pub(crate) peer_addr: RwLock<Option<SocketAddr>>,
}

impl Shared {
    pub(crate) fn new() -> Self {
        Self {
            phase: RwLock::new(ConnectionPhase::Idle),
            messages_received: AtomicU64::new(0),
            connections_opened: AtomicU64::new(0),
            local_addr: RwLock::new(None),
            peer_addr: RwLock::new(None),
        }
    }

    pub(crate) async fn phase(&self) -> ConnectionPhase {
        *self.phase.read().await
    }

    pub(crate) async fn set_phase(&self, phase: ConnectionPhase) {
        *self.phase.write().await = phase;
    }

    /// Record a live peer: address, counter, then the `Open` phase last so
    /// an observer that sees `Open` also sees the rest.
    ///
    /// Refuses once the phase is terminal. `Closed` has no way out, so a
    /// close that raced the setup wins and the late connection is
    /// discarded by the caller.
    pub(crate) async fn note_open(&self, peer: SocketAddr) -> bool {
        let mut phase = self.phase.write().await;
        if phase.is_terminal() {
            return false;
        }
        *self.peer_addr.write().await = Some(peer);
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
        *phase = ConnectionPhase::Open;
        true
    }
}

/// The per-connection event loop, one spawned task per endpoint
/// connection.
pub(crate) struct ConnectionTask {
    shared: Arc<Shared>,
    delegate: Arc<dyn EndpointDelegate>,
    config: EndpointConfig,
    outbound: mpsc::Receiver<Vec<u8>>,
    shutdown: oneshot::Receiver<()>,
    name: String,
}

impl ConnectionTask {
    pub(crate) fn new(
        shared: Arc<Shared>,
        delegate: Arc<dyn EndpointDelegate>,
        config: EndpointConfig,
        outbound: mpsc::Receiver<Vec<u8>>,
        shutdown: oneshot::Receiver<()>,
        name: String,
    ) -> Self {
        Self {
            shared,
            delegate,
            config,
            outbound,
            shutdown,
            name,
        }
    }

    /// Service side: wait for the one peer, then run the open loop.
    ///
    /// Transient accept failures are retried after the configured poll
    /// interval. Any other accept failure closes the endpoint without a
    /// termination callback, since no connection ever opened.
    pub(crate) async fn run_server(mut self, listener: TetherListener) {
        let stream = loop {
            tokio::select! {
                _ = &mut self.shutdown => {
                    self.shared.set_phase(ConnectionPhase::Closed).await;
                    return;
                }
                sent = self.outbound.recv() => match sent {
                    Some(_) => {
                        // Raced the accept; nothing is open to write to.
                    }
                    None => {
                        self.shared.set_phase(ConnectionPhase::Closed).await;
                        return;
                    }
                },
                accepted = listener.accept() => match accepted {
                    Ok(stream) => break stream,
                    Err(err) if is_transient_accept(&err) => {
                        tracing::debug!(
                            name = %self.name,
                            error = %err,
                            "transient accept failure, retrying"
                        );
                        tokio::time::sleep(self.config.poll_interval).await;
                    }
                    Err(err) => {
                        tracing::warn!(
                            name = %self.name,
                            error = %err,
                            "accept failed, closing endpoint"
                        );
                        self.shared.set_phase(ConnectionPhase::Closed).await;
                        return;
                    }
                },
            }
        };
        // One peer per endpoint; stop listening before serving it.
        drop(listener);

        let peer = stream.peer_addr();
        if !self.shared.note_open(peer).await {
            // A local close won the race; the peer never sees this
            // endpoint open.
            return;
        }
        tracing::debug!(name = %self.name, peer = %peer, "peer accepted");
        self.delegate.on_connected(peer);

        self.open_loop(stream).await;
    }

    /// Client side: the stream is already connected and the phase already
    /// `Open`, so this goes straight to the open loop.
    pub(crate) async fn run_client(self, stream: TetherStream) {
        self.open_loop(stream).await;
    }

    async fn open_loop(mut self, mut stream: TetherStream) {
        let mut decoder = FrameDecoder::new(self.config.max_frame_size);
        let mut read_buf = vec![0u8; self.config.max_frame_size];

        let termination = loop {
            // A drained decoder always has room for at least one byte, so
            // the read slice below is never empty.
            let free = decoder.capacity_left();
            tokio::select! {
                _ = &mut self.shutdown => {
                    stream.close().await;
                    break None;
                }
                sent = self.outbound.recv() => match sent {
                    Some(frame) => match self.write_frame(&mut stream, &frame).await {
                        Ok(WriteOutcome::Completed) => {}
                        Ok(WriteOutcome::Interrupted) => {
                            stream.close().await;
                            break None;
                        }
                        Err(err) => break Some(Termination::Io(err)),
                    },
                    None => {
                        stream.close().await;
                        break None;
                    }
                },
                read = stream.read(&mut read_buf[..free]) => match read {
                    Ok(0) => break Some(Termination::PeerClosed),
                    Ok(n) => {
                        let drained =
                            self.drain_inbound(&mut decoder, &read_buf[..n], &mut stream).await;
                        match drained {
                            Ok(WriteOutcome::Completed) => {}
                            Ok(WriteOutcome::Interrupted) => {
                                stream.close().await;
                                break None;
                            }
                            Err(cause) => break Some(cause),
                        }
                    }
                    Err(err) => break Some(Termination::Io(err)),
                },
            }
        };

        self.shared.set_phase(ConnectionPhase::Closed).await;
        match termination {
            Some(cause) => {
                tracing::debug!(name = %self.name, cause = %cause, "connection terminated");
                self.delegate.on_terminated(&cause);
            }
            None => {
                tracing::debug!(name = %self.name, "connection closed locally");
            }
        }
    }

    /// Feed received bytes to the decoder and deliver every complete
    /// message, in arrival order. `Err` means the connection must end for
    /// the given cause; `Ok(Interrupted)` means a local close cut a reply
    /// short.
    async fn drain_inbound(
        &mut self,
        decoder: &mut FrameDecoder,
        data: &[u8],
        stream: &mut TetherStream,
    ) -> Result<WriteOutcome, Termination> {
        if let Err(err) = decoder.push(data) {
            return Err(Termination::Protocol(err));
        }
        loop {
            match decoder.next_message() {
                Ok(Some(message)) => {
                    self.shared.messages_received.fetch_add(1, Ordering::Relaxed);
                    let Some(reply) = self.delegate.on_message(message) else {
                        continue;
                    };
                    match encode(&reply, self.config.max_frame_size) {
                        Ok(frame) => match self.write_frame(stream, &frame).await {
                            Ok(WriteOutcome::Completed) => {}
                            Ok(WriteOutcome::Interrupted) => {
                                return Ok(WriteOutcome::Interrupted);
                            }
                            Err(err) => return Err(Termination::Io(err)),
                        },
                        Err(err) => {
                            // An oversized reply is the handler's bug, not
                            // the peer's; keep the connection up.
                            tracing::warn!(
                                name = %self.name,
                                error = %err,
                                "reply dropped"
                            );
                        }
                    }
                }
                Ok(None) => return Ok(WriteOutcome::Completed),
                Err(err) => return Err(Termination::Protocol(err)),
            }
        }
    }

    /// Write one frame, letting the shutdown signal interrupt a write the
    /// peer has stopped draining. Without this a full send buffer would
    /// park the task in `write_all` where no close could reach it.
    async fn write_frame(
        &mut self,
        stream: &mut TetherStream,
        frame: &[u8],
    ) -> Result<WriteOutcome, io::Error> {
        tokio::select! {
            written = stream.write_all(frame) => written.map(|_| WriteOutcome::Completed),
            _ = &mut self.shutdown => Ok(WriteOutcome::Interrupted),
        }
    }
}

/// Accept failures worth retrying: the handshake died before we got the
/// socket, but the listener itself is fine.
fn is_transient_accept(err: &SetupError) -> bool {
    let SetupError::Accept(io_err) = err else {
        return false;
    };
    matches!(
        io_err.kind(),
        io::ErrorKind::ConnectionAborted | io::ErrorKind::ConnectionReset | io::ErrorKind::Interrupted
    )
}
