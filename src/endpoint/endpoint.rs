//! The public endpoint object.
//!
//! An [`Endpoint`] owns one connection slot, a delegate, and the
//! configuration for both roles. Activating it as a service or as a client
//! spawns the connection task; afterwards the handle only observes state,
//! queues frames for the task's writer, and holds the shutdown signal that
//! ends the task even when that queue is stalled. The task keeps sole
//! ownership of the transport handle.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{RwLock, mpsc, oneshot};

use super::connection::{ConnectionPhase, ConnectionTask, Shared};
use super::delegate::EndpointDelegate;
use crate::core::EndpointConfig;
use crate::message::{FrameError, Message, encode, sizes};
use crate::transport::{SetupError, TetherListener, TetherStream};

/// Depth of the outbound frame queue between the handle and the task.
const SEND_QUEUE_SIZE: usize = 32;

/// Channels the handle keeps to reach its spawned connection task.
struct TaskHandles {
    /// Encoded frames awaiting the task's writer.
    outbound: mpsc::Sender<Vec<u8>>,
    /// Close signal outside the frame queue; reaches the task even while
    /// its writer is stalled on the peer.
    shutdown: oneshot::Sender<()>,
}

/// Errors from [`Endpoint::send_message`].
#[derive(Debug, Error)]
pub enum SendError {
    /// The connection is not open.
    #[error("endpoint is not connected")]
    NotConnected,
    /// The message does not fit the frame cap.
    #[error("message could not be encoded: {0}")]
    Encode(#[from] FrameError),
}

/// A single-peer message endpoint.
///
/// One endpoint talks to exactly one peer over its lifetime: activate it
/// once with [`Endpoint::start_service_on_port`] or
/// [`Endpoint::connect_to_service_at`], exchange messages while the
/// connection is open, and it is spent once the connection closes.
pub struct Endpoint {
    name: String,
    config: EndpointConfig,
    delegate: Arc<dyn EndpointDelegate>,
    shared: Arc<Shared>,
    handles: RwLock<Option<TaskHandles>>,
}

impl Endpoint {
    /// Create an endpoint with default configuration.
    pub fn new(name: impl Into<String>, delegate: impl EndpointDelegate) -> Self {
        Self::builder(name).build(delegate)
    }

    /// Start building an endpoint with custom configuration.
    pub fn builder(name: impl Into<String>) -> EndpointBuilder {
        EndpointBuilder::new(name)
    }

    /// Name given at construction.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Begin listening on `port` and serve the first peer to arrive.
    ///
    /// The create, bind and listen stages run before this returns, so
    /// their failures come back synchronously and leave the endpoint
    /// closed. The accept happens on the connection task. Port 0 asks the
    /// OS for a free port, observable through [`Endpoint::local_addr`]
    /// once this returns.
    pub async fn start_service_on_port(&self, port: u16) -> Result<(), SetupError> {
        self.claim_idle().await?;

        let listener = match TetherListener::create(port, self.config.backlog) {
            Ok(listener) => listener,
            Err(err) => {
                self.shared.set_phase(ConnectionPhase::Closed).await;
                return Err(err);
            }
        };
        let local = listener.local_addr().ok();
        *self.shared.local_addr.write().await = local;

        let Some(task) = self.make_task().await else {
            // Closed while establishing; the listener is released on the
            // way out.
            return Err(SetupError::AlreadyActive);
        };
        tokio::spawn(task.run_server(listener));
        tracing::debug!(
            name = %self.name,
            local = ?local,
            "service listening"
        );
        Ok(())
    }

    /// Connect to the service at `ip:port`.
    ///
    /// On success the connection is already open when this returns: the
    /// delegate's `on_connected` has fired and [`Endpoint::send_message`]
    /// is ready. On failure the endpoint is closed.
    pub async fn connect_to_service_at(&self, ip: &str, port: u16) -> Result<(), SetupError> {
        self.claim_idle().await?;

        let stream = match TetherStream::connect(ip, port).await {
            Ok(stream) => stream,
            Err(err) => {
                self.shared.set_phase(ConnectionPhase::Closed).await;
                return Err(err);
            }
        };
        *self.shared.local_addr.write().await = stream.local_addr().ok();

        let Some(task) = self.make_task().await else {
            return Err(SetupError::AlreadyActive);
        };
        let peer = stream.peer_addr();
        if !self.shared.note_open(peer).await {
            // Closed while establishing; the dialed connection is
            // discarded unopened.
            return Err(SetupError::AlreadyActive);
        }
        tracing::debug!(name = %self.name, peer = %peer, "connected to service");
        self.delegate.on_connected(peer);

        tokio::spawn(task.run_client(stream));
        Ok(())
    }

    /// Send a message to the connected peer.
    ///
    /// Failures are synchronous: [`SendError::NotConnected`] outside the
    /// open phase, [`SendError::Encode`] when the message does not fit the
    /// frame cap. Neither writes anything, so the outbound stream stays
    /// clean for later sends.
    pub async fn send_message(&self, message: &Message) -> Result<(), SendError> {
        if !self.shared.phase().await.is_open() {
            return Err(SendError::NotConnected);
        }
        let frame = encode(message, self.config.max_frame_size)?;

        let sender = self
            .handles
            .read()
            .await
            .as_ref()
            .map(|handles| handles.outbound.clone());
        let Some(sender) = sender else {
            return Err(SendError::NotConnected);
        };
        sender.send(frame).await.map_err(|_| SendError::NotConnected)
    }

    /// Close the connection and release its resources.
    ///
    /// Callable any number of times and in any phase; never triggers the
    /// termination callback. The close signal bypasses the send queue, so
    /// this returns promptly even when the peer has stopped reading;
    /// frames still queued at that point are abandoned. Dropping the
    /// endpoint closes the same way.
    pub async fn close(&self) {
        let handles = {
            let mut handles = self.handles.write().await;
            self.shared.set_phase(ConnectionPhase::Closed).await;
            handles.take()
        };
        if let Some(handles) = handles {
            let _ = handles.shutdown.send(());
        }
    }

    /// Check whether the connection is currently open.
    pub async fn is_connected(&self) -> bool {
        self.shared.phase().await.is_open()
    }

    /// Current lifecycle phase.
    pub async fn phase(&self) -> ConnectionPhase {
        self.shared.phase().await
    }

    /// Messages received over the connection's lifetime.
    pub fn num_messages(&self) -> u64 {
        self.shared.messages_received.load(Ordering::Relaxed)
    }

    /// Connections this endpoint has opened, either zero or one.
    pub fn num_connections(&self) -> u64 {
        self.shared.connections_opened.load(Ordering::Relaxed)
    }

    /// Local address, known once the endpoint is listening or connected.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        *self.shared.local_addr.read().await
    }

    /// Peer address, known once the connection is open.
    pub async fn peer_addr(&self) -> Option<SocketAddr> {
        *self.shared.peer_addr.read().await
    }

    /// One-line status snapshot for logs and diagnostics.
    pub async fn describe(&self) -> String {
        format!(
            "{} [{}] messages={} connections={}",
            self.name,
            self.shared.phase().await,
            self.num_messages(),
            self.num_connections(),
        )
    }

    /// Claim the connection slot, failing if any connection exists or
    /// existed.
    async fn claim_idle(&self) -> Result<(), SetupError> {
        let mut phase = self.shared.phase.write().await;
        if !phase.can_activate() {
            return Err(SetupError::AlreadyActive);
        }
        *phase = ConnectionPhase::Establishing;
        Ok(())
    }

    /// Wire up the task's channels.
    ///
    /// Checks the phase under the handles lock so a `close` that raced the
    /// setup is seen here: it either finds these handles to take, or this
    /// refuses and no task runs at all.
    async fn make_task(&self) -> Option<ConnectionTask> {
        let mut handles = self.handles.write().await;
        if self.shared.phase().await.is_terminal() {
            return None;
        }
        let (outbound_tx, outbound_rx) = mpsc::channel(SEND_QUEUE_SIZE);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        *handles = Some(TaskHandles {
            outbound: outbound_tx,
            shutdown: shutdown_tx,
        });
        Some(ConnectionTask::new(
            Arc::clone(&self.shared),
            Arc::clone(&self.delegate),
            self.config.clone(),
            outbound_rx,
            shutdown_rx,
            self.name.clone(),
        ))
    }
}

/// Builder for endpoints with custom tuning.
#[derive(Debug, Clone)]
pub struct EndpointBuilder {
    name: String,
    config: EndpointConfig,
}

impl EndpointBuilder {
    /// Create a builder with default configuration.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: EndpointConfig::default(),
        }
    }

    /// Replace the whole configuration, clamping fields the same way the
    /// individual setters do.
    pub fn config(self, config: EndpointConfig) -> Self {
        let EndpointConfig {
            max_frame_size,
            poll_interval,
            backlog,
        } = config;
        self.max_frame_size(max_frame_size)
            .poll_interval(poll_interval)
            .backlog(backlog)
    }

    /// Cap on encoded frame size, applied outbound and inbound.
    ///
    /// Clamped to what the wire format can represent: no smaller than an
    /// empty frame, no larger than the length prefix can describe.
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.config.max_frame_size = size.clamp(sizes::MIN_FRAME_SIZE, sizes::MAX_FRAME_SIZE);
        self
    }

    /// Backoff between transient accept failures in the service role.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    /// Listen backlog for the service role.
    pub fn backlog(mut self, backlog: u32) -> Self {
        self.config.backlog = backlog;
        self
    }

    /// Build the endpoint with its delegate.
    pub fn build(self, delegate: impl EndpointDelegate) -> Endpoint {
        Endpoint {
            name: self.name,
            config: self.config,
            delegate: Arc::new(delegate),
            shared: Arc::new(Shared::new()),
            handles: RwLock::new(None),
        }
    }
}
