//! Delegate callbacks for endpoint events.
//!
//! An endpoint never surfaces events by polling; the caller hands it a
//! delegate and the connection task calls back in. Message handling is the
//! one required method, the lifecycle notifications default to no-ops.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

use crate::message::{FrameError, Message};

/// Why an open connection ended.
///
/// Only runtime causes appear here. Setup failures are returned
/// synchronously from the activating call, and a locally requested close
/// reports nothing at all.
#[derive(Debug, Error)]
pub enum Termination {
    /// The peer shut its side down cleanly.
    #[error("peer closed the connection")]
    PeerClosed,
    /// A transport read or write failed.
    #[error("transport failure: {0}")]
    Io(#[source] io::Error),
    /// The peer sent bytes that do not decode as a frame.
    #[error("protocol violation: {0}")]
    Protocol(#[source] FrameError),
}

/// Receives endpoint events.
///
/// Callbacks for one endpoint never run concurrently: the connection task
/// drives each to completion before processing the next event, so inbound
/// messages reach [`EndpointDelegate::on_message`] in arrival order.
pub trait EndpointDelegate: Send + Sync + 'static {
    /// Handle one inbound message.
    ///
    /// Returning `Some(reply)` sends the reply straight back to the peer.
    fn on_message(&self, message: Message) -> Option<Message>;

    /// A connection to `peer` was established.
    ///
    /// At most once per endpoint, on entry to the open phase.
    fn on_connected(&self, peer: SocketAddr) {
        let _ = peer;
    }

    /// The open connection ended.
    ///
    /// At most once per endpoint, and never for a locally requested close.
    fn on_terminated(&self, cause: &Termination) {
        let _ = cause;
    }
}

/// Wrap a plain handler closure into a delegate.
///
/// For endpoints that only care about messages:
///
/// ```
/// use tether::prelude::*;
///
/// let delegate = service_fn(|msg: Message| {
///     let name = msg.get_str("name")?;
///     Some(Message::new().with("greeting", format!("hello {name}")))
/// });
/// ```
pub fn service_fn<F>(f: F) -> ServiceFn<F>
where
    F: Fn(Message) -> Option<Message> + Send + Sync + 'static,
{
    ServiceFn { f }
}

/// Delegate adapter returned by [`service_fn`].
pub struct ServiceFn<F> {
    f: F,
}

impl<F> EndpointDelegate for ServiceFn<F>
where
    F: Fn(Message) -> Option<Message> + Send + Sync + 'static,
{
    fn on_message(&self, message: Message) -> Option<Message> {
        (self.f)(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_fn_forwards_to_closure() {
        let delegate = service_fn(|msg: Message| {
            let n = msg.get_int("n")?;
            Some(Message::new().with("n", n + 1))
        });

        let reply = delegate.on_message(Message::new().with("n", 41)).unwrap();
        assert_eq!(reply.get_int("n"), Some(42));

        assert!(delegate.on_message(Message::new()).is_none());
    }

    #[test]
    fn test_optional_callbacks_default_to_noops() {
        let delegate = service_fn(|_| None);
        delegate.on_connected("127.0.0.1:1".parse().unwrap());
        delegate.on_terminated(&Termination::PeerClosed);
    }

    #[test]
    fn test_termination_display() {
        assert_eq!(
            Termination::PeerClosed.to_string(),
            "peer closed the connection"
        );
        let cause = Termination::Io(io::Error::from(io::ErrorKind::BrokenPipe));
        assert!(cause.to_string().starts_with("transport failure"));
    }
}
