//! Tether - Endpoint Layer
//!
//! The public face of the crate. An [`Endpoint`] pairs one connection slot
//! with an [`EndpointDelegate`] and drives the lifecycle
//! `Idle → Establishing → Open → Closed` from a single spawned task.
//! [`service_fn`] turns a bare handler closure into a delegate for
//! endpoints that only need message handling.

mod connection;
mod delegate;
mod endpoint;

pub use connection::ConnectionPhase;
pub use delegate::*;
pub use endpoint::*;
