//! # Tether
//!
//! Single-peer TCP message endpoints with delegate callbacks.
//!
//! An [`Endpoint`] lets a process act as either a listening service or a
//! connecting client, exchange structured key-value [`Message`]s with
//! exactly one peer, and hear about message arrival, connection
//! establishment and termination through an [`EndpointDelegate`]. It
//! provides:
//!
//! - **One peer per endpoint**: a service stops listening after its first
//!   accept, and an endpoint is spent once its connection closes
//! - **Self-delimiting frames**: length-prefixed key-value encoding with a
//!   hard cap on frame size
//! - **Ordered callbacks**: a single task per connection drives the
//!   delegate in arrival order, never concurrently
//! - **Staged setup errors**: create, bind, listen, accept and connect
//!   failures are reported individually and synchronously
//!
//! ## Modules
//!
//! - [`core`]: configuration and the top-level error type
//! - [`message`]: key-value message model and frame codec
//! - [`transport`]: TCP listener and stream adapters
//! - [`endpoint`]: delegate trait, connection lifecycle, public endpoint
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use tether::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), TetherError> {
//!     // Answer every ping with a pong.
//!     let server = Endpoint::new(
//!         "pong-service",
//!         service_fn(|msg: Message| {
//!             (msg.get_str("op") == Some("ping"))
//!                 .then(|| Message::new().with("op", "pong"))
//!         }),
//!     );
//!     server.start_service_on_port(7070).await?;
//!
//!     let client = Endpoint::new(
//!         "pinger",
//!         service_fn(|msg: Message| {
//!             println!("reply: {:?}", msg.get_str("op"));
//!             None
//!         }),
//!     );
//!     client.connect_to_service_at("127.0.0.1", 7070).await?;
//!     client.send_message(&Message::new().with("op", "ping")).await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod core;
pub mod endpoint;
pub mod message;
pub mod transport;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::core::*;
    pub use crate::endpoint::*;
    pub use crate::message::*;
    pub use crate::transport::*;
}

// Re-export commonly used items at crate root
pub use crate::core::{EndpointConfig, TetherError};
pub use crate::endpoint::{
    ConnectionPhase, Endpoint, EndpointBuilder, EndpointDelegate, SendError, Termination,
    service_fn,
};
pub use crate::message::{Message, Value};
pub use crate::transport::SetupError;
