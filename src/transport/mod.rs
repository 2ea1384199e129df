//! Tether - Transport Adapter
//!
//! Thin layer between the endpoint logic and the OS: TCP listeners and
//! streams ([`TetherListener`], [`TetherStream`]) plus the staged setup
//! error taxonomy ([`SetupError`]). Everything above this module deals in
//! frames and messages; everything below it is tokio.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │          Endpoint Layer                 │
//! │   state machine, delegate callbacks     │
//! ├─────────────────────────────────────────┤
//! │          Message Layer                  │
//! │   key-value model, frame codec          │
//! ├─────────────────────────────────────────┤
//! │          Transport Adapter              │  ← This module
//! │   listen/accept/connect, byte I/O       │
//! ├─────────────────────────────────────────┤
//! │              TCP                        │
//! └─────────────────────────────────────────┘
//! ```

mod error;
mod socket;

pub use error::*;
pub use socket::*;
