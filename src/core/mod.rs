//! Tether - Core Configuration and Errors

mod config;
mod error;

pub use config::*;
pub use error::*;
