pub mod client;
pub mod codec;
pub mod config;
pub mod value;

mod command;
mod connection;
mod engine;

pub use client::Client;
pub use config::Config;
pub use value::Value;

use thiserror::Error as ThisError;

/// Client-side failure delivered to a caller. Server-reported errors are
/// not represented here; they arrive as successful completions carrying an
/// error-variant [`Value`].
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum Error {
    /// Commands are arrays of bulk strings by protocol convention.
    #[error("command must be an array value")]
    NotAnArray,
    /// The connection dropped and the command exhausted its retry budget.
    #[error("connection lost and retry limit reached")]
    ConnectionLost,
    /// The client was shut down while the command was outstanding.
    #[error("client stopped")]
    Stopped,
}

pub type Result<T> = std::result::Result<T, Error>;
