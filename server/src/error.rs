//! Error types for the daemon and the simulation.
//!
//! Startup and run-loop failures are fatal and surface as [`ServerError`].
//! Per-connection failures are contained in [`ConnectionError`]: by the time
//! one is returned the offending slot has already been disconnected.

use std::io;
use std::net::SocketAddr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServerError {
    /// Construction parameters rejected before any I/O
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Socket setup failed
    #[error("could not bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// The readiness wait itself failed; the run loop cannot continue
    #[error("could not wait on sockets: {0}")]
    Multiplex(#[source] io::Error),
}

#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("slot {slot} has no connection")]
    SlotFree { slot: usize },

    /// Nothing was waiting; the connection stays open
    #[error("slot {slot} has no data waiting")]
    NotReady { slot: usize },

    #[error("slot {slot} closed by peer")]
    Closed { slot: usize },

    #[error("slot {slot} failed: {source}")]
    Io {
        slot: usize,
        #[source]
        source: io::Error,
    },

    #[error("slot {slot} accepted {written} of {expected} bytes")]
    ShortWrite {
        slot: usize,
        written: usize,
        expected: usize,
    },
}

/// A grid coordinate outside the configured dimensions.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("position ({x}, {y}) is outside the {width}x{height} grid")]
pub struct BoundsError {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

pub type ServerResult<T> = Result<T, ServerError>;
