use std::fmt::{Display, Formatter};
use std::io;
use std::net::SocketAddr;
use thiserror::Error;

/// A harness error result.
pub type Result<T> = std::result::Result<T, Error>;

/// A harness error.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid packet: {0}")]
    PacketError(#[from] rebound_packet::error::Error),
    #[error("invalid config: {0}")]
    BadConfig(String),
    #[error("IO error: {0}")]
    IoError(#[from] IoError),
    #[error("no scenario matches filter: {0}")]
    EmptySelection(String),
    #[cfg(any(target_os = "macos", target_os = "linux"))]
    #[error("tun device error: {0}")]
    TunError(#[from] tun::Error),
    #[error("packet of {0} bytes exceeds the IPv4 maximum")]
    PacketTooLarge(usize),
    #[error("peer network closed")]
    NetworkClosed,
}

/// Custom IO error result.
pub type IoResult<T> = std::result::Result<T, IoError>;

/// Custom IO error.
#[derive(Error, Debug)]
pub enum IoError {
    #[error("Bind error for {1}: {0}")]
    Bind(io::Error, SocketAddr),
    #[error("Failed to {1}: {0}")]
    Other(io::Error, IoOperation),
}

/// Io operation.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum IoOperation {
    NewSocket,
    SetNonBlocking,
    LocalAddr,
    TunRead,
    TunWrite,
    Runtime,
}

impl Display for IoOperation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NewSocket => write!(f, "create new socket"),
            Self::SetNonBlocking => write!(f, "set non-blocking"),
            Self::LocalAddr => write!(f, "local addr"),
            Self::TunRead => write!(f, "read from tun device"),
            Self::TunWrite => write!(f, "write to tun device"),
            Self::Runtime => write!(f, "start async runtime"),
        }
    }
}
