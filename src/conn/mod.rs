//! Connection state tracking and attack detection.

pub mod connection;
pub mod tracker;

pub use connection::{Connection, TcpState};
pub use tracker::ConnTracker;

/// Packet direction relative to the connection initiator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// From client to server (initiator -> responder)
    ToServer,
    /// From server to client (responder -> initiator)
    ToClient,
}

impl Direction {
    pub fn other(self) -> Direction {
        match self {
            Direction::ToServer => Direction::ToClient,
            Direction::ToClient => Direction::ToServer,
        }
    }
}
