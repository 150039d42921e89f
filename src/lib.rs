//! inquest - passive TCP stream monitor
//!
//! Observes one-way copies of TCP/IPv4 packets from a span port, tap or
//! capture file, reconstructs each connection's state progression, and
//! flags active on-path attacks: handshake hijack, segment veto / content
//! injection, and out-of-window injection.
//!
//! The crate never forges, injects or blocks packets. Evidence is bounded:
//! only the most recent reassembled segments per direction are kept.

pub mod config;
pub mod conn;
pub mod core;
pub mod engine;
pub mod error;
pub mod logging;
pub mod stream;

pub use config::Config;
pub use conn::{ConnTracker, Connection, TcpState};
pub use core::{PacketManifest, Sequence, TcpIpFlow};
pub use engine::Sniffer;
pub use error::{InquestError, Result};
