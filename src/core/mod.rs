//! Core packet-level types: sequence arithmetic, flow keys, parsed packets.

pub mod flow;
pub mod packet;
pub mod parser;
pub mod sequence;

pub use flow::TcpIpFlow;
pub use packet::{PacketManifest, TcpFlags, TcpInfo};
pub use sequence::Sequence;
