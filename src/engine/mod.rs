//! Capture sources and the capture-to-tracker pipeline.

pub mod capture;
pub mod sniffer;

pub use capture::{CaptureStats, LinkLayer, LiveSource, OfflineSource, PacketSource, RawPacket};
pub use sniffer::Sniffer;
