//! Packet capture sources.
//!
//! Two ways of obtaining one-way packet copies:
//! - PCAP file replay (offline analysis of an archived capture)
//! - live capture from an interface (span port or tap)

use chrono::{DateTime, TimeZone, Utc};
use pcap::{Active, Capture, Device, Linktype, Offline};

use crate::config::CaptureConfig;
use crate::error::{InquestError, Result};

/// Link layer the source produces, deciding which parser entry to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkLayer {
    Ethernet,
    /// Bare IP packets with no link header
    Raw,
}

/// A raw captured packet with its capture timestamp.
#[derive(Debug, Clone)]
pub struct RawPacket {
    pub timestamp: DateTime<Utc>,
    pub data: Vec<u8>,
}

/// Capture statistics
#[derive(Debug, Clone, Copy, Default)]
pub struct CaptureStats {
    /// Packets received
    pub received: u64,
    /// Packets dropped by the kernel
    pub dropped: u64,
    /// Interface drops
    pub if_dropped: u64,
}

/// Trait for packet capture implementations
pub trait PacketSource: Send {
    /// Get the next packet; `None` means the stream is exhausted.
    fn next_packet(&mut self) -> Result<Option<RawPacket>>;

    /// Link layer of the produced packets
    fn link_layer(&self) -> LinkLayer;

    /// Get capture statistics
    fn stats(&mut self) -> CaptureStats;
}

fn link_layer_of(datalink: Linktype) -> LinkLayer {
    // DLT_RAW (101) and DLT_IPV4 (228) carry bare IP packets
    if datalink == Linktype(101) || datalink == Linktype(228) {
        LinkLayer::Raw
    } else {
        LinkLayer::Ethernet
    }
}

fn raw_packet(packet: &pcap::Packet<'_>) -> RawPacket {
    let ts = &packet.header.ts;
    let timestamp = Utc
        .timestamp_opt(ts.tv_sec as i64, (ts.tv_usec as u32).wrapping_mul(1000))
        .single()
        .unwrap_or_else(Utc::now);
    RawPacket {
        timestamp,
        data: packet.data.to_vec(),
    }
}

/// PCAP file replay source.
pub struct OfflineSource {
    capture: Capture<Offline>,
    link: LinkLayer,
    stats: CaptureStats,
}

impl OfflineSource {
    pub fn open<P: AsRef<std::path::Path>>(path: P, filter: &str) -> Result<Self> {
        let mut capture = Capture::from_file(path)?;
        capture.filter(filter, true)?;
        let link = link_layer_of(capture.get_datalink());
        Ok(Self {
            capture,
            link,
            stats: CaptureStats::default(),
        })
    }
}

impl PacketSource for OfflineSource {
    fn next_packet(&mut self) -> Result<Option<RawPacket>> {
        match self.capture.next_packet() {
            Ok(packet) => {
                self.stats.received += 1;
                Ok(Some(raw_packet(&packet)))
            }
            Err(pcap::Error::NoMorePackets) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn link_layer(&self) -> LinkLayer {
        self.link
    }

    fn stats(&mut self) -> CaptureStats {
        self.stats
    }
}

/// Live interface capture source.
pub struct LiveSource {
    capture: Capture<Active>,
    link: LinkLayer,
    received: u64,
}

impl LiveSource {
    pub fn open(interface: &str, config: &CaptureConfig) -> Result<Self> {
        let device = Device::list()?
            .into_iter()
            .find(|d| d.name == interface)
            .ok_or_else(|| InquestError::NoSuchDevice(interface.to_string()))?;

        let mut capture = Capture::from_device(device)?
            .promisc(config.promiscuous)
            .snaplen(config.snaplen as i32)
            .timeout(config.timeout_ms as i32)
            .open()?;
        capture.filter(&config.filter, true)?;
        let link = link_layer_of(capture.get_datalink());

        Ok(Self {
            capture,
            link,
            received: 0,
        })
    }
}

impl PacketSource for LiveSource {
    fn next_packet(&mut self) -> Result<Option<RawPacket>> {
        loop {
            match self.capture.next_packet() {
                Ok(packet) => {
                    self.received += 1;
                    return Ok(Some(raw_packet(&packet)));
                }
                // read timeout with nothing buffered; keep listening
                Err(pcap::Error::TimeoutExpired) => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn link_layer(&self) -> LinkLayer {
        self.link
    }

    fn stats(&mut self) -> CaptureStats {
        match self.capture.stats() {
            Ok(stat) => CaptureStats {
                received: self.received,
                dropped: stat.dropped as u64,
                if_dropped: stat.if_dropped as u64,
            },
            Err(_) => CaptureStats {
                received: self.received,
                ..Default::default()
            },
        }
    }
}
