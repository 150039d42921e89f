//! The capture-to-tracker pipeline.
//!
//! One synchronous loop per capture source: packets for a connection reach
//! its state machine in wire-arrival order, one at a time. Detectors run to
//! completion before the next packet is pulled.

use tracing::{debug, info};

use crate::conn::tracker::ConnTracker;
use crate::core::parser::{parse_ip_packet, parse_packet};
use crate::error::{InquestError, Result};

use super::capture::{LinkLayer, PacketSource};

/// Pipeline counters
#[derive(Debug, Clone, Copy, Default)]
pub struct SnifferStats {
    pub packets_seen: u64,
    pub packets_tracked: u64,
    /// Non-IPv4/non-TCP packets the BPF filter let through
    pub packets_skipped: u64,
    pub parse_errors: u64,
    pub bytes_seen: u64,
}

/// Drives packets from a capture source through the connection tracker.
pub struct Sniffer {
    source: Box<dyn PacketSource>,
    tracker: ConnTracker,
    progress_interval: u64,
    stats: SnifferStats,
}

impl Sniffer {
    pub fn new(
        source: Box<dyn PacketSource>,
        tracker: ConnTracker,
        progress_interval: u64,
    ) -> Self {
        Self {
            source,
            tracker,
            progress_interval,
            stats: SnifferStats::default(),
        }
    }

    /// Run until the source is exhausted, then drain the tracker.
    pub fn run(&mut self) -> Result<SnifferStats> {
        info!("sniffer started");

        while let Some(raw) = self.source.next_packet()? {
            self.stats.packets_seen += 1;
            self.stats.bytes_seen += raw.data.len() as u64;

            let parsed = match self.source.link_layer() {
                LinkLayer::Ethernet => parse_packet(&raw.data, raw.timestamp),
                LinkLayer::Raw => parse_ip_packet(&raw.data, raw.timestamp),
            };

            match parsed {
                Ok((manifest, flow)) => {
                    self.tracker.receive_packet(&manifest, flow, &raw.data);
                    self.stats.packets_tracked += 1;
                }
                Err(InquestError::NotIpv4 | InquestError::NotTcp) => {
                    self.stats.packets_skipped += 1;
                }
                Err(e) => {
                    self.stats.parse_errors += 1;
                    debug!("unparseable packet: {}", e);
                }
            }

            if self.progress_interval > 0 && self.stats.packets_seen % self.progress_interval == 0
            {
                let tracker = self.tracker.stats();
                info!(
                    "packets: {} | tracked: {} | connections: {} active, {} closed",
                    self.stats.packets_seen,
                    self.stats.packets_tracked,
                    self.tracker.active_connections(),
                    tracker.connections_closed,
                );
            }
        }

        self.tracker.close_all();
        info!(
            "sniffer finished: {} packets, {} tracked, {} skipped, {} parse errors",
            self.stats.packets_seen,
            self.stats.packets_tracked,
            self.stats.packets_skipped,
            self.stats.parse_errors,
        );
        Ok(self.stats)
    }

    pub fn stats(&self) -> SnifferStats {
        self.stats
    }

    pub fn tracker(&self) -> &ConnTracker {
        &self.tracker
    }
}
