//! Connection tracker: owns every live connection, keyed by both directed
//! flows.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::config::DetectionConfig;
use crate::core::flow::TcpIpFlow;
use crate::core::packet::PacketManifest;
use crate::logging::attack::SinkFactory;

use super::connection::Connection;

/// Tracker statistics
#[derive(Debug, Clone, Copy, Default)]
pub struct TrackerStats {
    pub packets_processed: u64,
    pub connections_created: u64,
    pub connections_closed: u64,
    /// Packets for unknown connections that were not an opening SYN
    pub packets_ignored: u64,
}

/// Owns connection objects and routes packets to them.
///
/// Every connection is reachable under both of its directed flow keys from
/// creation to destruction. Connections are created when an unknown flow
/// shows a bare SYN and destroyed as soon as they report `Closed`.
pub struct ConnTracker {
    connections: HashMap<u64, Connection>,
    flows: HashMap<TcpIpFlow, u64>,
    next_id: u64,
    config: DetectionConfig,
    sinks: Box<dyn SinkFactory>,
    stats: TrackerStats,
}

impl ConnTracker {
    pub fn new(config: DetectionConfig, sinks: Box<dyn SinkFactory>) -> Self {
        Self {
            connections: HashMap::new(),
            flows: HashMap::new(),
            next_id: 0,
            config,
            sinks,
            stats: TrackerStats::default(),
        }
    }

    /// Whether either directed key of `flow`'s connection is known.
    pub fn has(&self, flow: &TcpIpFlow) -> bool {
        self.flows.contains_key(flow)
    }

    pub fn get(&self, flow: &TcpIpFlow) -> Option<&Connection> {
        self.connections.get(self.flows.get(flow)?)
    }

    pub fn active_connections(&self) -> usize {
        self.connections.len()
    }

    pub fn stats(&self) -> TrackerStats {
        self.stats
    }

    /// Route one parsed packet to its connection, creating the connection
    /// when the packet is an opening SYN. `raw` is archived when the
    /// connection carries a packet logger.
    pub fn receive_packet(&mut self, p: &PacketManifest, flow: TcpIpFlow, raw: &[u8]) {
        self.stats.packets_processed += 1;

        let id = match self.flows.get(&flow) {
            Some(&id) => id,
            None => {
                if !p.tcp.flags.is_syn() {
                    // mid-stream pickup is not attempted; without the
                    // handshake there is no sequence baseline to verify
                    debug!(%flow, "packet for unknown connection ignored");
                    self.stats.packets_ignored += 1;
                    return;
                }
                self.create(flow)
            }
        };

        let conn = self
            .connections
            .get_mut(&id)
            .expect("flow map points at a missing connection");
        conn.log_packet(raw, flow);
        conn.receive_packet(p, flow);

        if conn.is_closed() {
            self.delete(flow);
        }
    }

    fn create(&mut self, flow: TcpIpFlow) -> u64 {
        let id = self.next_id;
        self.next_id += 1;

        let attack_logger = self.sinks.attack_logger(&flow);
        let packet_logger = self.sinks.packet_logger(&flow);
        let conn = Connection::new(flow, &self.config, attack_logger, packet_logger);

        self.flows.insert(flow, id);
        self.flows.insert(flow.reverse(), id);
        self.connections.insert(id, conn);
        self.stats.connections_created += 1;
        debug!(%flow, id, "tracking new connection");
        id
    }

    /// Remove a connection under either of its directed keys and close its
    /// sinks. A miss is a programming error: the caller must hold a key it
    /// obtained from this tracker.
    fn delete(&mut self, flow: TcpIpFlow) {
        let id = self
            .flows
            .remove(&flow)
            .expect("delete of a flow the tracker does not know");
        self.flows.remove(&flow.reverse());
        let mut conn = self
            .connections
            .remove(&id)
            .expect("flow map points at a missing connection");
        conn.close();
        self.stats.connections_closed += 1;
    }

    /// Drain every live connection, closing its sinks. Called on shutdown.
    pub fn close_all(&mut self) {
        let count = self.connections.len();
        for (_, mut conn) in self.connections.drain() {
            debug!(flow = %conn.client_flow(), "tracker shutdown closes connection");
            conn.close();
        }
        self.flows.clear();
        self.stats.connections_closed += count as u64;
        if count > 0 {
            info!("tracker shut down, {} connections closed", count);
        }
    }
}
