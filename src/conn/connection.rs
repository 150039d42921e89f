//! Per-connection TCP finite state machine and attack detectors.
//!
//! The machine is loosely based on the simplified passive-observer FSM:
//! it tracks both half-streams of a connection from one-way packet copies,
//! keeps the recent reassembled segments of each direction in a bounded
//! ring, and flags handshake hijack and segment-veto style injection.
//!
//! A passive observer may have missed packets, so desynchronization is
//! never fatal: packets that do not fit the expected progression are
//! dropped, at most with a trace.

use chrono::Utc;
use tracing::{debug, warn};

use crate::config::DetectionConfig;
use crate::core::flow::TcpIpFlow;
use crate::core::packet::PacketManifest;
use crate::core::sequence::Sequence;
use crate::logging::attack::AttackLogger;
use crate::logging::packets::ConnectionPacketLogger;
use crate::stream::SegmentRing;

use super::Direction;

/// Connection-wide TCP state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcpState {
    /// Waiting for the opening SYN
    Listen,
    /// SYN seen, waiting for the server's SYN-ACK
    ConnectionRequest,
    /// SYN-ACK seen, waiting for the final handshake ACK
    ConnectionEstablished,
    /// Handshake complete, payload flowing
    DataTransfer,
    /// FIN seen, four-way close in progress
    ConnectionClosing,
    /// Terminal state; the connection is destroyed after reaching it
    Closed,
}

/// Close-dialogue state a direction's packets are evaluated against once
/// the connection enters [`TcpState::ConnectionClosing`].
///
/// The closer's own direction starts in `CloseWait` (nothing further is
/// expected from it until the remote has sent its FIN); the remote
/// direction starts in `FinWait1` and walks the four-way close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloseState {
    CloseWait,
    LastAck,
    FinWait1,
    FinWait2,
    TimeWait,
    Closing,
}

/// Tracks the client and server half-streams of one TCP connection.
pub struct Connection {
    state: TcpState,
    client_flow: TcpIpFlow,
    server_flow: TcpIpFlow,
    closing_flow: Option<TcpIpFlow>,
    client_next_seq: Sequence,
    server_next_seq: Sequence,
    /// The ack value the one legitimate SYN-ACK must carry
    hijack_next_ack: Sequence,
    client_close: Option<CloseState>,
    server_close: Option<CloseState>,
    packet_count: u64,
    /// Packets seen since entering DataTransfer
    transfer_count: u64,
    first_few_packets: u64,
    /// Recent segments sent by the client
    client_ring: SegmentRing,
    /// Recent segments sent by the server
    server_ring: SegmentRing,
    attack_logger: Box<dyn AttackLogger>,
    packet_logger: Option<Box<dyn ConnectionPacketLogger>>,
}

impl Connection {
    /// Create a connection in `Listen`, keyed by the flow of its first SYN.
    pub fn new(
        flow: TcpIpFlow,
        config: &DetectionConfig,
        attack_logger: Box<dyn AttackLogger>,
        packet_logger: Option<Box<dyn ConnectionPacketLogger>>,
    ) -> Self {
        Self {
            state: TcpState::Listen,
            client_flow: flow,
            server_flow: flow.reverse(),
            closing_flow: None,
            client_next_seq: Sequence(0),
            server_next_seq: Sequence(0),
            hijack_next_ack: Sequence(0),
            client_close: None,
            server_close: None,
            packet_count: 0,
            transfer_count: 0,
            first_few_packets: config.first_few_packets,
            client_ring: SegmentRing::new(config.max_conn_packets),
            server_ring: SegmentRing::new(config.max_conn_packets),
            attack_logger,
            packet_logger,
        }
    }

    pub fn state(&self) -> TcpState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == TcpState::Closed
    }

    pub fn client_flow(&self) -> TcpIpFlow {
        self.client_flow
    }

    pub fn server_flow(&self) -> TcpIpFlow {
        self.server_flow
    }

    pub fn packet_count(&self) -> u64 {
        self.packet_count
    }

    /// Archive a raw packet when a packet logger is attached.
    pub fn log_packet(&mut self, raw: &[u8], flow: TcpIpFlow) {
        if let Some(logger) = self.packet_logger.as_mut() {
            logger.write_packet(raw, flow);
        }
    }

    /// Close the log sinks. Called by the tracker on removal.
    pub fn close(&mut self) {
        debug!(flow = %self.client_flow, "closing connection");
        self.attack_logger.close();
        if let Some(logger) = self.packet_logger.as_mut() {
            logger.close();
        }
    }

    /// Feed one packet through the state machine. Total on its input:
    /// nothing a packet contains can make this fail.
    pub fn receive_packet(&mut self, p: &PacketManifest, flow: TcpIpFlow) {
        self.packet_count += 1;
        match self.state {
            TcpState::Listen => self.state_listen(p, flow),
            TcpState::ConnectionRequest => self.state_connection_request(p, flow),
            TcpState::ConnectionEstablished => self.state_connection_established(p, flow),
            TcpState::DataTransfer => self.state_data_transfer(p, flow),
            TcpState::ConnectionClosing => self.state_connection_closing(p, flow),
            TcpState::Closed => {
                warn!(%flow, "protocol anomaly: packet on closed connection");
            }
        }
    }

    fn direction_of(&self, flow: &TcpIpFlow) -> Option<Direction> {
        if *flow == self.client_flow {
            Some(Direction::ToServer)
        } else if *flow == self.server_flow {
            Some(Direction::ToClient)
        } else {
            None
        }
    }

    fn next_seq(&self, dir: Direction) -> Sequence {
        match dir {
            Direction::ToServer => self.client_next_seq,
            Direction::ToClient => self.server_next_seq,
        }
    }

    fn set_next_seq(&mut self, dir: Direction, seq: Sequence) {
        match dir {
            Direction::ToServer => self.client_next_seq = seq,
            Direction::ToClient => self.server_next_seq = seq,
        }
    }

    fn close_state(&self, dir: Direction) -> Option<CloseState> {
        match dir {
            Direction::ToServer => self.client_close,
            Direction::ToClient => self.server_close,
        }
    }

    fn set_close_state(&mut self, dir: Direction, state: CloseState) {
        match dir {
            Direction::ToServer => self.client_close = Some(state),
            Direction::ToClient => self.server_close = Some(state),
        }
    }

    fn ring(&self, dir: Direction) -> &SegmentRing {
        match dir {
            Direction::ToServer => &self.client_ring,
            Direction::ToClient => &self.server_ring,
        }
    }

    fn ring_mut(&mut self, dir: Direction) -> &mut SegmentRing {
        match dir {
            Direction::ToServer => &mut self.client_ring,
            Direction::ToClient => &mut self.server_ring,
        }
    }

    /// A SYN opens the handshake and pins down who the client is.
    ///
    /// SYN (and SYN-ACK) packets may carry payload if a TCP extension is in
    /// use, so the payload length counts toward the next expected sequence.
    fn state_listen(&mut self, p: &PacketManifest, flow: TcpIpFlow) {
        if !p.tcp.flags.is_syn() {
            debug!(%flow, flags = %p.tcp.flags, "non-SYN packet in Listen");
            return;
        }
        self.client_flow = flow;
        self.server_flow = flow.reverse();
        self.client_next_seq = p.tcp.seq.add(p.payload_len() as i32 + 1);
        self.hijack_next_ack = self.client_next_seq;
        self.state = TcpState::ConnectionRequest;
    }

    /// Expect the server's SYN-ACK acknowledging the client's ISN.
    fn state_connection_request(&mut self, p: &PacketManifest, flow: TcpIpFlow) {
        if flow != self.server_flow {
            // handshake anomaly
            return;
        }
        if !p.tcp.flags.is_syn_ack() {
            // handshake anomaly
            return;
        }
        if self.client_next_seq.diff(p.tcp.ack) != 0 {
            // handshake anomaly
            return;
        }
        self.server_next_seq = p.tcp.seq.add(p.payload_len() as i32 + 1);
        self.state = TcpState::ConnectionEstablished;
    }

    /// Expect the client's final handshake ACK.
    fn state_connection_established(&mut self, p: &PacketManifest, flow: TcpIpFlow) {
        self.detect_hijack(p, flow);
        if flow != self.client_flow {
            // handshake anomaly
            return;
        }
        if !p.tcp.flags.ack || p.tcp.flags.syn {
            // handshake anomaly
            return;
        }
        if p.tcp.seq.diff(self.client_next_seq) != 0 {
            // handshake anomaly
            return;
        }
        if p.tcp.ack.diff(self.server_next_seq) != 0 {
            // handshake anomaly
            return;
        }
        self.state = TcpState::DataTransfer;
        self.transfer_count = 0;
    }

    fn state_data_transfer(&mut self, p: &PacketManifest, flow: TcpIpFlow) {
        self.transfer_count += 1;
        if self.transfer_count <= self.first_few_packets {
            self.detect_hijack(p, flow);
        }

        let Some(dir) = self.direction_of(&flow) else {
            return;
        };
        let diff = p.tcp.seq.diff(self.next_seq(dir));

        if diff > 0 {
            // The segment starts before the next expected byte: either a
            // retransmission or an injection attempt. Evidence stays as it
            // is; overlaps never advance the stream.
            self.detect_injection(p, flow, dir);
        } else if diff == 0 {
            if p.tcp.flags.rst {
                debug!(%flow, "RST, connection closed");
                self.state = TcpState::Closed;
                return;
            }
            if p.tcp.flags.fin {
                debug!(%flow, "FIN, entering connection closing");
                self.closing_flow = Some(flow);
                self.set_next_seq(dir, self.next_seq(dir).add(1));
                self.state = TcpState::ConnectionClosing;
                self.set_close_state(dir, CloseState::CloseWait);
                self.set_close_state(dir.other(), CloseState::FinWait1);
                return;
            }
            if !p.tcp.payload.is_empty() {
                self.ring_mut(dir).push(p.tcp.seq, p.tcp.payload.clone());
                self.set_next_seq(dir, p.tcp.seq.add(p.payload_len() as i32));
            }
        } else {
            // future out-of-order segment; not buffered
            debug!(%flow, seq = %p.tcp.seq, "out-of-order segment ignored");
        }
    }

    fn state_connection_closing(&mut self, p: &PacketManifest, flow: TcpIpFlow) {
        let Some(dir) = self.direction_of(&flow) else {
            return;
        };
        if Some(flow) == self.closing_flow {
            match self.close_state(dir) {
                Some(CloseState::LastAck) => self.close_last_ack(p, flow, dir),
                _ => {
                    warn!(%flow, "protocol anomaly: unexpected packet from closing side");
                }
            }
        } else {
            match self.close_state(dir) {
                Some(CloseState::FinWait1) => self.close_fin_wait1(p, flow, dir),
                Some(CloseState::FinWait2) => self.close_fin_wait2(p, flow, dir),
                Some(CloseState::TimeWait) => {
                    warn!(%flow, "protocol anomaly: packet in TIME-WAIT");
                }
                Some(CloseState::Closing) => {
                    warn!(%flow, "protocol anomaly: packet in CLOSING");
                }
                _ => {
                    warn!(%flow, "protocol anomaly: no close dialogue for this direction");
                }
            }
        }
    }

    /// The remote either acknowledges the FIN (simultaneous close still
    /// pending) or answers FIN+ACK, collapsing both steps.
    fn close_fin_wait1(&mut self, p: &PacketManifest, flow: TcpIpFlow, dir: Direction) {
        if p.tcp.seq.diff(self.next_seq(dir)) != 0 {
            warn!(%flow, seq = %p.tcp.seq, expected = %self.next_seq(dir),
                "FIN-WAIT-1: out of order packet");
            return;
        }
        if !p.tcp.flags.ack {
            warn!(%flow, "FIN-WAIT-1: non-ACK packet");
            return;
        }
        if p.tcp.ack.diff(self.next_seq(dir.other())) != 0 {
            warn!(%flow, ack = %p.tcp.ack, expected = %self.next_seq(dir.other()),
                "FIN-WAIT-1: unexpected ACK");
            return;
        }
        if p.tcp.flags.fin {
            self.set_close_state(dir, CloseState::Closing);
            self.set_close_state(dir.other(), CloseState::LastAck);
            self.set_next_seq(dir, p.tcp.seq.add(p.payload_len() as i32 + 1));
        } else {
            self.set_close_state(dir, CloseState::FinWait2);
        }
    }

    /// The remote's own FIN after it already acknowledged ours.
    fn close_fin_wait2(&mut self, p: &PacketManifest, flow: TcpIpFlow, dir: Direction) {
        if p.tcp.seq.diff(self.next_seq(dir)) != 0 {
            warn!(%flow, "FIN-WAIT-2: out of order packet");
            return;
        }
        if !(p.tcp.flags.ack && p.tcp.flags.fin) {
            warn!(%flow, "FIN-WAIT-2: protocol anomaly");
            return;
        }
        if p.tcp.ack.diff(self.next_seq(dir.other())) != 0 {
            warn!(%flow, "FIN-WAIT-2: unexpected ACK");
            return;
        }
        self.set_next_seq(dir, self.next_seq(dir).add(1));
        self.set_close_state(dir, CloseState::TimeWait);
    }

    /// The closer's final ACK completes the four-way close.
    fn close_last_ack(&mut self, p: &PacketManifest, flow: TcpIpFlow, dir: Direction) {
        if p.tcp.seq.diff(self.next_seq(dir)) != 0 {
            warn!(%flow, seq = %p.tcp.seq, expected = %self.next_seq(dir),
                "LAST-ACK: out of order packet");
            return;
        }
        if !p.tcp.flags.ack || p.tcp.flags.fin || p.tcp.flags.syn {
            warn!(%flow, "LAST-ACK: protocol anomaly");
            return;
        }
        if p.tcp.ack.diff(self.next_seq(dir.other())) != 0 {
            warn!(%flow, "LAST-ACK: unexpected ACK");
            return;
        }
        debug!(%flow, "connection closed gracefully");
        self.state = TcpState::Closed;
    }

    /// A second SYN-ACK carrying the ack value the legitimate handshake
    /// already consumed means someone raced the real server.
    fn detect_hijack(&mut self, p: &PacketManifest, flow: TcpIpFlow) {
        if flow != self.server_flow {
            return;
        }
        if !p.tcp.flags.is_syn_ack() {
            return;
        }
        if self.hijack_next_ack.diff(p.tcp.ack) == 0 {
            warn!(%flow, "handshake hijack attempt detected");
            self.attack_logger.report_hijack(Utc::now(), flow);
        }
    }

    /// Compare an overlapping segment against the bytes previously seen
    /// from the same sender; differing bytes are a segment veto.
    fn detect_injection(&mut self, p: &PacketManifest, flow: TcpIpFlow, dir: Direction) {
        if p.tcp.payload.is_empty() {
            debug!(%flow, "zero-length overlap segment, nothing to compare");
            return;
        }
        let start = p.tcp.seq;
        let end = start.add(p.payload_len() as i32 - 1);

        let Some(overlap) = self.ring(dir).extract_overlap(start, end) else {
            warn!(%flow, %start, %end,
                "suspected injection, but no ring segments cover the range; \
                 retrospective analysis not possible");
            return;
        };

        let fresh = &p.tcp.payload[overlap.start_offset..overlap.end_offset];
        if overlap.bytes != fresh {
            warn!(%flow, %start, %end, "segment veto detected");
            self.attack_logger.report_injection(
                Utc::now(),
                flow,
                &p.tcp.payload,
                &overlap.bytes,
                start,
                end,
                overlap.start_offset,
                overlap.end_offset,
            );
        } else {
            debug!(%flow, %start, "benign retransmission");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::packet::{TcpFlags, TcpInfo};
    use crate::logging::attack::{AttackKind, MemorySinkFactory, ReportStore, SinkFactory};
    use std::net::Ipv4Addr;

    const SYN: u8 = 0x02;
    const ACK: u8 = 0x10;
    const FIN: u8 = 0x01;
    const RST: u8 = 0x04;

    fn client_flow() -> TcpIpFlow {
        TcpIpFlow::new(
            Ipv4Addr::new(192, 168, 1, 100),
            54321,
            Ipv4Addr::new(10, 0, 0, 1),
            80,
        )
    }

    fn packet(flow: TcpIpFlow, seq: u32, ack: u32, flags: u8, payload: &[u8]) -> PacketManifest {
        PacketManifest {
            timestamp: Utc::now(),
            src_ip: flow.src_ip,
            dst_ip: flow.dst_ip,
            tcp: TcpInfo {
                src_port: flow.src_port,
                dst_port: flow.dst_port,
                seq: Sequence(seq),
                ack: Sequence(ack),
                flags: TcpFlags::from_u8(flags),
                window: 65535,
                payload: payload.to_vec(),
            },
        }
    }

    fn new_connection() -> (Connection, ReportStore) {
        let factory = MemorySinkFactory::default();
        let store = factory.store.clone();
        let conn = Connection::new(
            client_flow(),
            &DetectionConfig::default(),
            factory.attack_logger(&client_flow()),
            None,
        );
        (conn, store)
    }

    fn feed(conn: &mut Connection, p: PacketManifest) {
        let flow = p.flow();
        conn.receive_packet(&p, flow);
    }

    /// Drive the S1 three-way handshake: client ISN 100, server ISN 500.
    fn handshake(conn: &mut Connection) {
        let c = client_flow();
        let s = c.reverse();
        feed(conn, packet(c, 100, 0, SYN, b""));
        feed(conn, packet(s, 500, 101, SYN | ACK, b""));
        feed(conn, packet(c, 101, 501, ACK, b""));
    }

    #[test]
    fn test_clean_handshake_reaches_data_transfer() {
        let (mut conn, store) = new_connection();

        feed(&mut conn, packet(client_flow(), 100, 0, SYN, b""));
        assert_eq!(conn.state(), TcpState::ConnectionRequest);
        assert_eq!(conn.client_next_seq, Sequence(101));
        assert_eq!(conn.hijack_next_ack, Sequence(101));

        feed(&mut conn, packet(client_flow().reverse(), 500, 101, SYN | ACK, b""));
        assert_eq!(conn.state(), TcpState::ConnectionEstablished);
        assert_eq!(conn.server_next_seq, Sequence(501));

        feed(&mut conn, packet(client_flow(), 101, 501, ACK, b""));
        assert_eq!(conn.state(), TcpState::DataTransfer);
        assert!(store.is_empty());
    }

    #[test]
    fn test_handshake_anomalies_are_absorbed() {
        let (mut conn, store) = new_connection();
        let c = client_flow();
        let s = c.reverse();

        feed(&mut conn, packet(c, 100, 0, SYN, b""));
        // SYN-ACK from the wrong direction
        feed(&mut conn, packet(c, 500, 101, SYN | ACK, b""));
        assert_eq!(conn.state(), TcpState::ConnectionRequest);
        // SYN-ACK acking the wrong sequence
        feed(&mut conn, packet(s, 500, 999, SYN | ACK, b""));
        assert_eq!(conn.state(), TcpState::ConnectionRequest);
        // correct one still accepted afterwards
        feed(&mut conn, packet(s, 500, 101, SYN | ACK, b""));
        assert_eq!(conn.state(), TcpState::ConnectionEstablished);
        assert!(store.is_empty());
    }

    #[test]
    fn test_hijack_duplicate_syn_ack_is_reported() {
        let (mut conn, store) = new_connection();
        handshake(&mut conn);

        // Racing SYN-ACK with the witnessed ack value but a different ISN.
        feed(&mut conn, packet(client_flow().reverse(), 999, 101, SYN | ACK, b""));

        let reports = store.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].kind, AttackKind::HandshakeHijack);
        assert_eq!(reports[0].flow, client_flow().reverse());
        // the stray SYN-ACK must not corrupt the stream state
        assert_eq!(conn.state(), TcpState::DataTransfer);
    }

    #[test]
    fn test_hijack_detector_gated_after_first_few_packets() {
        let (mut conn, store) = new_connection();
        handshake(&mut conn);
        let s = client_flow().reverse();

        // Busy the connection past the post-handshake window with
        // out-of-order no-ops that leave state untouched.
        for _ in 0..DetectionConfig::default().first_few_packets {
            feed(&mut conn, packet(s, 4000, 101, ACK, b""));
        }
        feed(&mut conn, packet(s, 999, 101, SYN | ACK, b""));
        assert!(store.is_empty());
    }

    #[test]
    fn test_contiguous_data_fills_sender_ring() {
        let (mut conn, _store) = new_connection();
        handshake(&mut conn);

        feed(&mut conn, packet(client_flow(), 101, 501, ACK, b"HELLO"));
        assert_eq!(conn.client_next_seq, Sequence(106));
        assert_eq!(conn.client_ring.len(), 1);
        let cell = conn.client_ring.iter().next().unwrap();
        assert_eq!(cell.seq, Sequence(101));
        assert_eq!(cell.bytes, b"HELLO");
        assert!(conn.server_ring.is_empty());
    }

    #[test]
    fn test_benign_retransmission_not_reported() {
        let (mut conn, store) = new_connection();
        handshake(&mut conn);

        feed(&mut conn, packet(client_flow(), 101, 501, ACK, b"HELLO"));
        feed(&mut conn, packet(client_flow(), 101, 501, ACK, b"HELLO"));

        assert!(store.is_empty());
        // the retransmission must not advance the stream or grow the ring
        assert_eq!(conn.client_next_seq, Sequence(106));
        assert_eq!(conn.client_ring.len(), 1);
    }

    #[test]
    fn test_segment_veto_is_reported() {
        let (mut conn, store) = new_connection();
        handshake(&mut conn);

        feed(&mut conn, packet(client_flow(), 101, 501, ACK, b"HELLO"));
        feed(&mut conn, packet(client_flow(), 101, 501, ACK, b"HXLLO"));

        let reports = store.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].kind, AttackKind::SegmentVeto);
        assert_eq!(reports[0].payload.as_deref(), Some(b"HXLLO".as_slice()));
        assert_eq!(reports[0].overlap.as_deref(), Some(b"HELLO".as_slice()));
        assert_eq!(reports[0].start, Some(101));
        assert_eq!(reports[0].end, Some(105));
        assert_eq!(reports[0].payload_start, Some(0));
        assert_eq!(reports[0].payload_end, Some(5));
    }

    #[test]
    fn test_partial_overlap_across_two_segments() {
        let (mut conn, store) = new_connection();
        handshake(&mut conn);

        feed(&mut conn, packet(client_flow(), 101, 501, ACK, b"AB"));
        feed(&mut conn, packet(client_flow(), 103, 501, ACK, b"CD"));
        // seq 102 covers the seam: previously "BC", now "XC".
        feed(&mut conn, packet(client_flow(), 102, 501, ACK, b"XC"));

        let reports = store.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].overlap.as_deref(), Some(b"BC".as_slice()));
        assert_eq!(reports[0].payload.as_deref(), Some(b"XC".as_slice()));
        assert_eq!(reports[0].payload_start, Some(0));
        assert_eq!(reports[0].payload_end, Some(2));
    }

    #[test]
    fn test_overlap_without_ring_evidence_is_diagnostic_only() {
        let (mut conn, store) = new_connection();
        handshake(&mut conn);

        feed(&mut conn, packet(client_flow(), 101, 501, ACK, b"HELLO"));
        // Force eviction of everything by a tiny ring? Capacity is 40, so
        // instead query a range the ring never held: rewind far behind.
        feed(&mut conn, packet(client_flow(), 50, 501, ACK, b"XX"));

        assert!(store.is_empty());
        assert_eq!(conn.state(), TcpState::DataTransfer);
    }

    #[test]
    fn test_rst_closes_connection() {
        let (mut conn, _store) = new_connection();
        handshake(&mut conn);

        feed(&mut conn, packet(client_flow(), 101, 501, ACK | RST, b""));
        assert!(conn.is_closed());
    }

    #[test]
    fn test_graceful_close() {
        let (mut conn, store) = new_connection();
        handshake(&mut conn);
        let c = client_flow();
        let s = c.reverse();

        // client initiates the close
        feed(&mut conn, packet(c, 101, 501, ACK | FIN, b""));
        assert_eq!(conn.state(), TcpState::ConnectionClosing);
        assert_eq!(conn.client_next_seq, Sequence(102));

        // server answers FIN+ACK, collapsing FIN-WAIT into the last ack
        feed(&mut conn, packet(s, 501, 102, ACK | FIN, b""));
        assert_eq!(conn.state(), TcpState::ConnectionClosing);
        assert_eq!(conn.server_next_seq, Sequence(502));

        // client's final ACK
        feed(&mut conn, packet(c, 102, 502, ACK, b""));
        assert!(conn.is_closed());
        assert!(store.is_empty());
    }

    #[test]
    fn test_close_via_fin_wait2() {
        let (mut conn, _store) = new_connection();
        handshake(&mut conn);
        let c = client_flow();
        let s = c.reverse();

        feed(&mut conn, packet(c, 101, 501, ACK | FIN, b""));
        // server first only acknowledges the FIN
        feed(&mut conn, packet(s, 501, 102, ACK, b""));
        assert_eq!(conn.server_close, Some(CloseState::FinWait2));

        // then sends its own FIN+ACK
        feed(&mut conn, packet(s, 501, 102, ACK | FIN, b""));
        assert_eq!(conn.server_close, Some(CloseState::TimeWait));
        assert_eq!(conn.server_next_seq, Sequence(502));
        assert_eq!(conn.state(), TcpState::ConnectionClosing);
    }

    #[test]
    fn test_closing_anomalies_do_not_close() {
        let (mut conn, _store) = new_connection();
        handshake(&mut conn);
        let c = client_flow();
        let s = c.reverse();

        feed(&mut conn, packet(c, 101, 501, ACK | FIN, b""));
        // out-of-order packet from the server
        feed(&mut conn, packet(s, 777, 102, ACK | FIN, b""));
        assert_eq!(conn.state(), TcpState::ConnectionClosing);
        // premature chatter from the closer
        feed(&mut conn, packet(c, 102, 501, ACK, b""));
        assert_eq!(conn.state(), TcpState::ConnectionClosing);
    }

    #[test]
    fn test_syn_with_payload_counts_toward_next_seq() {
        let (mut conn, _store) = new_connection();
        feed(&mut conn, packet(client_flow(), 100, 0, SYN, b"abc"));
        assert_eq!(conn.client_next_seq, Sequence(104));
        assert_eq!(conn.hijack_next_ack, Sequence(104));
    }
}
