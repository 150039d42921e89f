//! Raw frame to [`PacketManifest`] conversion.
//!
//! Only IPv4/TCP traffic is of interest; anything else is reported as a
//! typed error so the capture loop can skip it without logging noise.

use chrono::{DateTime, Utc};
use etherparse::{NetSlice, SlicedPacket, TransportSlice};

use crate::error::{InquestError, Result};

use super::flow::TcpIpFlow;
use super::packet::{PacketManifest, TcpFlags, TcpInfo};
use super::sequence::Sequence;

/// Parse an ethernet frame into a manifest plus its directed flow key.
pub fn parse_packet(raw: &[u8], timestamp: DateTime<Utc>) -> Result<(PacketManifest, TcpIpFlow)> {
    let sliced =
        SlicedPacket::from_ethernet(raw).map_err(|e| InquestError::Parse(e.to_string()))?;
    parse_sliced(sliced, timestamp)
}

/// Parse a raw IP packet (no ethernet header), e.g. from a RAW-linktype pcap.
pub fn parse_ip_packet(
    raw: &[u8],
    timestamp: DateTime<Utc>,
) -> Result<(PacketManifest, TcpIpFlow)> {
    let sliced = SlicedPacket::from_ip(raw).map_err(|e| InquestError::Parse(e.to_string()))?;
    parse_sliced(sliced, timestamp)
}

fn parse_sliced(
    sliced: SlicedPacket<'_>,
    timestamp: DateTime<Utc>,
) -> Result<(PacketManifest, TcpIpFlow)> {
    let (src_ip, dst_ip) = match &sliced.net {
        Some(NetSlice::Ipv4(ipv4)) => {
            let header = ipv4.header();
            (header.source_addr(), header.destination_addr())
        }
        _ => return Err(InquestError::NotIpv4),
    };

    let tcp = match &sliced.transport {
        Some(TransportSlice::Tcp(tcp)) => TcpInfo {
            src_port: tcp.source_port(),
            dst_port: tcp.destination_port(),
            seq: Sequence(tcp.sequence_number()),
            ack: Sequence(tcp.acknowledgment_number()),
            flags: TcpFlags {
                fin: tcp.fin(),
                syn: tcp.syn(),
                rst: tcp.rst(),
                psh: tcp.psh(),
                ack: tcp.ack(),
                urg: tcp.urg(),
                ece: tcp.ece(),
                cwr: tcp.cwr(),
            },
            window: tcp.window_size(),
            payload: tcp.payload().to_vec(),
        },
        _ => return Err(InquestError::NotTcp),
    };

    let manifest = PacketManifest {
        timestamp,
        src_ip,
        dst_ip,
        tcp,
    };
    let flow = manifest.flow();
    Ok((manifest, flow))
}
