//! Parsed packet representation handed to the state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

use super::flow::TcpIpFlow;
use super::sequence::Sequence;

/// TCP flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TcpFlags {
    pub fin: bool,
    pub syn: bool,
    pub rst: bool,
    pub psh: bool,
    pub ack: bool,
    pub urg: bool,
    pub ece: bool,
    pub cwr: bool,
}

impl TcpFlags {
    pub fn from_u8(flags: u8) -> Self {
        Self {
            fin: flags & 0x01 != 0,
            syn: flags & 0x02 != 0,
            rst: flags & 0x04 != 0,
            psh: flags & 0x08 != 0,
            ack: flags & 0x10 != 0,
            urg: flags & 0x20 != 0,
            ece: flags & 0x40 != 0,
            cwr: flags & 0x80 != 0,
        }
    }

    /// Bare SYN, the only packet allowed to open a connection
    pub fn is_syn(&self) -> bool {
        self.syn && !self.ack
    }

    pub fn is_syn_ack(&self) -> bool {
        self.syn && self.ack
    }
}

impl fmt::Display for TcpFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = String::new();
        if self.syn {
            s.push('S');
        }
        if self.ack {
            s.push('A');
        }
        if self.fin {
            s.push('F');
        }
        if self.rst {
            s.push('R');
        }
        if self.psh {
            s.push('P');
        }
        if self.urg {
            s.push('U');
        }
        if s.is_empty() {
            s.push('.');
        }
        write!(f, "{}", s)
    }
}

/// TCP header fields and payload as observed on the wire
#[derive(Debug, Clone, Default)]
pub struct TcpInfo {
    pub src_port: u16,
    pub dst_port: u16,
    pub seq: Sequence,
    pub ack: Sequence,
    pub flags: TcpFlags,
    pub window: u16,
    pub payload: Vec<u8>,
}

/// The parsed (ip, tcp, payload) triple the state machine consumes.
#[derive(Debug, Clone)]
pub struct PacketManifest {
    /// Capture timestamp
    pub timestamp: DateTime<Utc>,
    pub src_ip: Ipv4Addr,
    pub dst_ip: Ipv4Addr,
    pub tcp: TcpInfo,
}

impl PacketManifest {
    /// Directed flow key of this packet
    pub fn flow(&self) -> TcpIpFlow {
        TcpIpFlow::new(self.src_ip, self.tcp.src_port, self.dst_ip, self.tcp.dst_port)
    }

    pub fn payload_len(&self) -> usize {
        self.tcp.payload.len()
    }
}
