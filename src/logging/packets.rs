//! Per-connection raw packet archives.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::error;

use crate::core::flow::TcpIpFlow;
use crate::error::Result;

/// Optional sink archiving every raw packet of a connection for post-hoc
/// analysis. One instance per connection.
pub trait ConnectionPacketLogger: Send {
    fn write_packet(&mut self, raw: &[u8], flow: TcpIpFlow);
    fn close(&mut self);
}

/// Writes the connection's packets into a dedicated pcap file.
pub struct PcapPacketLogger {
    savefile: Option<pcap::Savefile>,
    path: PathBuf,
}

impl PcapPacketLogger {
    pub fn create(dir: &Path, flow: &TcpIpFlow) -> Result<Self> {
        let name = format!(
            "{}.{}-{}.{}.pcap",
            flow.src_ip, flow.src_port, flow.dst_ip, flow.dst_port
        );
        let path = dir.join(name);
        let capture = pcap::Capture::dead(pcap::Linktype::ETHERNET)?;
        let savefile = capture.savefile(&path)?;
        Ok(Self {
            savefile: Some(savefile),
            path,
        })
    }
}

impl ConnectionPacketLogger for PcapPacketLogger {
    fn write_packet(&mut self, raw: &[u8], _flow: TcpIpFlow) {
        let Some(savefile) = self.savefile.as_mut() else {
            return;
        };
        let now = Utc::now();
        let header = pcap::PacketHeader {
            ts: libc::timeval {
                tv_sec: now.timestamp() as libc::time_t,
                tv_usec: now.timestamp_subsec_micros() as libc::suseconds_t,
            },
            caplen: raw.len() as u32,
            len: raw.len() as u32,
        };
        savefile.write(&pcap::Packet::new(&header, raw));
    }

    fn close(&mut self) {
        if let Some(mut savefile) = self.savefile.take() {
            if let Err(e) = savefile.flush() {
                error!("failed to flush packet log {}: {}", self.path.display(), e);
            }
        }
    }
}
