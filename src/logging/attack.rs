//! Attack report sinks.
//!
//! The state machine reports findings through the [`AttackLogger`] trait;
//! sinks must not block the packet path, so write failures are logged and
//! swallowed rather than propagated.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Serialize, Serializer};
use tracing::error;

use crate::config::LoggingConfig;
use crate::core::flow::TcpIpFlow;
use crate::core::sequence::Sequence;

use super::packets::{ConnectionPacketLogger, PcapPacketLogger};

/// Kind of attack observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttackKind {
    HandshakeHijack,
    SegmentVeto,
}

fn hex_bytes<S: Serializer>(bytes: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
    match bytes {
        Some(b) => {
            let mut s = String::with_capacity(b.len() * 2);
            for byte in b {
                s.push_str(&format!("{:02x}", byte));
            }
            serializer.serialize_str(&s)
        }
        None => serializer.serialize_none(),
    }
}

/// A single finding, serialized as one JSON object per line.
#[derive(Debug, Clone, Serialize)]
pub struct AttackReport {
    pub kind: AttackKind,
    pub timestamp: DateTime<Utc>,
    pub flow: TcpIpFlow,
    /// Full payload of the offending packet
    #[serde(serialize_with = "hex_bytes", skip_serializing_if = "Option::is_none")]
    pub payload: Option<Vec<u8>>,
    /// Bytes previously observed for the overlapping sub-range
    #[serde(serialize_with = "hex_bytes", skip_serializing_if = "Option::is_none")]
    pub overlap: Option<Vec<u8>>,
    /// Sequence range of the offending segment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<u32>,
    /// Slice offsets into `payload` selecting the overlapping sub-range
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_start: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_end: Option<usize>,
}

impl AttackReport {
    fn hijack(timestamp: DateTime<Utc>, flow: TcpIpFlow) -> Self {
        Self {
            kind: AttackKind::HandshakeHijack,
            timestamp,
            flow,
            payload: None,
            overlap: None,
            start: None,
            end: None,
            payload_start: None,
            payload_end: None,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn injection(
        timestamp: DateTime<Utc>,
        flow: TcpIpFlow,
        payload: &[u8],
        overlap: &[u8],
        start: Sequence,
        end: Sequence,
        payload_start: usize,
        payload_end: usize,
    ) -> Self {
        Self {
            kind: AttackKind::SegmentVeto,
            timestamp,
            flow,
            payload: Some(payload.to_vec()),
            overlap: Some(overlap.to_vec()),
            start: Some(start.0),
            end: Some(end.0),
            payload_start: Some(payload_start),
            payload_end: Some(payload_end),
        }
    }
}

/// Sink for attack findings. One instance per connection.
pub trait AttackLogger: Send {
    fn report_hijack(&mut self, timestamp: DateTime<Utc>, flow: TcpIpFlow);

    #[allow(clippy::too_many_arguments)]
    fn report_injection(
        &mut self,
        timestamp: DateTime<Utc>,
        flow: TcpIpFlow,
        payload: &[u8],
        overlap: &[u8],
        start: Sequence,
        end: Sequence,
        payload_start: usize,
        payload_end: usize,
    );

    fn close(&mut self);
}

/// Mints per-connection log sinks.
pub trait SinkFactory: Send {
    fn attack_logger(&self, flow: &TcpIpFlow) -> Box<dyn AttackLogger>;
    fn packet_logger(&self, flow: &TcpIpFlow) -> Option<Box<dyn ConnectionPacketLogger>>;
}

type SharedWriter = Arc<Mutex<BufWriter<File>>>;

/// Writes one JSON report per line to a writer shared by all connections.
pub struct JsonAttackLogger {
    writer: SharedWriter,
}

impl JsonAttackLogger {
    fn write(&mut self, report: &AttackReport) {
        let mut writer = self.writer.lock();
        if let Err(e) = serde_json::to_writer(&mut *writer, report)
            .map_err(std::io::Error::from)
            .and_then(|_| writer.write_all(b"\n"))
        {
            error!("failed to write attack report: {}", e);
        }
    }
}

impl AttackLogger for JsonAttackLogger {
    fn report_hijack(&mut self, timestamp: DateTime<Utc>, flow: TcpIpFlow) {
        self.write(&AttackReport::hijack(timestamp, flow));
    }

    fn report_injection(
        &mut self,
        timestamp: DateTime<Utc>,
        flow: TcpIpFlow,
        payload: &[u8],
        overlap: &[u8],
        start: Sequence,
        end: Sequence,
        payload_start: usize,
        payload_end: usize,
    ) {
        self.write(&AttackReport::injection(
            timestamp,
            flow,
            payload,
            overlap,
            start,
            end,
            payload_start,
            payload_end,
        ));
    }

    fn close(&mut self) {
        if let Err(e) = self.writer.lock().flush() {
            error!("failed to flush attack log: {}", e);
        }
    }
}

/// Factory producing [`JsonAttackLogger`]s over one shared attack log file
/// and, when configured, per-connection pcap archives.
pub struct JsonSinkFactory {
    writer: SharedWriter,
    packet_log_dir: Option<std::path::PathBuf>,
}

impl JsonSinkFactory {
    pub fn open(config: &LoggingConfig) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.attack_log)?;
        if let Some(dir) = &config.packet_log_dir {
            std::fs::create_dir_all(dir)?;
        }
        Ok(Self {
            writer: Arc::new(Mutex::new(BufWriter::new(file))),
            packet_log_dir: config.packet_log_dir.clone(),
        })
    }
}

impl SinkFactory for JsonSinkFactory {
    fn attack_logger(&self, _flow: &TcpIpFlow) -> Box<dyn AttackLogger> {
        Box::new(JsonAttackLogger {
            writer: self.writer.clone(),
        })
    }

    fn packet_logger(&self, flow: &TcpIpFlow) -> Option<Box<dyn ConnectionPacketLogger>> {
        let dir: &Path = self.packet_log_dir.as_deref()?;
        match PcapPacketLogger::create(dir, flow) {
            Ok(logger) => Some(Box::new(logger)),
            Err(e) => {
                error!(%flow, "failed to open packet log: {}", e);
                None
            }
        }
    }
}

/// Shared collection of reports, for inspection in tests and tooling.
#[derive(Clone, Default)]
pub struct ReportStore(Arc<Mutex<Vec<AttackReport>>>);

impl ReportStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<AttackReport> {
        self.0.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }
}

/// In-memory sink backed by a [`ReportStore`].
pub struct MemoryAttackLogger {
    store: ReportStore,
}

impl AttackLogger for MemoryAttackLogger {
    fn report_hijack(&mut self, timestamp: DateTime<Utc>, flow: TcpIpFlow) {
        self.store.0.lock().push(AttackReport::hijack(timestamp, flow));
    }

    fn report_injection(
        &mut self,
        timestamp: DateTime<Utc>,
        flow: TcpIpFlow,
        payload: &[u8],
        overlap: &[u8],
        start: Sequence,
        end: Sequence,
        payload_start: usize,
        payload_end: usize,
    ) {
        self.store.0.lock().push(AttackReport::injection(
            timestamp,
            flow,
            payload,
            overlap,
            start,
            end,
            payload_start,
            payload_end,
        ));
    }

    fn close(&mut self) {}
}

/// Factory handing every connection a logger over the same report store.
#[derive(Clone, Default)]
pub struct MemorySinkFactory {
    pub store: ReportStore,
}

impl SinkFactory for MemorySinkFactory {
    fn attack_logger(&self, _flow: &TcpIpFlow) -> Box<dyn AttackLogger> {
        Box::new(MemoryAttackLogger {
            store: self.store.clone(),
        })
    }

    fn packet_logger(&self, _flow: &TcpIpFlow) -> Option<Box<dyn ConnectionPacketLogger>> {
        None
    }
}
