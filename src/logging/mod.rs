//! Attack report and raw packet log sinks.

pub mod attack;
pub mod packets;

pub use attack::{
    AttackKind, AttackLogger, AttackReport, JsonSinkFactory, MemorySinkFactory, ReportStore,
    SinkFactory,
};
pub use packets::ConnectionPacketLogger;
