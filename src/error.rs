use thiserror::Error;

#[derive(Debug, Error)]
pub enum InquestError {
    #[error("packet parse error: {0}")]
    Parse(String),

    #[error("no IPv4 layer found in packet")]
    NotIpv4,

    #[error("no TCP layer found in packet")]
    NotTcp,

    #[error("capture error: {0}")]
    Capture(#[from] pcap::Error),

    #[error("interface not found: {0}")]
    NoSuchDevice(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, InquestError>;
