use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Segments kept per direction in a connection's evidence ring.
pub const MAX_CONN_PACKETS: usize = 40;

/// Packets after entering data transfer during which the hijack
/// detector is still consulted.
pub const FIRST_FEW_PACKETS: u64 = 12;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub capture: CaptureConfig,

    #[serde(default)]
    pub detection: DetectionConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;

        Ok(config)
    }
}

/// Capture configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Interface name for live capture
    pub interface: Option<String>,
    /// PCAP file to replay instead of capturing live
    pub pcap_file: Option<PathBuf>,
    /// Snapshot length
    pub snaplen: u32,
    /// Enable promiscuous mode
    pub promiscuous: bool,
    /// BPF filter applied to the capture
    pub filter: String,
    /// Read timeout in milliseconds (live capture)
    pub timeout_ms: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            interface: None,
            pcap_file: None,
            snaplen: 65535,
            promiscuous: true,
            filter: "tcp".to_string(),
            timeout_ms: 100,
        }
    }
}

/// Detection tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Evidence ring capacity per direction
    pub max_conn_packets: usize,
    /// Post-handshake window during which the hijack detector runs
    pub first_few_packets: u64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            max_conn_packets: MAX_CONN_PACKETS,
            first_few_packets: FIRST_FEW_PACKETS,
        }
    }
}

/// Log sink configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Attack report file (one JSON object per line)
    pub attack_log: PathBuf,
    /// Directory for per-connection raw packet archives; disabled when unset
    pub packet_log_dir: Option<PathBuf>,
    /// Log a progress line every N packets (0 disables)
    pub progress_interval: u64,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            attack_log: PathBuf::from("attacks.json"),
            packet_log_dir: None,
            progress_interval: 10_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::default();
        assert_eq!(config.detection.max_conn_packets, 40);
        assert_eq!(config.detection.first_few_packets, 12);
        assert_eq!(config.capture.filter, "tcp");
        assert!(config.logging.packet_log_dir.is_none());
    }

    #[test]
    fn test_config_parse_partial() {
        let config: Config = toml::from_str(
            r#"
            [detection]
            max_conn_packets = 8
            first_few_packets = 4

            [capture]
            filter = "tcp port 80"
            snaplen = 1500
            promiscuous = false
            timeout_ms = 10
            "#,
        )
        .unwrap();

        assert_eq!(config.detection.max_conn_packets, 8);
        assert_eq!(config.capture.filter, "tcp port 80");
        // untouched section keeps its defaults
        assert_eq!(config.logging.progress_interval, 10_000);
    }
}
