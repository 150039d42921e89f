use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use inquest::config::Config;
use inquest::conn::ConnTracker;
use inquest::engine::capture::{LiveSource, OfflineSource, PacketSource};
use inquest::engine::Sniffer;
use inquest::logging::attack::JsonSinkFactory;

#[derive(Parser)]
#[command(name = "inquest")]
#[command(author, version)]
#[command(about = "passive TCP stream monitor detecting handshake hijack and segment injection")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Read packets from a pcap file
    #[arg(short, long, value_name = "FILE")]
    read: Option<PathBuf>,

    /// Capture live from a network interface
    #[arg(short, long, value_name = "DEV")]
    interface: Option<String>,

    /// Directory for per-connection raw packet archives
    #[arg(long, value_name = "DIR")]
    packet_log_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(path) = cli.read {
        config.capture.pcap_file = Some(path);
    }
    if let Some(dev) = cli.interface {
        config.capture.interface = Some(dev);
    }
    if let Some(dir) = cli.packet_log_dir {
        config.logging.packet_log_dir = Some(dir);
    }

    let source: Box<dyn PacketSource> = if let Some(file) = &config.capture.pcap_file {
        println!("Reading from pcap file: {}", file.display());
        Box::new(
            OfflineSource::open(file, &config.capture.filter)
                .with_context(|| format!("Failed to open pcap file: {}", file.display()))?,
        )
    } else if let Some(dev) = &config.capture.interface {
        println!("Capturing on interface: {}", dev);
        Box::new(
            LiveSource::open(dev, &config.capture)
                .with_context(|| format!("Failed to open interface: {}", dev))?,
        )
    } else {
        bail!("no packet source: pass --read <pcap> or --interface <dev>");
    };

    let sinks = JsonSinkFactory::open(&config.logging).with_context(|| {
        format!(
            "Failed to open attack log: {}",
            config.logging.attack_log.display()
        )
    })?;
    let tracker = ConnTracker::new(config.detection.clone(), Box::new(sinks));
    let mut sniffer = Sniffer::new(source, tracker, config.logging.progress_interval);

    let stats = sniffer.run()?;
    let tracker_stats = sniffer.tracker().stats();

    println!();
    println!("{}", "=".repeat(60));
    println!("CAPTURE SUMMARY");
    println!("{}", "=".repeat(60));
    println!("Packets seen:        {}", stats.packets_seen);
    println!("Packets tracked:     {}", stats.packets_tracked);
    println!("Packets skipped:     {}", stats.packets_skipped);
    println!("Parse errors:        {}", stats.parse_errors);
    println!("Connections tracked: {}", tracker_stats.connections_created);
    println!("Connections closed:  {}", tracker_stats.connections_closed);
    println!("Attack log:          {}", config.logging.attack_log.display());

    Ok(())
}
