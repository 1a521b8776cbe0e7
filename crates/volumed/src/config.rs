//! Configuration loading and resolution.
//!
//! Each value resolves CLI flag → config file → built-in default.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::cli::Args;

const DEFAULT_TCP_BIND: &str = "0.0.0.0:5555";
const DEFAULT_UDP_BIND: &str = "0.0.0.0:5555";
const DEFAULT_CLIENT_TIMEOUT_SECS: u64 = 300;
/// The MCP42XXX datasheet caps daisy-chained operation at 5.8 MHz; the
/// default stays far below that so long unshielded leads remain reliable.
const DEFAULT_SPI_CLOCK_HZ: u32 = 40_000;
const DEFAULT_CS_PIN: u8 = 8;
const DEFAULT_SHDN_PIN: u8 = 24;
const DEFAULT_RS_PIN: u8 = 23;

/// Raw TOML schema; every field optional.
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    /// TCP bind address (host:port).
    pub tcp_bind: Option<String>,
    /// UDP bind address (host:port).
    pub udp_bind: Option<String>,
    /// Idle TCP client timeout in seconds.
    pub client_timeout_secs: Option<u64>,
    /// SPI clock in Hz.
    pub spi_clock_hz: Option<u32>,
    /// BCM pin of the manual chip-select line.
    pub cs_pin: Option<u8>,
    /// BCM pin of the shared active-low shutdown line.
    pub shdn_pin: Option<u8>,
    /// BCM pin of the shared active-low reset line.
    pub rs_pin: Option<u8>,
}

impl FileConfig {
    /// Load configuration from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        toml::from_str(&raw).with_context(|| format!("parse config {:?}", path))
    }
}

/// Fully resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub tcp_bind: SocketAddr,
    pub udp_bind: SocketAddr,
    pub client_timeout: Duration,
    pub spi_clock_hz: u32,
    pub cs_pin: u8,
    pub shdn_pin: u8,
    pub rs_pin: u8,
}

/// Resolve the effective configuration for this invocation.
pub fn resolve(args: &Args) -> Result<Resolved> {
    let file = match args.config.as_deref() {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    resolve_with(args, file)
}

fn resolve_with(args: &Args, file: FileConfig) -> Result<Resolved> {
    let tcp_bind = match args.tcp_bind {
        Some(addr) => addr,
        None => parse_bind(file.tcp_bind.as_deref().unwrap_or(DEFAULT_TCP_BIND))?,
    };
    let udp_bind = match args.udp_bind {
        Some(addr) => addr,
        None => parse_bind(file.udp_bind.as_deref().unwrap_or(DEFAULT_UDP_BIND))?,
    };

    let client_timeout_secs = args
        .client_timeout_secs
        .or(file.client_timeout_secs)
        .unwrap_or(DEFAULT_CLIENT_TIMEOUT_SECS);
    if client_timeout_secs == 0 {
        anyhow::bail!("client_timeout_secs must be non-zero");
    }

    let spi_clock_hz = args
        .spi_clock_hz
        .or(file.spi_clock_hz)
        .unwrap_or(DEFAULT_SPI_CLOCK_HZ);
    if spi_clock_hz == 0 {
        anyhow::bail!("spi_clock_hz must be non-zero");
    }

    Ok(Resolved {
        tcp_bind,
        udp_bind,
        client_timeout: Duration::from_secs(client_timeout_secs),
        spi_clock_hz,
        cs_pin: file.cs_pin.unwrap_or(DEFAULT_CS_PIN),
        shdn_pin: file.shdn_pin.unwrap_or(DEFAULT_SHDN_PIN),
        rs_pin: file.rs_pin.unwrap_or(DEFAULT_RS_PIN),
    })
}

fn parse_bind(raw: &str) -> Result<SocketAddr> {
    raw.parse().with_context(|| format!("parse bind address {raw}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_with_no_file_and_no_flags() {
        let resolved = resolve_with(&Args::default(), FileConfig::default()).unwrap();
        assert_eq!(resolved.tcp_bind, "0.0.0.0:5555".parse().unwrap());
        assert_eq!(resolved.udp_bind, "0.0.0.0:5555".parse().unwrap());
        assert_eq!(resolved.client_timeout, Duration::from_secs(300));
        assert_eq!(resolved.spi_clock_hz, 40_000);
    }

    #[test]
    fn file_values_parse_from_toml() {
        let file: FileConfig = toml::from_str(
            r#"
            tcp_bind = "127.0.0.1:7000"
            client_timeout_secs = 60
            spi_clock_hz = 1000000
            cs_pin = 12
            "#,
        )
        .unwrap();
        let resolved = resolve_with(&Args::default(), file).unwrap();
        assert_eq!(resolved.tcp_bind, "127.0.0.1:7000".parse().unwrap());
        assert_eq!(resolved.client_timeout, Duration::from_secs(60));
        assert_eq!(resolved.spi_clock_hz, 1_000_000);
        assert_eq!(resolved.cs_pin, 12);
        // untouched values keep their defaults
        assert_eq!(resolved.udp_bind, "0.0.0.0:5555".parse().unwrap());
    }

    #[test]
    fn flags_override_the_file() {
        let file: FileConfig = toml::from_str(r#"tcp_bind = "127.0.0.1:7000""#).unwrap();
        let args = Args {
            tcp_bind: Some("127.0.0.1:9000".parse().unwrap()),
            ..Args::default()
        };
        let resolved = resolve_with(&args, file).unwrap();
        assert_eq!(resolved.tcp_bind, "127.0.0.1:9000".parse().unwrap());
    }

    #[test]
    fn rejects_unparseable_bind() {
        let file: FileConfig = toml::from_str(r#"tcp_bind = "not-an-addr""#).unwrap();
        assert!(resolve_with(&Args::default(), file).is_err());
    }

    #[test]
    fn rejects_zero_clock() {
        let args = Args {
            spi_clock_hz: Some(0),
            ..Args::default()
        };
        assert!(resolve_with(&args, FileConfig::default()).is_err());
    }
}
