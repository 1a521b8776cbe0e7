use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug, Default)]
#[command(name = "volumed", version)]
pub struct Args {
    /// Path to a TOML config file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// TCP bind address, e.g. 0.0.0.0:5555 (overrides the config file)
    #[arg(long)]
    pub tcp_bind: Option<SocketAddr>,

    /// UDP bind address (overrides the config file)
    #[arg(long)]
    pub udp_bind: Option<SocketAddr>,

    /// Disconnect TCP clients idle for this many seconds
    #[arg(long)]
    pub client_timeout_secs: Option<u64>,

    /// SPI bus clock in Hz (stay under 5.8 MHz when daisy-chaining)
    #[arg(long)]
    pub spi_clock_hz: Option<u32>,
}
