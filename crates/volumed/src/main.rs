//! volumed — network volume control for an MCP42XXX-based analog stage.
//!
//! Six analog channels (three stereo pairs) sit behind a daisy chain of
//! three MCP42XXX dual digital potentiometers. Clients adjust levels over a
//! line-oriented TCP protocol or fire-and-forget UDP datagrams; every state
//! change is re-serialized onto the SPI chain before the reply goes out.
//!
//! ## Structure
//! - `levels`: the logarithmic level→wiper mapping, built once at startup.
//! - `volume`: the controller state machine; sole owner of the bus.
//! - `interp`: parsed command → controller mutation → status report.
//! - `server`: poll-driven TCP/UDP transports, one thread for everything.

mod cli;
mod config;
mod interp;
mod levels;
mod poll;
mod server;
#[cfg(test)]
mod testbus;
mod volume;

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use crossbeam_channel::Receiver;
use tracing_subscriber::EnvFilter;

use crate::interp::CommandEngine;
use crate::server::{TcpTransport, Transport, UdpTransport};

/// Readiness-wait bound per transport per iteration; keeps the loop
/// responsive to the shutdown signal and to the other transport.
const POLL_TIMEOUT: Duration = Duration::from_millis(50);

fn main() -> Result<()> {
    let args = cli::Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,volumed=info")),
        )
        .init();

    let cfg = config::resolve(&args)?;
    tracing::info!(
        tcp = %cfg.tcp_bind,
        udp = %cfg.udp_bind,
        spi_clock_hz = cfg.spi_clock_hz,
        "starting volumed"
    );

    let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(1);
    let _ = ctrlc::set_handler(move || {
        let _ = shutdown_tx.try_send(());
    });

    run(&cfg, &shutdown_rx)
}

#[cfg(feature = "hardware")]
fn run(cfg: &config::Resolved, shutdown_rx: &Receiver<()>) -> Result<()> {
    use anyhow::Context;

    let pins = mcp42xxx::PotPins {
        cs: cfg.cs_pin,
        shdn: cfg.shdn_pin,
        rs: cfg.rs_pin,
    };
    let bus = mcp42xxx::SpiPotBus::open(cfg.spi_clock_hz, pins).context("open potentiometer bus")?;
    let driver = mcp42xxx::Mcp42xxx::new(bus, volume::UNITS);
    let mut vc = volume::VolumeController::new(driver, levels::LevelMap::new());
    vc.reset().context("reset potentiometer chain")?;
    tracing::info!("potentiometer chain reset; levels zeroed");

    serve(cfg, &mut vc, shutdown_rx)
}

#[cfg(not(feature = "hardware"))]
fn run(_cfg: &config::Resolved, _shutdown_rx: &Receiver<()>) -> Result<()> {
    anyhow::bail!("built without the `hardware` feature; no potentiometer bus available")
}

fn serve(
    cfg: &config::Resolved,
    engine: &mut dyn CommandEngine,
    shutdown_rx: &Receiver<()>,
) -> Result<()> {
    let mut tcp = TcpTransport::new(cfg.tcp_bind, cfg.client_timeout);
    let mut udp = UdpTransport::new(cfg.udp_bind);
    tcp.init()?;
    udp.init()?;

    let mut transports: [&mut dyn Transport; 2] = [&mut tcp, &mut udp];
    let result = event_loop(&mut transports, engine, shutdown_rx);

    tcp.deinit();
    udp.deinit();
    result
}

fn event_loop(
    transports: &mut [&mut dyn Transport],
    engine: &mut dyn CommandEngine,
    shutdown_rx: &Receiver<()>,
) -> Result<()> {
    loop {
        if shutdown_rx.try_recv().is_ok() {
            tracing::info!("shutdown requested");
            return Ok(());
        }
        for transport in transports.iter_mut() {
            transport.step(engine, Some(POLL_TIMEOUT))?;
        }
    }
}
