//! volumectl — send one command to a running volumed and print the reply.
//!
//! ```text
//! volumectl set FL 40
//! volumectl --addr 192.168.1.40:5555 status
//! ```
//!
//! Exits non-zero when the daemon answers with an `ERROR` reply.

use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpStream};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "volumectl", version)]
struct Args {
    /// volumed TCP address
    #[arg(long, default_value = "127.0.0.1:5555")]
    addr: SocketAddr,

    /// Socket timeout in seconds
    #[arg(long, default_value_t = 5)]
    timeout_secs: u64,

    /// Command to send, e.g. `set FL 40` or `status`
    #[arg(required = true, trailing_var_arg = true)]
    command: Vec<String>,
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();
    let timeout = Duration::from_secs(args.timeout_secs);

    let stream = TcpStream::connect_timeout(&args.addr, timeout)
        .with_context(|| format!("connect {}", args.addr))?;
    stream
        .set_read_timeout(Some(timeout))
        .context("set read timeout")?;
    stream
        .set_write_timeout(Some(timeout))
        .context("set write timeout")?;

    let mut writer = stream.try_clone().context("clone stream")?;
    let mut reader = BufReader::new(stream);

    let line = args.command.join(" ");
    writer
        .write_all(format!("{line}\n").as_bytes())
        .context("send command")?;

    let mut reply = String::new();
    reader.read_line(&mut reply).context("read reply")?;
    let reply = reply.trim_end();
    println!("{reply}");

    // polite disconnect; best-effort
    let _ = writer.write_all(format!("{}\n", amp_volume_proto::DISCONNECT_TOKEN).as_bytes());
    let mut cya = String::new();
    let _ = reader.read_line(&mut cya);

    if reply.starts_with(amp_volume_proto::ERROR_PREFIX.trim_end()) {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
