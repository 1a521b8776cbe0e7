//! TCP and UDP command transports.
//!
//! Both transports share one [`CommandEngine`] and are driven cooperatively
//! from a single thread: each `step` makes one readiness-multiplexing call
//! bounded by the supplied timeout and drains whatever became ready. TCP
//! clients are persistent line-oriented connections with a per-client idle
//! timeout; UDP is stateless, one command per datagram.
//!
//! Failure scoping: an I/O error on one client closes that client only; an
//! error on a listening socket is fatal and unwinds the event loop.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, UdpSocket};
use std::os::fd::AsRawFd;
use std::time::{Duration, Instant};

use amp_volume_proto as proto;
use amp_volume_proto::Command;
use anyhow::{Context, Result};

use crate::interp::CommandEngine;
use crate::poll::{self, PollEntry};
use crate::volume::VolumeError;

/// Lifecycle of one transport: bind, pump, tear down.
pub trait Transport {
    fn init(&mut self) -> Result<()>;
    /// Run one event-loop iteration, waiting at most `timeout` for
    /// readiness.
    fn step(&mut self, engine: &mut dyn CommandEngine, timeout: Option<Duration>) -> Result<()>;
    fn deinit(&mut self);
}

struct Client {
    stream: TcpStream,
    addr: SocketAddr,
    buf: Vec<u8>,
    last_activity: Instant,
}

impl Client {
    /// Drain readable bytes and process every complete line. Returns
    /// `false` once the connection should be dropped.
    fn read_ready(&mut self, engine: &mut dyn CommandEngine) -> io::Result<bool> {
        let mut chunk = [0u8; 512];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => return Ok(false),
                Ok(n) => self.buf.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim();
            tracing::debug!(addr = %self.addr, line, "command received");

            if line.is_empty() {
                // empty line: close without a reply
                return Ok(false);
            }
            if line.starts_with(proto::DISCONNECT_TOKEN) {
                write_line(&mut self.stream, format!("{}\n", proto::DISCONNECT_REPLY).as_bytes())?;
                return Ok(false);
            }

            let reply = match Command::parse(line) {
                Ok(cmd) => match engine.execute(cmd) {
                    Ok(status) => proto::format_ok(&status),
                    Err(VolumeError::Cmd(e)) => proto::format_error(&e),
                    Err(VolumeError::Bus(e)) => {
                        tracing::error!("potentiometer bus failure: {e}");
                        format!("{}device failure\n", proto::ERROR_PREFIX)
                    }
                },
                Err(e) => proto::format_error(&e),
            };
            write_line(&mut self.stream, reply.as_bytes())?;
        }
        Ok(true)
    }
}

/// Persistent line-oriented TCP transport.
pub struct TcpTransport {
    bind: SocketAddr,
    client_timeout: Duration,
    listener: Option<TcpListener>,
    clients: Vec<Client>,
}

impl TcpTransport {
    pub fn new(bind: SocketAddr, client_timeout: Duration) -> Self {
        Self {
            bind,
            client_timeout,
            listener: None,
            clients: Vec::new(),
        }
    }

    /// Bound address once initialized (useful with a port of 0).
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }
}

impl Transport for TcpTransport {
    fn init(&mut self) -> Result<()> {
        let listener =
            TcpListener::bind(self.bind).with_context(|| format!("bind tcp {}", self.bind))?;
        listener
            .set_nonblocking(true)
            .context("set tcp listener nonblocking")?;
        self.listener = Some(listener);
        tracing::info!(bind = %self.local_addr().unwrap_or(self.bind), "tcp listening");
        Ok(())
    }

    fn step(&mut self, engine: &mut dyn CommandEngine, timeout: Option<Duration>) -> Result<()> {
        let Some(listener) = self.listener.as_ref() else {
            anyhow::bail!("tcp transport not initialized");
        };

        let mut entries = Vec::with_capacity(1 + self.clients.len());
        entries.push(PollEntry::input(listener.as_raw_fd()));
        for client in &self.clients {
            entries.push(PollEntry::input(client.stream.as_raw_fd()));
        }
        poll::wait(&mut entries, timeout).context("poll tcp sockets")?;

        if entries[0].failed() {
            anyhow::bail!("tcp listening socket failed");
        }
        if entries[0].readable() {
            let mut accepted = Vec::new();
            loop {
                match listener.accept() {
                    Ok((stream, addr)) => {
                        if let Err(e) = stream.set_nonblocking(true) {
                            tracing::warn!(%addr, "client setup failed: {e}");
                            continue;
                        }
                        tracing::info!(%addr, "client connected");
                        accepted.push(Client {
                            stream,
                            addr,
                            buf: Vec::new(),
                            last_activity: Instant::now(),
                        });
                    }
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                    // the connection died between SYN and accept; client-local
                    Err(e) if e.kind() == io::ErrorKind::ConnectionAborted => {
                        tracing::warn!("client aborted before accept: {e}");
                    }
                    Err(e) => return Err(e).context("accept tcp client"),
                }
            }
            self.clients.extend(accepted);
        }

        let now = Instant::now();
        let mut closed = Vec::new();
        for (entry_index, entry) in entries.iter().enumerate().skip(1) {
            let index = entry_index - 1;
            let client = &mut self.clients[index];
            if entry.failed() {
                tracing::info!(addr = %client.addr, "client hangup");
                closed.push(index);
                continue;
            }
            if !entry.readable() {
                continue;
            }
            client.last_activity = now;
            match client.read_ready(engine) {
                Ok(true) => {}
                Ok(false) => {
                    tracing::info!(addr = %client.addr, "client disconnected");
                    closed.push(index);
                }
                Err(e) => {
                    tracing::warn!(addr = %client.addr, "client i/o error: {e}");
                    closed.push(index);
                }
            }
        }
        for index in closed.into_iter().rev() {
            let client = self.clients.remove(index);
            let _ = client.stream.shutdown(Shutdown::Both);
        }

        let idle_limit = self.client_timeout;
        self.clients.retain(|client| {
            if now.duration_since(client.last_activity) > idle_limit {
                tracing::info!(addr = %client.addr, "client timed out");
                let _ = client.stream.shutdown(Shutdown::Both);
                false
            } else {
                true
            }
        });

        Ok(())
    }

    fn deinit(&mut self) {
        for client in self.clients.drain(..) {
            let _ = client.stream.shutdown(Shutdown::Both);
        }
        self.listener = None;
    }
}

/// Stateless datagram transport.
///
/// Replies go back to the datagram's source, and only on failure or for an
/// explicit `status` command — successful mutations are silent, so UDP
/// clients poll `status` to observe state.
pub struct UdpTransport {
    bind: SocketAddr,
    socket: Option<UdpSocket>,
}

impl UdpTransport {
    pub fn new(bind: SocketAddr) -> Self {
        Self { bind, socket: None }
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }
}

impl Transport for UdpTransport {
    fn init(&mut self) -> Result<()> {
        let socket =
            UdpSocket::bind(self.bind).with_context(|| format!("bind udp {}", self.bind))?;
        socket
            .set_nonblocking(true)
            .context("set udp socket nonblocking")?;
        self.socket = Some(socket);
        tracing::info!(bind = %self.local_addr().unwrap_or(self.bind), "udp listening");
        Ok(())
    }

    fn step(&mut self, engine: &mut dyn CommandEngine, timeout: Option<Duration>) -> Result<()> {
        let Some(socket) = self.socket.as_ref() else {
            anyhow::bail!("udp transport not initialized");
        };

        let mut entries = [PollEntry::input(socket.as_raw_fd())];
        poll::wait(&mut entries, timeout).context("poll udp socket")?;
        if entries[0].failed() {
            anyhow::bail!("udp socket failed");
        }
        if !entries[0].readable() {
            return Ok(());
        }

        let mut buf = [0u8; 1024];
        loop {
            match socket.recv_from(&mut buf) {
                Ok((len, src)) => {
                    let payload = String::from_utf8_lossy(&buf[..len]);
                    tracing::debug!(%src, payload = %payload.trim(), "datagram received");
                    if let Some(reply) = handle_datagram(payload.trim(), engine) {
                        if let Err(e) = socket.send_to(reply.as_bytes(), src) {
                            tracing::warn!(%src, "udp reply failed: {e}");
                        }
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                // ICMP errors from earlier replies surface here; they are
                // client-local, not a socket failure
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::ConnectionRefused | io::ErrorKind::ConnectionReset
                    ) =>
                {
                    continue;
                }
                Err(e) => return Err(e).context("udp recv"),
            }
        }
        Ok(())
    }

    fn deinit(&mut self) {
        self.socket = None;
    }
}

fn handle_datagram(line: &str, engine: &mut dyn CommandEngine) -> Option<String> {
    if line.is_empty() {
        return None;
    }
    match Command::parse(line) {
        Ok(cmd) => {
            let wants_reply = matches!(cmd, Command::Status);
            match engine.execute(cmd) {
                Ok(status) if wants_reply => Some(proto::format_ok(&status)),
                Ok(_) => None,
                Err(VolumeError::Cmd(e)) => Some(proto::format_error(&e)),
                Err(VolumeError::Bus(e)) => {
                    tracing::error!("potentiometer bus failure: {e}");
                    Some(format!("{}device failure\n", proto::ERROR_PREFIX))
                }
            }
        }
        Err(e) => Some(proto::format_error(&e)),
    }
}

/// Write the whole reply, absorbing short writes on the nonblocking socket.
fn write_line(stream: &mut TcpStream, bytes: &[u8]) -> io::Result<()> {
    let mut off = 0;
    while off < bytes.len() {
        match stream.write(&bytes[off..]) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "socket closed while writing",
                ));
            }
            Ok(n) => off += n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(2));
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
