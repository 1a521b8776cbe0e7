//! Minimal readiness multiplexing over `libc::poll`.
//!
//! One `wait` call per event-loop iteration covers a transport's sockets:
//! `None` blocks until something is ready, `Some(Duration::ZERO)` is a pure
//! poll, anything in between lets the loop be driven cooperatively.

use std::io;
use std::os::fd::RawFd;
use std::time::Duration;

/// One monitored descriptor and its reported readiness.
pub struct PollEntry {
    pub fd: RawFd,
    events: i16,
    revents: i16,
}

impl PollEntry {
    /// Monitor `fd` for input readiness (hangup/error always report).
    pub fn input(fd: RawFd) -> Self {
        Self {
            fd,
            events: libc::POLLIN,
            revents: 0,
        }
    }

    pub fn readable(&self) -> bool {
        self.revents & libc::POLLIN != 0
    }

    pub fn failed(&self) -> bool {
        self.revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0
    }
}

/// Wait until any entry is ready or the timeout elapses; returns the number
/// of ready entries. A signal interruption reports as an empty wakeup.
pub fn wait(entries: &mut [PollEntry], timeout: Option<Duration>) -> io::Result<usize> {
    let mut fds: Vec<libc::pollfd> = entries
        .iter()
        .map(|entry| libc::pollfd {
            fd: entry.fd,
            events: entry.events,
            revents: 0,
        })
        .collect();

    let timeout_ms: libc::c_int = match timeout {
        None => -1,
        Some(t) => t.as_millis().min(libc::c_int::MAX as u128) as libc::c_int,
    };

    let ready = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout_ms) };
    if ready < 0 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            for entry in entries.iter_mut() {
                entry.revents = 0;
            }
            return Ok(0);
        }
        return Err(err);
    }

    for (entry, fd) in entries.iter_mut().zip(&fds) {
        entry.revents = fd.revents;
    }
    Ok(ready as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::{TcpListener, TcpStream};
    use std::os::fd::AsRawFd;

    #[test]
    fn times_out_with_nothing_ready() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut entries = [PollEntry::input(listener.as_raw_fd())];
        let ready = wait(&mut entries, Some(Duration::from_millis(10))).unwrap();
        assert_eq!(ready, 0);
        assert!(!entries[0].readable());
    }

    #[test]
    fn reports_pending_input() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let mut client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();

        client.write_all(b"ping").unwrap();

        let mut entries = [PollEntry::input(server.as_raw_fd())];
        let ready = wait(&mut entries, Some(Duration::from_millis(500))).unwrap();
        assert_eq!(ready, 1);
        assert!(entries[0].readable());
    }
}
