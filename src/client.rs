//! Per-connection state held while a client is enrolled in the `Fifo`.

use std::io::{self, Write};
use std::net::SocketAddr;
use std::time::Instant;

use mio::net::TcpStream;
use socket2::SockRef;

/// A single tarpitted connection.
///
/// Owned exclusively by the `Fifo` while enrolled; mutated only by the event
/// loop. Destroyed (closed, logged) on a non-recoverable write error or on
/// shutdown.
pub(crate) struct Client {
    pub(crate) stream: TcpStream,
    pub(crate) peer: SocketAddr,
    pub(crate) connect_time: Instant,
    pub(crate) send_next: Instant,
    pub(crate) bytes_sent: u64,
}

impl Client {
    /// Wrap a freshly accepted, already non-blocking stream.
    ///
    /// Sets the smallest possible receive buffer: this both shrinks local
    /// memory use and advertises a tiny TCP window, slowing the peer further.
    /// Best-effort; the OS-imposed minimum applies and no particular
    /// resulting size is assumed.
    pub(crate) fn new(stream: TcpStream, peer: SocketAddr, now: Instant, send_next: Instant) -> Self {
        let sockref = SockRef::from(&stream);
        if let Err(err) = sockref.set_recv_buffer_size(1) {
            log::debug!("setsockopt(SO_RCVBUF, 1) = {}", err);
        }

        Self {
            stream,
            peer,
            connect_time: now,
            send_next,
            bytes_sent: 0,
        }
    }

    /// Attempt exactly one non-blocking write of `line`.
    ///
    /// `Ok(n)` for a successful (possibly partial, possibly zero-byte on
    /// `WouldBlock`) write that the client survives; `Err` for a
    /// non-recoverable error that should destroy the client. `EINTR` is
    /// retried in a tight loop rather than surrendering the turn.
    pub(crate) fn write_line(&mut self, line: &[u8]) -> io::Result<usize> {
        loop {
            match self.stream.write(line) {
                Ok(n) => return Ok(n),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(0),
                Err(err) => return Err(err),
            }
        }
    }

    pub(crate) fn elapsed_ms(&self, now: Instant) -> u128 {
        now.saturating_duration_since(self.connect_time).as_millis()
    }
}
