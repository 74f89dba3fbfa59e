//! The core event loop: a single thread, a single `mio::Poll`, no timers
//! per connection.
//!
//! Each iteration: service pending signals, drip due clients, compute how
//! long until the next one is due, block in `poll()` for at most that long,
//! then drain the listener. Client sockets are never registered with
//! `Poll` — writes to them are speculative and schedule-driven, not
//! readiness-driven, exactly as the original single-`poll(2)`-call design
//! intended.

use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{info, warn};
use mio::{Events, Interest, Poll, Token};

use crate::banner::{self, MAX_LINE_LENGTH};
use crate::client::Client;
use crate::config::Config;
use crate::errx;
use crate::fifo::Fifo;
use crate::listener;
use crate::rng::Rng;
use crate::signals::Signals;
use crate::stats::Statistics;

const LISTENER: Token = Token(0);

pub(crate) struct Tarpit {
    poll: Poll,
    events: Events,
    listener: mio::net::TcpListener,
    listener_registered: bool,
    fifo: Fifo,
    rng: Rng,
    stats: Arc<Statistics>,
    signals: Signals,
    config: Config,
    config_path: Option<String>,
}

impl Tarpit {
    pub(crate) fn new(config: Config, config_path: Option<String>, stats: Arc<Statistics>, seed: u64) -> Self {
        let poll = Poll::new().unwrap_or_else(|err| errx(exitcode::OSERR, format!("poll(), error: {}", err)));

        let mut listener = listener::create(config.port, config.bind_family);
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)
            .unwrap_or_else(|err| errx(exitcode::OSERR, format!("register(), error: {}", err)));

        let signals = Signals::install(&poll);

        Self {
            poll,
            events: Events::with_capacity(128),
            listener,
            listener_registered: true,
            fifo: Fifo::new(),
            rng: Rng::new(seed),
            stats,
            signals,
            config,
            config_path,
        }
    }

    /// Run until a shutdown signal arrives, then drain the `Fifo` and
    /// return.
    pub(crate) fn run(mut self) {
        info!(
            "listen port={} bind-family={} delay={}ms max-line-length={} max-clients={}",
            self.config.port,
            self.config.bind_family,
            self.config.delay_ms,
            self.config.max_line_length,
            self.config.max_clients,
        );

        loop {
            let (reload, dumpstats) = self.signals.drain();
            if !self.signals.running() {
                break;
            }
            if reload {
                self.reload();
            }
            if dumpstats {
                self.stats.log_totals(&self.fifo, Instant::now());
            }

            self.drip();

            // While at capacity the listener must not be polled at all:
            // pending connections stay in the kernel backlog, deferred
            // rather than accepted-and-closed.
            self.sync_listener_registration();

            let timeout = self
                .fifo
                .peek()
                .map(|client| client.send_next.saturating_duration_since(Instant::now()));

            if let Err(err) = self.poll.poll(&mut self.events, timeout) {
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                errx(exitcode::OSERR, format!("poll(), error: {}", err));
            }

            // Attempt unconditionally rather than gating on which token
            // fired: under edge-triggered readiness, a backlog entry that
            // arrived while the listener was last drained to `WouldBlock`
            // produces no further event. `accept()` itself still refuses to
            // call into the listener at all once full.
            if self.listener_registered {
                self.accept();
            }
        }

        self.shutdown();
    }

    /// Send one line to every client whose `send_next` has come due.
    fn drip(&mut self) {
        let now = Instant::now();
        let delay = Duration::from_millis(self.config.delay_ms as u64);
        let mut line = [0u8; MAX_LINE_LENGTH];

        while matches!(self.fifo.peek(), Some(client) if client.send_next <= now) {
            let mut client = self.fifo.pop().expect("peek just confirmed Some");
            let len = banner::randline(&mut line, self.config.max_line_length, &mut self.rng);

            match client.write_line(&line[..len]) {
                Ok(n) => {
                    if n > 0 {
                        client.bytes_sent += n as u64;
                        self.stats.record_write(n as u64);
                    }
                    client.send_next = now + delay;
                    self.fifo.append(client);
                }
                Err(_) => self.stats.record_close(&client, now),
            }
        }

        self.stats.set_active(self.fifo.len());
    }

    /// Drain the listener's accept backlog until it would block or capacity
    /// is reached, self-clamping on file-descriptor exhaustion. Never closes
    /// a connection to enforce `max_clients`: once full, `accept()` is
    /// simply not called again, leaving anything still pending in the
    /// kernel backlog for a future call once a slot frees.
    fn accept(&mut self) {
        loop {
            if self.fifo.len() >= self.config.max_clients {
                break;
            }

            match self.listener.accept() {
                Ok((stream, peer)) => {
                    let now = Instant::now();
                    let delay = Duration::from_millis(self.config.delay_ms as u64);
                    let client = Client::new(stream, peer, now, now + delay);
                    self.stats
                        .record_accept(&client, self.fifo.len() + 1, self.config.max_clients);
                    self.fifo.append(client);
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    match err.raw_os_error() {
                        Some(libc::EMFILE) | Some(libc::ENFILE) => {
                            let clamp = self.fifo.len().max(1);
                            self.config.clamp_max_clients(clamp);
                        }
                        _ => warn!("accept(), error: {}", err),
                    }
                    break;
                }
            }
        }

        self.stats.set_active(self.fifo.len());
    }

    /// Register or deregister the listener with `Poll` depending on whether
    /// the fifo is at capacity, mirroring the original's conditional
    /// inclusion of the server fd in its `pollfd` array
    /// (`nfds = fifo->length < config.max_clients`). `mio`'s `Registry`
    /// exposes no "is this registered" query, hence the tracked bool.
    fn sync_listener_registration(&mut self) {
        let at_capacity = self.fifo.len() >= self.config.max_clients;

        if at_capacity && self.listener_registered {
            if let Err(err) = self.poll.registry().deregister(&mut self.listener) {
                warn!("deregister(), error: {}", err);
            }
            self.listener_registered = false;
        } else if !at_capacity && !self.listener_registered {
            match self.poll.registry().register(&mut self.listener, LISTENER, Interest::READABLE) {
                Ok(()) => self.listener_registered = true,
                Err(err) => warn!("register(), error: {}", err),
            }
        }
    }

    /// Re-read the config file (soft failures only) and rebind the listener
    /// if the port or address family changed.
    fn reload(&mut self) {
        let previous_port = self.config.port;
        let previous_family = self.config.bind_family;

        if let Some(path) = self.config_path.clone() {
            self.config.load_file(&path, false);
        }
        self.config.log();

        if self.config.port != previous_port || self.config.bind_family != previous_family {
            self.rebind();
        }
    }

    fn rebind(&mut self) {
        if self.listener_registered {
            if let Err(err) = self.poll.registry().deregister(&mut self.listener) {
                warn!("deregister(), error: {}", err);
            }
        }

        let mut listener = listener::create(self.config.port, self.config.bind_family);
        self.poll
            .registry()
            .register(&mut listener, LISTENER, Interest::READABLE)
            .unwrap_or_else(|err| errx(exitcode::OSERR, format!("register(), error: {}", err)));

        self.listener = listener;
        self.listener_registered = true;
        info!("rebind port={} bind-family={}", self.config.port, self.config.bind_family);
    }

    fn shutdown(mut self) {
        let now = Instant::now();
        for client in self.fifo.destroy() {
            self.stats.record_close(&client, now);
        }
        self.stats.set_active(0);
        self.stats.log_totals(&self.fifo, now);
        info!("shutdown");
    }

    #[cfg(test)]
    fn local_addr(&self) -> std::net::SocketAddr {
        self.listener.local_addr().expect("listener is bound")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::TcpStream;
    use std::thread;

    /// `port: 0` asks the kernel for an ephemeral one; that's not a valid
    /// value through the validated setter (which requires `1..=65535`), so
    /// it's set directly on the field here rather than via `set_port`.
    fn test_config(delay_ms: u32, max_line_length: usize, max_clients: usize) -> Config {
        let mut config = Config::default();
        config.port = 0;
        config.set_delay(&delay_ms.to_string(), true);
        config.set_max_line_length(&max_line_length.to_string(), true);
        config.set_max_clients(&max_clients.to_string(), true);
        config
    }

    fn new_tarpit(delay_ms: u32, max_line_length: usize, max_clients: usize) -> Tarpit {
        Tarpit::new(
            test_config(delay_ms, max_line_length, max_clients),
            None,
            Arc::new(Statistics::default()),
            1,
        )
    }

    #[test]
    fn drip_sends_bounded_crlf_lines_never_starting_ssh() {
        let mut tarpit = new_tarpit(20, 10, 8);
        let addr = tarpit.local_addr();

        let mut client = TcpStream::connect(addr).unwrap();
        client.set_read_timeout(Some(Duration::from_millis(500))).unwrap();
        tarpit.accept();
        assert_eq!(tarpit.fifo.len(), 1);

        let deadline = Instant::now() + Duration::from_millis(500);
        while Instant::now() < deadline {
            tarpit.drip();
            thread::sleep(Duration::from_millis(5));
        }

        let mut received = Vec::new();
        client.read_to_end(&mut received).ok();

        assert!(!received.is_empty(), "expected at least one banner line");
        for line in received.split_inclusive(|&b| b == b'\n') {
            if line.is_empty() {
                continue;
            }
            assert!(line.len() <= 10, "line exceeded max-line-length: {:?}", line);
            assert!(line.ends_with(b"\r\n"), "line missing CRLF: {:?}", line);
            if line.len() >= 4 {
                assert_ne!(&line[..4], b"SSH-");
            }
        }
    }

    #[test]
    fn admission_defers_rather_than_rejects_past_max_clients() {
        let mut tarpit = new_tarpit(30, 32, 2);
        let addr = tarpit.local_addr();

        let a = TcpStream::connect(addr).unwrap();
        let _b = TcpStream::connect(addr).unwrap();
        let mut c = TcpStream::connect(addr).unwrap();
        c.set_read_timeout(Some(Duration::from_millis(100))).unwrap();

        // Give the kernel a moment to place all three in the accept backlog.
        thread::sleep(Duration::from_millis(50));
        tarpit.sync_listener_registration();
        tarpit.accept();

        assert_eq!(tarpit.fifo.len(), 2, "only max_clients should be enrolled");
        assert!(!tarpit.listener_registered, "listener should be deregistered at capacity");

        let mut buf = [0u8; 1];
        match c.read(&mut buf) {
            Err(_) => {}
            Ok(n) => panic!(
                "deferred client should receive nothing while at capacity, got {} bytes (0 would mean it was closed)",
                n
            ),
        }

        drop(a);

        let deadline = Instant::now() + Duration::from_millis(500);
        let mut serviced = false;
        while Instant::now() < deadline {
            tarpit.drip();
            tarpit.sync_listener_registration();
            if tarpit.listener_registered {
                tarpit.accept();
            }
            if tarpit.fifo.len() == 2 {
                serviced = true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        assert!(serviced, "deferred client should be accepted once a slot frees");

        c.set_read_timeout(Some(Duration::from_millis(300))).unwrap();
        let mut received = [0u8; 1];
        let n = c
            .read(&mut received)
            .expect("deferred client should eventually receive a byte");
        assert!(n > 0);
    }

    #[test]
    fn drip_destroys_client_that_has_disconnected() {
        let mut tarpit = new_tarpit(10, 32, 8);
        let addr = tarpit.local_addr();

        let client = TcpStream::connect(addr).unwrap();
        tarpit.accept();
        assert_eq!(tarpit.fifo.len(), 1);
        drop(client);

        let deadline = Instant::now() + Duration::from_millis(500);
        while Instant::now() < deadline && !tarpit.fifo.is_empty() {
            tarpit.drip();
            thread::sleep(Duration::from_millis(10));
        }

        assert!(tarpit.fifo.is_empty(), "destroyed client should leave the fifo");
    }
}
