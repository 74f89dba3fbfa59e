//! Signal intake, wired into the same `mio::Poll` the core loop blocks on.
//!
//! A plain `signal_hook::flag::register` atomic flag is enough to be
//! async-signal-safe, but it gives the event loop nothing to wait *on*: a
//! `Poll::poll(None)` blocked on the listener alone would never wake for a
//! signal delivered while the `Fifo` is empty (mio retries `EINTR`
//! internally). `signal-hook-mio` solves exactly this by handing back a
//! `mio::event::Source`, so pending signals become just another token in
//! the same `poll()` call.

use mio::{Interest, Poll, Token};
use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM, SIGUSR1};
use signal_hook_mio::v0_8::Signals as SignalSource;

use crate::errx;

pub(crate) const TOKEN: Token = Token(usize::MAX);

pub(crate) struct Signals {
    source: SignalSource,
    running: bool,
}

impl Signals {
    /// Register for `SIGTERM`/`SIGINT` (shutdown), `SIGHUP` (reload), and
    /// `SIGUSR1` (stats dump) against `poll`, and ignore `SIGPIPE`
    /// process-wide so a broken pipe always shows up as a write error.
    pub(crate) fn install(poll: &Poll) -> Self {
        let mut source = SignalSource::new(&[SIGTERM, SIGINT, SIGHUP, SIGUSR1])
            .unwrap_or_else(|err| errx(exitcode::OSERR, format!("signal(), error: {}", err)));

        poll.registry()
            .register(&mut source, TOKEN, Interest::READABLE)
            .unwrap_or_else(|err| errx(exitcode::OSERR, format!("signal registry(), error: {}", err)));

        // SAFETY: SIG_IGN takes no action and performs no I/O or allocation,
        // so it's safe to install directly.
        unsafe {
            libc::signal(libc::SIGPIPE, libc::SIG_IGN);
        }

        Self {
            source,
            running: true,
        }
    }

    /// Drain every signal delivered since the last call. Returns whether a
    /// reload and/or a stats dump were requested; shutdown is reflected in
    /// `running()`.
    pub(crate) fn drain(&mut self) -> (bool, bool) {
        let mut reload = false;
        let mut dumpstats = false;
        for signal in self.source.pending() {
            match signal {
                SIGTERM | SIGINT => self.running = false,
                SIGHUP => reload = true,
                SIGUSR1 => dumpstats = true,
                _ => (),
            }
        }
        (reload, dumpstats)
    }

    pub(crate) fn running(&self) -> bool {
        self.running
    }
}
