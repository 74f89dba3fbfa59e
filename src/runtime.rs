//! Process start time, and the one sanctioned exception to the
//! single-threaded core: the optional metrics exporter's background thread.
//!
//! The exporter never touches the `Fifo` or mutates anything the core loop
//! owns; it only reads `Statistics` counters through atomics. Running it on
//! its own thread, with its own tiny tokio runtime, keeps that read path
//! off the core loop entirely without requiring the core loop itself to
//! become async.

use std::time::Instant;

#[cfg(feature = "exporters")]
use std::{net::SocketAddr, sync::Arc, thread};

#[cfg(feature = "exporters")]
use crate::{errx, stats::Statistics};

pub(crate) struct Runtime {
    startup: Instant,
}

impl Runtime {
    pub(crate) fn new() -> Self {
        Self {
            startup: Instant::now(),
        }
    }

    /// Spawn the exporter's HTTP server on a dedicated thread running its
    /// own minimal tokio runtime. A no-op if no listen addresses were
    /// configured.
    #[cfg(feature = "exporters")]
    pub(crate) fn spawn_exporter(&self, listen: Vec<SocketAddr>, stats: Arc<Statistics>) {
        if listen.is_empty() {
            return;
        }
        let startup = self.startup;
        thread::Builder::new()
            .name("tarpitd-exporter".into())
            .spawn(move || crate::exporters::run(listen, stats, startup))
            .unwrap_or_else(|err| errx(exitcode::OSERR, format!("thread::spawn(), error: {}", err)));
    }
}
