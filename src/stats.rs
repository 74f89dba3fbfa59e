//! Process-wide counters and the log lines derived from them.
//!
//! Fields are atomics, not because the core loop needs concurrency (it
//! doesn't — it's the sole writer) but so the optional metrics exporter
//! (`exporters.rs`, its own thread) can take a lock-free read-only snapshot
//! without the core loop ever blocking on it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use log::info;

use crate::client::Client;
use crate::fifo::Fifo;

#[derive(Default)]
pub(crate) struct Statistics {
    connects: AtomicU64,
    milliseconds: AtomicU64,
    bytes_sent: AtomicU64,
    active: AtomicU64,
}

impl Statistics {
    pub(crate) fn record_accept(&self, client: &Client, fifo_len: usize, max_clients: usize) {
        self.connects.fetch_add(1, Ordering::Relaxed);
        info!(
            "ACCEPT host={} port={} fd={} n={}/{}",
            client.peer.ip(),
            client.peer.port(),
            fd_of(client),
            fifo_len,
            max_clients,
        );
    }

    /// Record the current enrollment count, for the exporter to read.
    pub(crate) fn set_active(&self, fifo_len: usize) {
        self.active.store(fifo_len as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_write(&self, n: u64) {
        self.bytes_sent.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn record_close(&self, client: &Client, now: Instant) {
        let dt = client.elapsed_ms(now) as u64;
        self.milliseconds.fetch_add(dt, Ordering::Relaxed);
        info!(
            "CLOSE host={} port={} fd={} time={}.{:03} bytes={}",
            client.peer.ip(),
            client.peer.port(),
            fd_of(client),
            dt / 1000,
            dt % 1000,
            client.bytes_sent,
        );
    }

    /// Emit the cumulative totals line, folding in the elapsed time of
    /// every still-enrolled client as of `now`.
    pub(crate) fn log_totals(&self, fifo: &Fifo, now: Instant) {
        let (connects, bytes_sent, milliseconds) = self.snapshot(fifo, now);
        info!(
            "TOTALS connects={} seconds={}.{:03} bytes={}",
            connects,
            milliseconds / 1000,
            milliseconds % 1000,
            bytes_sent,
        );
    }

    /// `(connects, bytes_sent, milliseconds)` with in-flight clients' time
    /// folded in, for both the `TOTALS` log line and the metrics exporter.
    pub(crate) fn snapshot(&self, fifo: &Fifo, now: Instant) -> (u64, u64, u64) {
        let mut milliseconds = self.milliseconds.load(Ordering::Relaxed);
        for client in fifo.iter() {
            milliseconds += client.elapsed_ms(now) as u64;
        }
        (
            self.connects.load(Ordering::Relaxed),
            self.bytes_sent.load(Ordering::Relaxed),
            milliseconds,
        )
    }

    /// Point-in-time counters for the metrics exporter: connects, bytes
    /// sent, and currently enrolled clients. Unlike `snapshot`, this never
    /// touches the `Fifo` (the exporter runs on another thread and has no
    /// access to it), so elapsed time of in-flight clients isn't folded in.
    pub(crate) fn export_snapshot(&self) -> (u64, u64, u64) {
        (
            self.connects.load(Ordering::Relaxed),
            self.bytes_sent.load(Ordering::Relaxed),
            self.active.load(Ordering::Relaxed),
        )
    }
}

fn fd_of(client: &Client) -> i32 {
    #[cfg(unix)]
    {
        use std::os::unix::io::AsRawFd;
        client.stream.as_raw_fd()
    }
    #[cfg(not(unix))]
    {
        let _ = client;
        -1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_across_calls() {
        let stats = Statistics::default();
        stats.record_write(10);
        stats.record_write(5);
        stats.set_active(3);
        let (connects, bytes_sent, active) = stats.export_snapshot();
        assert_eq!(connects, 0);
        assert_eq!(bytes_sent, 15);
        assert_eq!(active, 3);
    }
}
