//! Command-line flags.
//!
//! The single-letter flags are the ones a longtime user of the original
//! program will type from memory; everything else is long-flag-only so it
//! never collides with them.

use std::path::PathBuf;

use structopt::StructOpt;

#[cfg(all(unix, feature = "drop_privs"))]
use crate::privilege_dropper::PrivDropConfig;

#[derive(Debug, StructOpt)]
#[structopt(name = "tarpitd", about = "A single-threaded SSH tarpit, similar to endlessh")]
pub(crate) struct Opt {
    /// Bind to IPv4 only.
    #[structopt(short = "4")]
    pub(crate) ipv4_only: bool,

    /// Bind to IPv6 only.
    #[structopt(short = "6")]
    pub(crate) ipv6_only: bool,

    /// Milliseconds to wait between sending bytes.
    #[structopt(short = "d", long = "delay")]
    pub(crate) delay_ms: Option<u32>,

    /// Configuration file path.
    #[structopt(short = "f", long = "config", parse(from_os_str))]
    pub(crate) config_file: Option<PathBuf>,

    /// Maximum length of a generated banner line.
    #[structopt(short = "l", long = "line-length")]
    pub(crate) max_line_length: Option<usize>,

    /// Maximum number of clients to tarpit at once.
    #[structopt(short = "m", long = "max-clients")]
    pub(crate) max_clients: Option<usize>,

    /// Port to listen on.
    #[structopt(short = "p", long = "port")]
    pub(crate) port: Option<u16>,

    /// Log to syslog instead of standard output.
    #[structopt(short = "s")]
    pub(crate) syslog: bool,

    /// Verbose logging; repeat for more (-v info, -vv debug, -vvv trace).
    #[structopt(short = "v", parse(from_occurrences))]
    pub(crate) verbose: u8,

    /// Disable timestamps in logs.
    #[structopt(long)]
    pub(crate) disable_log_timestamps: bool,

    /// Disable module name in logs.
    #[structopt(long)]
    pub(crate) disable_log_ident: bool,

    /// Disable level in logs.
    #[structopt(long)]
    pub(crate) disable_log_level: bool,

    #[cfg(all(unix, feature = "drop_privs"))]
    #[structopt(flatten)]
    pub(crate) privdrop: PrivDropConfig,

    /// Listen address(es) for the Prometheus metrics exporter; unset
    /// disables it.
    #[cfg(feature = "exporters")]
    #[structopt(long = "exporter")]
    pub(crate) exporter: Vec<std::net::SocketAddr>,
}
