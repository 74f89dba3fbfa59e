//! A single-threaded SSH tarpit, similar to endlessh.
//!
//! As per RFC 4253:
//!
//!   The server MAY send other lines of data before sending the version
//!   string.  Each line SHOULD be terminated by a Carriage Return and Line
//!   Feed.  Such lines MUST NOT begin with "SSH-", and SHOULD be encoded
//!   in ISO-10646 UTF-8 [RFC3629] (language is not specified).  Clients
//!   MUST be able to process such lines.
//!
//! In other words, an SSH client can be kept waiting an extremely long time
//! for a handshake to even begin by waffling on endlessly before it.
//!
//! The intent is to increase the cost of mass SSH scanning: even clients
//! that disconnect immediately after the first line are delayed a little,
//! and that's one less free connection for the next attack.

#![warn(clippy::all)]
#![warn(future_incompatible)]
#![deny(unused_must_use)]

mod banner;
mod cli;
mod client;
mod config;
#[cfg(feature = "exporters")]
mod exporters;
mod fifo;
mod listener;
mod logging;
#[cfg(all(unix, feature = "drop_privs"))]
mod privilege_dropper;
mod rng;
mod runtime;
mod signals;
mod stats;
mod tarpit;

use std::process;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use log::error;
use structopt::StructOpt;

use cli::Opt;
use config::Config;
use logging::Sink;
use runtime::Runtime;
use stats::Statistics;
use tarpit::Tarpit;

pub(crate) fn errx<M: AsRef<str>>(code: i32, message: M) -> ! {
    error!("{}", message.as_ref());
    process::exit(code);
}

/// Seed the PRNG the same way the original does: wall clock mixed with the
/// process id, so two processes started in the same tick still diverge.
fn seed() -> u64 {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    secs ^ process::id() as u64
}

fn main() {
    let opt = Opt::from_args();

    let config_path = opt
        .config_file
        .clone()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|| config::DEFAULT_CONFIG_FILE.to_owned());

    let mut config = Config::default();
    // Loaded before the logger is initialized so a `LogLevel` directive in
    // the file actually has a chance to reach it, rather than being parsed
    // and stored into a field nothing reads.
    config.load_file(&config_path, true);

    if let Some(port) = opt.port {
        config.set_port(&port.to_string(), true);
    }
    if let Some(delay) = opt.delay_ms {
        config.set_delay(&delay.to_string(), true);
    }
    if let Some(len) = opt.max_line_length {
        config.set_max_line_length(&len.to_string(), true);
    }
    if let Some(max_clients) = opt.max_clients {
        config.set_max_clients(&max_clients.to_string(), true);
    }
    if opt.ipv4_only {
        config.set_bind_family("4", true);
    } else if opt.ipv6_only {
        config.set_bind_family("6", true);
    }
    // `-v` overrides the file's `LogLevel` the same way every other flag
    // overrides its file counterpart; no `-v` at all leaves the file's
    // value (or the default) in place.
    if opt.verbose > 0 {
        config.set_log_level(&opt.verbose.to_string(), true);
    }

    let sink = if opt.syslog { Sink::Syslog } else { Sink::Stdout };
    logging::init(
        sink,
        config.log_level,
        !opt.disable_log_timestamps,
        !opt.disable_log_ident,
        !opt.disable_log_level,
    );

    config.log();

    #[cfg(all(unix, feature = "drop_privs"))]
    opt.privdrop.drop();

    #[cfg(all(unix, feature = "sandbox"))]
    {
        let sandboxed = rusty_sandbox::Sandbox::new().sandbox_this_process().is_ok();
        log::info!("sandbox enabled={}", sandboxed);
    }

    let stats = Arc::new(Statistics::default());
    let runtime = Runtime::new();

    #[cfg(feature = "exporters")]
    runtime.spawn_exporter(opt.exporter.clone(), Arc::clone(&stats));

    let tarpit = Tarpit::new(config, Some(config_path), stats, seed());
    tarpit.run();
}
