//! The two interchangeable log sinks.
//!
//! Modeled as a variant rather than a swappable function pointer: the choice
//! between stdout and syslog is made once per process (`-s`), never mixed.

use log::LevelFilter;

#[derive(Debug, Clone, Copy)]
pub(crate) enum Sink {
    Stdout,
    Syslog,
}

pub(crate) fn init(sink: Sink, verbosity: u8, timestamps: bool, ident: bool, level: bool) {
    let filter = match verbosity {
        0 => LevelFilter::Off,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    match sink {
        Sink::Stdout => {
            env_logger::Builder::from_default_env()
                .filter(None, filter)
                .format_timestamp(if timestamps {
                    Some(env_logger::fmt::TimestampPrecision::Millis)
                } else {
                    None
                })
                .format_module_path(ident)
                .format_level(level)
                .init();
        }
        Sink::Syslog => {
            if let Err(err) = syslog::init(syslog::Facility::LOG_DAEMON, filter, Some("tarpitd")) {
                eprintln!("tarpitd: fatal: syslog(), error: {}", err);
                std::process::exit(exitcode::OSERR);
            }
        }
    }
}
