//! Typed, validated configuration, reloadable from a flat key/value file.
//!
//! Two failure modes, matching the original program: *hard* failures (seen
//! at startup, from flags or the initial config file) exit the process;
//! *soft* failures (seen on a SIGHUP reload) log a warning and leave the
//! prior value in place.

use std::fmt;
use std::fs;
use std::str::FromStr;

use log::{info, warn};

#[cfg(target_os = "freebsd")]
pub(crate) const DEFAULT_CONFIG_FILE: &str = "/usr/local/etc/endlessh.config";
#[cfg(not(target_os = "freebsd"))]
pub(crate) const DEFAULT_CONFIG_FILE: &str = "/etc/endlessh/config";

pub(crate) const DEFAULT_PORT: u16 = 2222;
pub(crate) const DEFAULT_DELAY_MS: u32 = 10_000;
pub(crate) const DEFAULT_MAX_LINE_LENGTH: usize = 32;
pub(crate) const DEFAULT_MAX_CLIENTS: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BindFamily {
    Dual,
    V4Only,
    V6Only,
}

impl fmt::Display for BindFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BindFamily::Dual => "IPv4 Mapped IPv6",
            BindFamily::V4Only => "IPv4 Only",
            BindFamily::V6Only => "IPv6 Only",
        })
    }
}

impl FromStr for BindFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "0" => Ok(BindFamily::Dual),
            "4" => Ok(BindFamily::V4Only),
            "6" => Ok(BindFamily::V6Only),
            other => Err(format!("invalid address family: {}", other)),
        }
    }
}

/// Live, mutable-by-reload configuration. Everything here is either set at
/// startup from CLI flags/config file, or overwritten wholesale on SIGHUP.
#[derive(Debug, Clone)]
pub(crate) struct Config {
    pub(crate) port: u16,
    pub(crate) delay_ms: u32,
    pub(crate) max_line_length: usize,
    pub(crate) max_clients: usize,
    pub(crate) bind_family: BindFamily,
    pub(crate) log_level: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            delay_ms: DEFAULT_DELAY_MS,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            max_clients: DEFAULT_MAX_CLIENTS,
            bind_family: BindFamily::Dual,
            log_level: 0,
        }
    }
}

/// Abort the process; used only for hard failures at startup.
fn die(message: impl AsRef<str>) -> ! {
    eprintln!("tarpitd: fatal: {}", message.as_ref());
    std::process::exit(exitcode::CONFIG);
}

impl Config {
    pub(crate) fn set_port(&mut self, value: &str, hardfail: bool) {
        match value.parse::<u32>() {
            Ok(v) if (1..=65535).contains(&v) => self.port = v as u16,
            _ => Self::invalid("port", value, hardfail),
        }
    }

    pub(crate) fn set_delay(&mut self, value: &str, hardfail: bool) {
        match value.parse::<u32>() {
            Ok(v) if v >= 1 && v <= i32::MAX as u32 => self.delay_ms = v,
            _ => Self::invalid("delay", value, hardfail),
        }
    }

    pub(crate) fn set_max_line_length(&mut self, value: &str, hardfail: bool) {
        match value.parse::<usize>() {
            Ok(v) if (3..=255).contains(&v) => self.max_line_length = v,
            _ => Self::invalid("line length", value, hardfail),
        }
    }

    pub(crate) fn set_max_clients(&mut self, value: &str, hardfail: bool) {
        match value.parse::<usize>() {
            Ok(v) if v >= 1 && v <= i32::MAX as usize => self.max_clients = v,
            _ => Self::invalid("max clients", value, hardfail),
        }
    }

    pub(crate) fn set_bind_family(&mut self, value: &str, hardfail: bool) {
        match value.parse::<BindFamily>() {
            Ok(family) => self.bind_family = family,
            Err(_) => Self::invalid("address family", value, hardfail),
        }
    }

    pub(crate) fn set_log_level(&mut self, value: &str, hardfail: bool) {
        match value.parse::<u8>() {
            Ok(v) if v <= 2 => self.log_level = v,
            _ => Self::invalid("log level", value, hardfail),
        }
    }

    fn invalid(what: &str, value: &str, hardfail: bool) {
        let message = format!("Invalid {}: {}", what, value);
        if hardfail {
            die(message);
        } else {
            eprintln!("tarpitd: {}", message);
        }
    }

    /// Parse and apply a config file. A missing file is not an error; a
    /// malformed line is a soft warning unless `hardfail`.
    pub(crate) fn load_file(&mut self, path: &str, hardfail: bool) {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(_) => return,
        };

        for (lineno, raw_line) in contents.lines().enumerate() {
            let lineno = lineno + 1;
            let line = match raw_line.split('#').next() {
                Some(l) => l,
                None => continue,
            };
            let tokens: Vec<&str> = line.split_whitespace().collect();

            match tokens.len() {
                0 => continue,
                1 => {
                    eprintln!("{}:{}: Missing value", path, lineno);
                    if hardfail {
                        std::process::exit(exitcode::CONFIG);
                    }
                }
                2 => self.apply_directive(path, lineno, tokens[0], tokens[1], hardfail),
                _ => {
                    eprintln!("{}:{}: Too many values", path, lineno);
                    if hardfail {
                        std::process::exit(exitcode::CONFIG);
                    }
                }
            }
        }
    }

    fn apply_directive(&mut self, path: &str, lineno: usize, key: &str, value: &str, hardfail: bool) {
        match key {
            "Port" => self.set_port(value, hardfail),
            "Delay" => self.set_delay(value, hardfail),
            "MaxLineLength" => self.set_max_line_length(value, hardfail),
            "MaxClients" => self.set_max_clients(value, hardfail),
            "LogLevel" => self.set_log_level(value, hardfail),
            "BindFamily" => self.set_bind_family(value, hardfail),
            _ => {
                eprintln!("{}:{}: Unknown option '{}'", path, lineno, key);
            }
        }
    }

    pub(crate) fn log(&self) {
        info!("Port {}", self.port);
        info!("Delay {}", self.delay_ms);
        info!("MaxLineLength {}", self.max_line_length);
        info!("MaxClients {}", self.max_clients);
        info!("BindFamily {}", self.bind_family);
    }

    /// Self-clamp in response to `EMFILE`/`ENFILE` on accept.
    pub(crate) fn clamp_max_clients(&mut self, to: usize) {
        self.max_clients = to;
        warn!("MaxClients {}", to);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn validated_setters_reject_out_of_range() {
        let mut config = Config::default();
        config.set_port("99999", false);
        assert_eq!(config.port, DEFAULT_PORT);
        config.set_port("22", false);
        assert_eq!(config.port, 22);

        config.set_max_line_length("2", false);
        assert_eq!(config.max_line_length, DEFAULT_MAX_LINE_LENGTH);
        config.set_max_line_length("255", false);
        assert_eq!(config.max_line_length, 255);
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let mut config = Config::default();
        config.load_file("/nonexistent/path/to/config", true);
        assert_eq!(config.port, DEFAULT_PORT);
    }

    #[test]
    fn file_grammar_parses_recognized_keys() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "Port 2022 # comment").unwrap();
        writeln!(file, "Delay 5000").unwrap();
        writeln!(file, "# full line comment").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "MaxClients 10").unwrap();
        writeln!(file, "BindFamily 4").unwrap();
        writeln!(file, "Unrecognized 1").unwrap();

        let mut config = Config::default();
        config.load_file(file.path().to_str().unwrap(), false);

        assert_eq!(config.port, 2022);
        assert_eq!(config.delay_ms, 5000);
        assert_eq!(config.max_clients, 10);
        assert_eq!(config.bind_family, BindFamily::V4Only);
    }

    #[test]
    fn max_clients_key_binds_to_max_clients_not_line_length() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "MaxClients 7").unwrap();
        let mut config = Config::default();
        config.load_file(file.path().to_str().unwrap(), false);
        assert_eq!(config.max_clients, 7);
        assert_eq!(config.max_line_length, DEFAULT_MAX_LINE_LENGTH);
    }
}
