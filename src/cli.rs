//! Command-line argument parsing for the `iocctl` demo binary.
//!
//! Mirrors the teacher's `clap` derive style (custom `Styles` to match
//! clap v3's look, `-v`/`-q` controlling both log layers) but with a much
//! smaller surface: `iocctl` is a demonstration/diagnostic tool for the
//! substrate, not a benchmark harness.

use clap::{
    builder::styling::{AnsiColor, Styles},
    Parser, Subcommand, ValueEnum,
};
use std::time::Duration;

fn styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::Yellow.on_default())
        .usage(AnsiColor::Yellow.on_default())
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// iocctl - a small diagnostic client for the inter-object communication substrate
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None, styles = styles())]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Silence user-facing informational output on stdout
    #[arg(short = 'q', long, global = true, help_heading = "Output and Logging")]
    pub quiet: bool,

    /// Increase diagnostic log verbosity on stderr.
    ///
    /// -v: debug, -vv (or more): trace. Default: info.
    #[arg(short, long, global = true, action = clap::ArgAction::Count, help_heading = "Output and Logging")]
    pub verbose: u8,

    /// Write detailed logs to this file instead of stderr ("stderr" for stderr)
    #[arg(long, global = true, help_heading = "Output and Logging")]
    pub log_file: Option<String>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run a self-contained demo: online a service, connect a peer, accept
    /// it, subscribe an event handler, and post a handful of events and
    /// data chunks through it.
    Demo {
        /// Transport to demonstrate
        #[arg(long, value_enum, default_value_t = Protocol::Fifo)]
        protocol: Protocol,

        /// FIFO service path (ignored for --protocol tcp)
        #[arg(long, default_value = "/ioc/demo")]
        path: String,

        /// TCP host to bind/connect (ignored for --protocol fifo)
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// TCP port to bind/connect (ignored for --protocol fifo)
        #[arg(long, default_value_t = 9500)]
        port: u16,

        /// Number of events to post during the demo
        #[arg(long, default_value_t = 5)]
        events: u32,

        /// Per-call timeout, e.g. "500ms", "5s"
        #[arg(long, value_parser = parse_duration, default_value = "5s")]
        timeout: Duration,
    },

    /// Print the static capability limits compiled into this build
    Capability,
}

/// Transport selector for the demo, distinct from `types::ServiceUri`'s
/// string protocol field so clap gets compile-time validated choices.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Protocol {
    Fifo,
    Tcp,
}

/// Parse a duration from strings like "10s", "500ms", "5m", "1h", or a
/// bare number (assumed seconds).
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("duration cannot be empty".to_string());
    }

    let (num_str, unit) = if let Some(stripped) = s.strip_suffix("ms") {
        (stripped, "ms")
    } else if let Some(stripped) = s.strip_suffix('s') {
        (stripped, "s")
    } else if let Some(stripped) = s.strip_suffix('m') {
        (stripped, "m")
    } else if let Some(stripped) = s.strip_suffix('h') {
        (stripped, "h")
    } else {
        (s, "s")
    };

    let num: f64 = num_str
        .parse()
        .map_err(|_| format!("invalid number in duration: {num_str}"))?;
    if num < 0.0 {
        return Err("duration cannot be negative".to_string());
    }

    Ok(match unit {
        "ms" => Duration::from_millis(num as u64),
        "s" => Duration::from_secs(num as u64),
        "m" => Duration::from_secs((num * 60.0) as u64),
        "h" => Duration::from_secs((num * 3600.0) as u64),
        _ => return Err(format!("invalid duration unit: {unit}")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_units() {
        assert_eq!(parse_duration("10s").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("10").unwrap(), Duration::from_secs(10));
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("nonsense").is_err());
        assert!(parse_duration("-5s").is_err());
    }
}
