use colored::*;
use std::fmt;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

/// A custom tracing event formatter for colorizing log output based on level.
///
/// This formatter is designed to provide clean, user-facing output where the
/// entire log line is colored according to its severity level, without any
/// extra metadata like timestamps or log levels printed.
pub struct ColorizedFormatter;

impl<S, N> FormatEvent<S, N> for ColorizedFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        // Buffer the formatted fields to apply color to the entire line.
        // This is necessary because the format_fields method writes directly.
        let mut buffer = String::new();
        let mut buf_writer = Writer::new(&mut buffer);
        ctx.format_fields(buf_writer.by_ref(), event)?;

        // Apply color based on the event's log level.
        let colored_output = match *event.metadata().level() {
            Level::INFO => buffer.white(),
            Level::WARN => buffer.yellow(),
            Level::ERROR => buffer.red(),
            Level::DEBUG => buffer.blue(),
            Level::TRACE => buffer.purple(),
        };

        // Write the colored line to the actual output.
        writeln!(writer, "{}", colored_output)
    }
}

/// Guard returned by [`init_tracing`]; drop it at the very end of `main`
/// to flush the non-blocking file writer.
pub type LogGuard = Option<tracing_appender::non_blocking::WorkerGuard>;

/// Wire up the two-layer logging setup `iocctl` uses: a detailed layer
/// (file or stderr, uncolored, filtered by `-v` count) plus an optional
/// clean stdout layer using [`ColorizedFormatter`], suppressed by `--quiet`.
pub fn init_tracing(verbose: u8, quiet: bool, log_file: Option<&str>) -> LogGuard {
    let log_level = match verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };

    let (detailed_layer, guard) = if let Some("stderr") = log_file {
        (
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(log_level)
                .boxed(),
            None,
        )
    } else {
        let (dir, filename) = match log_file {
            Some(path) => {
                let p = std::path::Path::new(path);
                (
                    p.parent().unwrap_or_else(|| std::path::Path::new(".")).to_path_buf(),
                    p.file_name()
                        .unwrap_or_else(|| std::ffi::OsStr::new("iocctl.log"))
                        .to_owned(),
                )
            }
            None => (std::path::PathBuf::from("."), std::ffi::OsString::from("iocctl.log")),
        };
        let appender = tracing_appender::rolling::daily(dir, filename);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        (
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(log_level)
                .boxed(),
            Some(guard),
        )
    };

    let stdout_layer = if !quiet {
        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .event_format(ColorizedFormatter)
                .with_filter(log_level),
        )
    } else {
        None
    };

    tracing_subscriber::registry().with(detailed_layer).with(stdout_layer).init();
    guard
}