//! Console logging setup for programs and tests built on apex-fusion.
//!
//! The library itself only emits `tracing` events; installing a subscriber is left to the
//! application. These helpers install one with the library's bracketed line format:
//!
//! ```text
//! [INFO 2024-05-01 12:00:00 apex_fusion::optimizer::gauss_newton] Gauss-Newton Final Result
//! [DEBUG 2024-05-01 12:00:00 cgls.rs:171] CGLS converged after 12 iterations
//! ```

use chrono::Local;
use std::fmt;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::{
    EnvFilter,
    fmt::{FmtContext, FormatEvent, FormatFields, format::Writer},
    registry::LookupSpan,
};

/// Install the global subscriber with an INFO default.
///
/// `RUST_LOG` overrides the default, e.g. `RUST_LOG=apex_fusion=debug` prints the
/// Gauss-Newton iteration table. Calling this again after a subscriber is installed does
/// nothing.
///
/// ```no_run
/// apex_fusion::init_logger();
/// tracing::info!("optimizing");
/// ```
pub fn init_logger() {
    init_logger_with_level(Level::INFO)
}

/// Install the global subscriber with `default_level` as the fallback filter.
pub fn init_logger_with_level(default_level: Level) {
    let filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();
    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .event_format(BracketFormatter)
        .try_init();
    if installed.is_err() {
        tracing::debug!("global tracing subscriber already installed");
    }
}

/// `[LEVEL timestamp location] message`, where the location is `file:line` for DEBUG and
/// TRACE events and the module target otherwise.
struct BracketFormatter;

fn colored_level(level: &Level) -> &'static str {
    match *level {
        Level::ERROR => "\x1b[31mERROR\x1b[0m",
        Level::WARN => "\x1b[33mWARN\x1b[0m",
        Level::INFO => "\x1b[32mINFO\x1b[0m",
        Level::DEBUG => "\x1b[34mDEBUG\x1b[0m",
        Level::TRACE => "\x1b[35mTRACE\x1b[0m",
    }
}

fn write_location(writer: &mut Writer<'_>, event: &Event<'_>) -> fmt::Result {
    let metadata = event.metadata();
    let verbose = matches!(*metadata.level(), Level::DEBUG | Level::TRACE);
    match (verbose, metadata.file()) {
        (true, Some(file)) => {
            let filename = file.rsplit(['/', '\\']).next().unwrap_or(file);
            match metadata.line() {
                Some(line) => write!(writer, "{filename}:{line}"),
                None => write!(writer, "{filename}"),
            }
        }
        _ => write!(writer, "{}", metadata.target()),
    }
}

impl<S, N> FormatEvent<S, N> for BracketFormatter
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
        write!(
            writer,
            "[{} {} ",
            colored_level(event.metadata().level()),
            Local::now().format("%Y-%m-%d %H:%M:%S")
        )?;
        write_location(&mut writer, event)?;
        write!(writer, "] ")?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}
