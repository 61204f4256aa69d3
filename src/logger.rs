//! Logging setup for the `subgraph_grid` binary and other executables.
//!
//! The library itself only emits `tracing` events; nothing is printed unless a subscriber
//! is installed. This module installs one with a compact bracketed format.

use tracing::Level;

use crate::optimizer::Verbosity;

/// Install the standard subscriber at INFO level.
///
/// Format: `[LEVEL YYYY-MM-DD HH:MM:SS module] message` for INFO/WARN/ERROR and
/// `[LEVEL YYYY-MM-DD HH:MM:SS file:line] message` for DEBUG/TRACE.
///
/// # Example
/// ```no_run
/// use subgraph_solver::init_logger;
///
/// init_logger();
/// tracing::info!("Application started");
/// ```
///
/// The level can be overridden through `RUST_LOG`:
/// ```bash
/// RUST_LOG=debug cargo run --bin subgraph_grid
/// RUST_LOG=subgraph_solver=trace cargo run --bin subgraph_grid
/// ```
pub fn init_logger() {
    init_logger_with_level(Level::INFO)
}

/// Install the standard subscriber with `default_level`, still overridable via `RUST_LOG`.
pub fn init_logger_with_level(default_level: Level) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(default_level.into())
                .from_env_lossy(),
        )
        .event_format(BracketFormatter)
        .init();
}

/// Pick a default level so that a solver running at `verbosity` is actually heard.
///
/// Solver summaries and iteration lines are INFO events; `Iteration` additionally enables
/// DEBUG so configuration dumps show up too.
pub fn level_for_verbosity(verbosity: Verbosity) -> Level {
    match verbosity {
        Verbosity::Silent => Level::WARN,
        Verbosity::Summary => Level::INFO,
        Verbosity::Iteration => Level::DEBUG,
    }
}

fn level_tag(level: Level) -> &'static str {
    match level {
        Level::ERROR => "\x1b[31mERROR\x1b[0m",
        Level::WARN => "\x1b[33mWARN\x1b[0m",
        Level::INFO => "\x1b[32mINFO\x1b[0m",
        Level::DEBUG => "\x1b[34mDEBUG\x1b[0m",
        Level::TRACE => "\x1b[35mTRACE\x1b[0m",
    }
}

struct BracketFormatter;

impl<S, N> tracing_subscriber::fmt::FormatEvent<S, N> for BracketFormatter
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    N: for<'a> tracing_subscriber::fmt::FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &tracing_subscriber::fmt::FmtContext<'_, S, N>,
        mut writer: tracing_subscriber::fmt::format::Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let metadata = event.metadata();
        let level = *metadata.level();

        write!(
            writer,
            "[{} {} ",
            level_tag(level),
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        )?;

        let location = match (metadata.file(), metadata.line()) {
            (Some(file), Some(line)) if level >= Level::DEBUG => {
                let filename = file.rsplit('/').next().unwrap_or(file);
                format!("{filename}:{line}")
            }
            _ => metadata.target().to_string(),
        };
        write!(writer, "{location}] ")?;

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}
