//! Logging setup for binaries and tests built on this crate.
//!
//! The solver emits all of its diagnostics (the configuration dump and the
//! per-iteration table) at DEBUG level through `tracing`; this module wires
//! up a `tracing-subscriber` with a compact single-line format so that
//! `RUST_LOG=debug` shows them. Nothing here is required for solving:
//! embedders that install their own subscriber can ignore this module.

use tracing::Level;

/// Install the default subscriber at INFO level.
///
/// The level can be overridden through `RUST_LOG`, e.g.
/// `RUST_LOG=hybrd_solver=debug` to enable the per-iteration table.
///
/// # Example
/// ```no_run
/// use hybrd_solver::init_logger;
///
/// init_logger();
/// tracing::info!("solver starting");
/// ```
pub fn init_logger() {
    init_logger_with_level(Level::INFO)
}

/// Install the default subscriber with a chosen fallback level.
///
/// Events are rendered one per line: a millisecond timestamp, the level,
/// the originating module with the crate prefix stripped, and the message.
///
/// ```text
/// 14:02:51.310 DEBUG solver::hybrid: iter 3 accepted, |F| = 1.2e-3
/// ```
///
/// # Example
/// ```no_run
/// use hybrd_solver::init_logger_with_level;
/// use tracing::Level;
///
/// init_logger_with_level(Level::DEBUG);
/// tracing::debug!("per-iteration diagnostics enabled");
/// ```
pub fn init_logger_with_level(default_level: Level) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(default_level.into())
                .from_env_lossy(),
        )
        .event_format(CompactFormat)
        .init();
}

/// One-line event format: `HH:MM:SS.mmm LEVEL module: message`.
struct CompactFormat;

impl<S, N> tracing_subscriber::fmt::FormatEvent<S, N> for CompactFormat
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
        let meta = event.metadata();
        let target = meta.target();
        let target = target.strip_prefix("hybrd_solver::").unwrap_or(target);
        write!(
            writer,
            "{} {:>5} {}: ",
            chrono::Local::now().format("%H:%M:%S%.3f"),
            meta.level(),
            target
        )?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}
