//! Structured logging setup. Simpler than a multi-command CLI's logging
//! needs: one process, one log stream, console only.

use std::io::{self, IsTerminal};

use tracing_subscriber::{fmt, EnvFilter};

use crate::cli::ColorChoice;

/// Holds nothing right now, but keeps `init_logging`'s call site symmetric
/// with a future guard type (e.g. a flush-on-drop file appender) without
/// forcing a signature change.
pub struct LogGuard;

pub fn init_logging(verbosity: u8, color: ColorChoice) -> LogGuard {
    let default_filter = match verbosity {
        0 => "info",
        1 => "info,l10n_scheduler=debug",
        2 => "info,l10n_scheduler=trace",
        _ => "trace",
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let use_ansi = match color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => io::stderr().is_terminal(),
    };

    fmt()
        .with_writer(io::stderr)
        .with_ansi(use_ansi)
        .with_target(false)
        .with_env_filter(env_filter)
        .init();

    LogGuard
}
