use std::{path::PathBuf, str::FromStr};

use serde::Deserialize;
use tracing::{Metadata, metadata::LevelFilter};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    Layer, filter::FilterFn, fmt, prelude::__tracing_subscriber_SubscriberExt,
    util::SubscriberInitExt,
};

#[macro_export]
macro_rules! log {
    ($level:expr, $span:expr, $($msg:expr),*) => {{
        let span = $crate::tracing::span!($level, $span);
        let _enter = span.enter();

        $crate::tracing::event!($level, $($msg),*)
    }};
}

#[macro_export]
macro_rules! internal {
    (level = $level:ident, $($msg:expr),*) => {
        $crate::log!($crate::tracing::Level::$level, "internal", $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::internal!(level = TRACE, $($msg),*)
    };
}

/// Where log output goes besides the terminal
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    /// Append a plain-text copy of the log to this file
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn courier_targets(metadata: &Metadata<'_>) -> bool {
    metadata.target().starts_with("courier")
}

fn level_from_env() -> LevelFilter {
    let default = if cfg!(debug_assertions) {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    };

    std::env::var("LOG_LEVEL").map_or(default, |level| {
        LevelFilter::from_str(level.as_str()).unwrap_or_else(|_| {
            eprintln!("Invalid log level specified {level}, defaulting to {default}");
            default
        })
    })
}

/// Install the global subscriber.
///
/// The returned guard flushes the log file when dropped, so the caller must
/// keep it alive for as long as it wants file output.
pub fn init(config: &LoggingConfig) -> Option<WorkerGuard> {
    let level = level_from_env();

    let terminal = fmt::layer()
        .with_file(false)
        .with_line_number(false)
        .compact()
        .with_ansi(true)
        .with_timer(fmt::time::ChronoUtc::rfc_3339())
        .with_filter(level)
        .with_filter(FilterFn::new(courier_targets));

    let (file, guard) = config
        .file
        .as_ref()
        .and_then(|path| {
            let name = path.file_name()?;
            let directory = path
                .parent()
                .filter(|parent| !parent.as_os_str().is_empty())
                .map_or_else(|| PathBuf::from("."), PathBuf::from);

            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(directory, name));

            let layer = fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .with_timer(fmt::time::ChronoUtc::rfc_3339())
                .with_filter(level)
                .with_filter(FilterFn::new(courier_targets));

            Some((layer, guard))
        })
        .unzip();

    if let Err(err) = tracing_subscriber::Registry::default()
        .with(terminal)
        .with(file)
        .try_init()
    {
        eprintln!("Logging already initialised: {err}");
    }

    guard
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::LoggingConfig;

    #[test]
    fn logging_config_defaults_to_terminal_only() {
        let config: LoggingConfig = ron::from_str("()").unwrap();
        assert!(config.file.is_none());
    }

    #[test]
    fn logging_config_reads_file() {
        let config: LoggingConfig = ron::from_str(r#"(file: Some("email_queue.log"))"#).unwrap();
        assert_eq!(
            config.file.as_deref(),
            Some(std::path::Path::new("email_queue.log"))
        );
    }
}
