use log::{LevelFilter, Metadata, Record};

use crate::{Recorder, backend::BackendApiStats, bridges::LogLineCounter};

/// A [`log::Log`] implementation counting every enabled record as a logged line.
///
/// Records are counted on the [log lines measure][BackendApiStats::log_lines], tagged with their
/// severity, then handed to the wrapped logger if there is one.
///
/// By default the filter is read from `RUST_LOG`, falling back to `info`.
pub struct LogLinesLogger {
    counter: LogLineCounter,
    filter: env_filter::Filter,
    inner: Option<Box<dyn log::Log>>,
}

impl LogLinesLogger {
    /// A logger counting into `stats` through `recorder`.
    #[must_use]
    pub fn new(recorder: Recorder, stats: &BackendApiStats) -> Self {
        let mut filter_builder = env_filter::Builder::new();
        if let Ok(filter) = std::env::var("RUST_LOG") {
            filter_builder.parse(&filter);
        } else {
            filter_builder.filter_level(LevelFilter::Info);
        }

        Self {
            counter: LogLineCounter::new(recorder, stats.log_lines.clone(), &stats.key_severity),
            filter: filter_builder.build(),
            inner: None,
        }
    }

    /// Replace the filter with `directives`, in `RUST_LOG` syntax.
    #[must_use]
    pub fn with_filter_directives(mut self, directives: &str) -> Self {
        self.filter = env_filter::Builder::new().parse(directives).build();
        self
    }

    /// Forward enabled records to `inner` after counting them.
    #[must_use]
    pub fn with_inner(mut self, inner: impl log::Log + 'static) -> Self {
        self.inner = Some(Box::new(inner));
        self
    }

    /// The most verbose level this logger lets through.
    #[must_use]
    pub fn max_level(&self) -> LevelFilter {
        self.filter.filter()
    }

    /// Install as the global `log` logger.
    ///
    /// # Errors
    ///
    /// Fails if a global logger is already set.
    pub fn init(self) -> Result<&'static Self, log::SetLoggerError> {
        let max_level = self.max_level();
        let logger: &'static Self = Box::leak(Box::new(self));
        log::set_logger(logger)?;
        log::set_max_level(max_level);
        Ok(logger)
    }
}

impl log::Log for LogLinesLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.filter.enabled(metadata)
    }

    fn log(&self, record: &Record) {
        if !self.filter.matches(record) {
            return;
        }
        self.counter.count(to_tracing_level(record.level()));
        if let Some(inner) = &self.inner {
            inner.log(record);
        }
    }

    fn flush(&self) {
        if let Some(inner) = &self.inner {
            inner.flush();
        }
    }
}

fn to_tracing_level(level: log::Level) -> tracing::Level {
    match level {
        log::Level::Trace => tracing::Level::TRACE,
        log::Level::Debug => tracing::Level::DEBUG,
        log::Level::Info => tracing::Level::INFO,
        log::Level::Warn => tracing::Level::WARN,
        log::Level::Error => tracing::Level::ERROR,
    }
}
