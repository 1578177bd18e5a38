pub(crate) mod log;
pub(crate) mod tracing;

use crate::{Measure, Recorder, TagKey, TagMap};

/// Severity tag values, shared by both bridges.
///
/// Values follow the level names the backend API has always reported (`warning`, not `warn`).
pub(crate) struct SeverityTags {
    trace: TagMap,
    debug: TagMap,
    info: TagMap,
    warning: TagMap,
    error: TagMap,
}

impl SeverityTags {
    pub(crate) fn new(key: &TagKey) -> Self {
        Self {
            trace: TagMap::new().with(key, "trace"),
            debug: TagMap::new().with(key, "debug"),
            info: TagMap::new().with(key, "info"),
            warning: TagMap::new().with(key, "warning"),
            error: TagMap::new().with(key, "error"),
        }
    }
}

/// Counts log lines on a measure, tagged by severity.
#[derive(Clone)]
pub(crate) struct LogLineCounter {
    recorder: Recorder,
    measure: Measure<i64>,
    severities: std::sync::Arc<SeverityTags>,
}

impl LogLineCounter {
    pub(crate) fn new(recorder: Recorder, measure: Measure<i64>, severity: &TagKey) -> Self {
        Self {
            recorder,
            measure,
            severities: std::sync::Arc::new(SeverityTags::new(severity)),
        }
    }

    pub(crate) fn count(&self, level: ::tracing::Level) {
        let tags = match level {
            ::tracing::Level::TRACE => &self.severities.trace,
            ::tracing::Level::DEBUG => &self.severities.debug,
            ::tracing::Level::INFO => &self.severities.info,
            ::tracing::Level::WARN => &self.severities.warning,
            _ => &self.severities.error,
        };
        self.recorder.record(&self.measure, 1, tags);
    }
}
