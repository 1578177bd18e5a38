use tracing::Subscriber;
use tracing_subscriber::{Layer, layer::Context};

use crate::{Recorder, backend::BackendApiStats, bridges::LogLineCounter};

/// A `tracing` layer counting every event as a logged line.
///
/// Each event records `1` on the [log lines measure][BackendApiStats::log_lines], tagged with its
/// severity. Filtering applies as for any other layer of the subscriber.
///
/// # Example
///
/// ```rust
/// use tracing_subscriber::layer::SubscriberExt;
///
/// let stats = backendapi_stats::configure().finish().expect("configured");
/// let layer = stats.log_lines_layer().expect("default views are enabled");
///
/// tracing::subscriber::with_default(tracing_subscriber::registry().with(layer), || {
///     tracing::warn!("something looks off");
/// });
///
/// let snapshot = stats.exporter().collect();
/// let log_lines = snapshot.metric("open_match_log_lines_total").expect("registered");
/// assert!(log_lines.series_with(&["warning"]).is_some());
/// ```
#[derive(Clone)]
pub struct LogLinesLayer {
    counter: LogLineCounter,
}

impl LogLinesLayer {
    /// A layer counting into `stats` through `recorder`.
    #[must_use]
    pub fn new(recorder: Recorder, stats: &BackendApiStats) -> Self {
        Self {
            counter: LogLineCounter::new(recorder, stats.log_lines.clone(), &stats.key_severity),
        }
    }
}

impl<S> Layer<S> for LogLinesLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        self.counter.count(*event.metadata().level());
    }
}
