//! Export-side view of the aggregated state.
//!
//! A view named `backend/assignments` exported under the namespace `open_match` becomes the
//! metric `open_match_backend_assignments`: slashes in the view name are replaced by underscores
//! and the result is appended to the namespace. See [`export_name`].
//!
//! Distribution views are exported as histograms, which add derived `<name>_bucket`,
//! `<name>_sum` and `<name>_count` series; see [`MetricFamily::samples`].
//!
//! The view description becomes the metric's HELP text.
//!
//! Sum views may go down when negative values are recorded, so they are exported untyped rather
//! than as counters.

use chrono::{DateTime, Utc};
use prometheus::{Encoder, TextEncoder, proto};
use thiserror::Error;

use crate::{
    ConfigureError,
    aggregation::{Aggregation, AggregationData},
    internal::names::is_valid_label_name,
    registry::Registry,
    tags::BUCKET_LABEL,
    view::View,
};

/// The external metric name of the view `view_name` under `namespace`.
///
/// ```rust
/// assert_eq!(
///     backendapi_stats::export::export_name("open_match", "backend/assignments"),
///     "open_match_backend_assignments"
/// );
/// ```
#[must_use]
pub fn export_name(namespace: &str, view_name: &str) -> String {
    format!("{namespace}_{}", flatten_view_name(view_name))
}

pub(crate) fn flatten_view_name(view_name: &str) -> String {
    view_name.replace('/', "_")
}

/// The exported metric type of a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum MetricKind {
    /// Monotonic total; produced by count views.
    Counter,
    /// Total which may decrease; produced by sum views.
    Untyped,
    /// Point-in-time value; produced by last value views.
    Gauge,
    /// Bucketed distribution; produced by distribution views.
    Histogram,
}

impl MetricKind {
    pub(crate) fn of(aggregation: &Aggregation) -> Self {
        match aggregation {
            Aggregation::Count => MetricKind::Counter,
            Aggregation::Sum => MetricKind::Untyped,
            Aggregation::LastValue => MetricKind::Gauge,
            Aggregation::Distribution(_) => MetricKind::Histogram,
        }
    }

    /// The name used in the `# TYPE` line of the text format.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Untyped => "untyped",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
        }
    }

    fn to_proto(self) -> proto::MetricType {
        match self {
            MetricKind::Counter => proto::MetricType::COUNTER,
            MetricKind::Untyped => proto::MetricType::UNTYPED,
            MetricKind::Gauge => proto::MetricType::GAUGE,
            MetricKind::Histogram => proto::MetricType::HISTOGRAM,
        }
    }
}

/// One exported time series: a tag combination of a view and its aggregated value.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Series {
    /// Label names and values, in the view's tag key order.
    pub labels: Vec<(String, String)>,
    /// The aggregated value(s).
    pub data: AggregationData,
    /// Arrival time of the most recent record folded into this series.
    pub last_updated: DateTime<Utc>,
}

/// A single flattened sample, as it appears on one line of the text format.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Sample {
    /// Metric name, including any derived suffix.
    pub name: String,
    /// Label names and values.
    pub labels: Vec<(String, String)>,
    /// The sample value.
    pub value: f64,
}

/// The exported form of one view.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct MetricFamily {
    /// External metric name.
    pub name: String,
    /// Name of the view this metric was produced from.
    pub view: String,
    /// HELP text, taken from the view description.
    pub help: String,
    /// Unit of the underlying measure.
    pub unit: String,
    /// Exported metric type.
    pub kind: MetricKind,
    /// Label names, in the view's tag key order.
    pub label_names: Vec<String>,
    /// Series, sorted by label values.
    pub series: Vec<Series>,
}

impl MetricFamily {
    /// The series with exactly these label values (in label order), if any.
    #[must_use]
    pub fn series_with(&self, label_values: &[&str]) -> Option<&Series> {
        self.series.iter().find(|series| {
            series.labels.len() == label_values.len()
                && series
                    .labels
                    .iter()
                    .zip(label_values)
                    .all(|((_, value), expected)| value == expected)
        })
    }

    /// Flatten the series into samples.
    ///
    /// Histograms yield, per series, one cumulative `<name>_bucket` sample per bucket carrying an
    /// `le` label (ending with `+Inf`), then `<name>_sum` and `<name>_count`.
    #[must_use]
    #[expect(
        clippy::cast_precision_loss,
        reason = "exposition values are floating point"
    )]
    pub fn samples(&self) -> Vec<Sample> {
        let mut samples = Vec::new();
        for series in &self.series {
            let sample = |name: String, value: f64| Sample {
                name,
                labels: series.labels.clone(),
                value,
            };
            match &series.data {
                AggregationData::Count(count) => {
                    samples.push(sample(self.name.clone(), *count as f64));
                }
                AggregationData::Sum(value) | AggregationData::LastValue(value) => {
                    samples.push(sample(self.name.clone(), *value));
                }
                AggregationData::Distribution(dist) => {
                    for (bound, cumulative) in dist.cumulative_buckets() {
                        let mut labels = series.labels.clone();
                        labels.push((BUCKET_LABEL.to_owned(), bucket_label(bound)));
                        samples.push(Sample {
                            name: format!("{}_bucket", self.name),
                            labels,
                            value: cumulative as f64,
                        });
                    }
                    samples.push(sample(format!("{}_sum", self.name), dist.sum));
                    samples.push(sample(format!("{}_count", self.name), dist.count as f64));
                }
            }
        }
        samples
    }

    fn to_proto(&self) -> proto::MetricFamily {
        let mut family = proto::MetricFamily::default();
        family.set_name(self.name.clone());
        family.set_help(self.help.clone());
        family.set_field_type(self.kind.to_proto());
        family.set_metric(
            self.series
                .iter()
                .map(Series::to_proto)
                .collect::<Vec<_>>()
                .into(),
        );
        family
    }
}

impl Series {
    #[expect(
        clippy::cast_precision_loss,
        reason = "exposition values are floating point"
    )]
    fn to_proto(&self) -> proto::Metric {
        let mut metric = proto::Metric::default();
        metric.set_label(
            self.labels
                .iter()
                .map(|(name, value)| {
                    let mut pair = proto::LabelPair::default();
                    pair.set_name(name.clone());
                    pair.set_value(value.clone());
                    pair
                })
                .collect::<Vec<_>>()
                .into(),
        );

        match &self.data {
            AggregationData::Count(count) => {
                let mut counter = proto::Counter::default();
                counter.set_value(*count as f64);
                metric.set_counter(counter);
            }
            AggregationData::Sum(sum) => {
                let mut untyped = proto::Untyped::default();
                untyped.set_value(*sum);
                metric.set_untyped(untyped);
            }
            AggregationData::LastValue(value) => {
                let mut gauge = proto::Gauge::default();
                gauge.set_value(*value);
                metric.set_gauge(gauge);
            }
            AggregationData::Distribution(dist) => {
                let mut histogram = proto::Histogram::default();
                histogram.set_sample_count(dist.count);
                histogram.set_sample_sum(dist.sum);
                // the encoder appends `+Inf` from the sample count
                histogram.set_bucket(
                    dist.cumulative_buckets()
                        .into_iter()
                        .filter(|(bound, _)| bound.is_finite())
                        .map(|(bound, cumulative)| {
                            let mut bucket = proto::Bucket::default();
                            bucket.set_upper_bound(bound);
                            bucket.set_cumulative_count(cumulative);
                            bucket
                        })
                        .collect::<Vec<_>>()
                        .into(),
                );
                metric.set_histogram(histogram);
            }
        }
        metric
    }
}

/// A tag combination whose values do not cover every tag key of its view.
///
/// Happens when callers record without setting all tags a view declares. The affected series is
/// withheld from the export; this diagnostic is reported instead.
#[derive(Debug, Clone, PartialEq, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[error("inconsistent label cardinality for `{metric}`: no value recorded for {missing:?}")]
pub struct CardinalityMismatch {
    /// External metric name.
    pub metric: String,
    /// Name of the view.
    pub view: String,
    /// The tag values that were supplied, in tag key order.
    pub labels: Vec<(String, Option<String>)>,
    /// Tag keys without a value.
    pub missing: Vec<String>,
}

/// Aggregated state of every registered view at one point in time.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ExportSnapshot {
    /// The namespace metric names were built with.
    pub namespace: String,
    /// When the snapshot was taken.
    pub collected_at: DateTime<Utc>,
    /// One family per registered view, sorted by name.
    pub metrics: Vec<MetricFamily>,
    /// Series withheld because of missing tag values.
    pub mismatches: Vec<CardinalityMismatch>,
}

impl ExportSnapshot {
    /// The family with the given external name.
    #[must_use]
    pub fn metric(&self, name: &str) -> Option<&MetricFamily> {
        self.metrics.iter().find(|family| family.name == name)
    }
}

/// Reads aggregated view state for the monitoring backend.
#[derive(Debug, Clone)]
pub struct Exporter {
    registry: Registry,
    namespace: String,
}

impl Exporter {
    /// An exporter naming metrics of `registry` under `namespace`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigureError::InvalidConfigurationValue`] if `namespace` is not a valid
    /// metric name prefix.
    pub fn new(registry: &Registry, namespace: impl Into<String>) -> Result<Self, ConfigureError> {
        let namespace = namespace.into();
        if !is_valid_label_name(&namespace) {
            return Err(ConfigureError::InvalidConfigurationValue {
                parameter: "namespace",
                value: namespace,
            });
        }
        Ok(Self {
            registry: registry.clone(),
            namespace,
        })
    }

    /// The namespace prefixed to every metric name.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The registry being exported.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The external metric name of `view`.
    #[must_use]
    pub fn metric_name(&self, view: &View) -> String {
        export_name(&self.namespace, view.name())
    }

    /// Snapshot every registered view.
    ///
    /// Safe to call while recording continues; each series is read consistently but the snapshot
    /// as a whole is not atomic.
    #[must_use]
    pub fn collect(&self) -> ExportSnapshot {
        let collected_at = Utc::now();
        let mut metrics = Vec::new();
        let mut mismatches = Vec::new();

        for view in self.registry.views() {
            let name = self.metric_name(&view);
            let mut series = Vec::new();

            for row in view.rows() {
                let missing: Vec<String> = row
                    .tags
                    .iter()
                    .filter(|(_, value)| value.is_none())
                    .map(|(key, _)| key.clone())
                    .collect();

                if missing.is_empty() {
                    series.push(Series {
                        labels: row
                            .tags
                            .into_iter()
                            .filter_map(|(key, value)| value.map(|value| (key, value)))
                            .collect(),
                        data: row.data,
                        last_updated: row.last_updated,
                    });
                } else {
                    let mismatch = CardinalityMismatch {
                        metric: name.clone(),
                        view: view.name().to_owned(),
                        labels: row.tags,
                        missing,
                    };
                    tracing::warn!(
                        metric = %mismatch.metric,
                        missing = ?mismatch.missing,
                        "series withheld from export: {mismatch}"
                    );
                    mismatches.push(mismatch);
                }
            }

            metrics.push(MetricFamily {
                view: view.name().to_owned(),
                help: view.description().to_owned(),
                unit: view.unit().to_owned(),
                kind: MetricKind::of(view.aggregation()),
                label_names: view.tag_keys().iter().map(|key| key.name().to_owned()).collect(),
                series,
                name,
            });
        }

        metrics.sort_by(|a, b| a.name.cmp(&b.name));

        ExportSnapshot {
            namespace: self.namespace.clone(),
            collected_at,
            metrics,
            mismatches,
        }
    }
}

/// Render a snapshot in the Prometheus text exposition format.
///
/// Families without any series are left out. Encoding failures are logged and yield an empty
/// string.
#[must_use]
pub fn encode_text(snapshot: &ExportSnapshot) -> String {
    let families: Vec<proto::MetricFamily> = snapshot
        .metrics
        .iter()
        .filter(|family| !family.series.is_empty())
        .map(MetricFamily::to_proto)
        .collect();

    let mut buffer = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&families, &mut buffer) {
        tracing::warn!(error = %e, "failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer)
        .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

/// The `le` label value of a bucket bound.
fn bucket_label(bound: f64) -> String {
    if bound.is_infinite() && bound.is_sign_positive() {
        "+Inf".to_owned()
    } else {
        bound.to_string()
    }
}
