#![allow(dead_code)] // used by lib and test suites individually

use std::{collections::BTreeMap, sync::Arc};

use opentelemetry::KeyValue;
use opentelemetry_sdk::{
    error::OTelSdkResult,
    metrics::{
        InstrumentKind, ManualReader, Pipeline, SdkMeterProvider, Temporality,
        data::{AggregatedMetrics, MetricData, ResourceMetrics},
        reader::MetricReader,
    },
};

/// A `ManualReader` which can be handed to a meter provider while the test keeps a handle to
/// trigger collection.
#[derive(Debug, Clone)]
pub struct SharedManualReader {
    reader: Arc<ManualReader>,
}

impl SharedManualReader {
    pub fn new(reader: ManualReader) -> Self {
        Self {
            reader: Arc::new(reader),
        }
    }

    /// A cumulative reader together with a provider reading through it.
    pub fn with_provider() -> (Self, SdkMeterProvider) {
        let reader = Self::new(ManualReader::builder().build());
        let provider = SdkMeterProvider::builder()
            .with_reader(reader.clone())
            .build();
        (reader, provider)
    }

    pub fn collect_now(&self) -> ResourceMetrics {
        let mut metrics = ResourceMetrics::default();
        self.reader.collect(&mut metrics).unwrap();
        metrics
    }
}

impl MetricReader for SharedManualReader {
    fn register_pipeline(&self, pipeline: std::sync::Weak<Pipeline>) {
        self.reader.register_pipeline(pipeline);
    }

    fn collect(&self, rm: &mut ResourceMetrics) -> OTelSdkResult {
        self.reader.collect(rm)
    }

    fn force_flush(&self) -> OTelSdkResult {
        self.reader.force_flush()
    }

    fn shutdown(&self) -> OTelSdkResult {
        self.reader.shutdown()
    }

    fn shutdown_with_timeout(&self, timeout: std::time::Duration) -> OTelSdkResult {
        self.reader.shutdown_with_timeout(timeout)
    }

    fn temporality(&self, kind: InstrumentKind) -> Temporality {
        self.reader.temporality(kind)
    }
}

/// One data point of a collected metric, with attributes sorted by key.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservedPoint {
    pub attributes: Vec<(String, String)>,
    pub value: f64,
}

/// The sum and gauge data points of `metrics`, keyed by metric name.
///
/// The otel SDK (as of version 0.30) exposes no way to build the data types for comparison, so
/// this flattens them into plain values. Points are sorted by attributes.
#[expect(clippy::cast_precision_loss)]
pub fn observed_points(metrics: &ResourceMetrics) -> BTreeMap<String, Vec<ObservedPoint>> {
    let mut observed = BTreeMap::new();
    for scope_metrics in metrics.scope_metrics() {
        for metric in scope_metrics.metrics() {
            let mut points: Vec<ObservedPoint> = match metric.data() {
                AggregatedMetrics::U64(MetricData::Sum(sum)) => sum
                    .data_points()
                    .map(|dp| point(dp.attributes(), dp.value() as f64))
                    .collect(),
                AggregatedMetrics::F64(MetricData::Sum(sum)) => sum
                    .data_points()
                    .map(|dp| point(dp.attributes(), dp.value()))
                    .collect(),
                AggregatedMetrics::F64(MetricData::Gauge(gauge)) => gauge
                    .data_points()
                    .map(|dp| point(dp.attributes(), dp.value()))
                    .collect(),
                _ => continue,
            };
            points.sort_by(|a, b| a.attributes.cmp(&b.attributes));
            observed.insert(metric.name().to_owned(), points);
        }
    }
    observed
}

fn point<'a>(attributes: impl Iterator<Item = &'a KeyValue>, value: f64) -> ObservedPoint {
    let mut attributes: Vec<(String, String)> = attributes
        .map(|kv| (kv.key.as_str().to_owned(), kv.value.as_str().into_owned()))
        .collect();
    attributes.sort();
    ObservedPoint { attributes, value }
}

/// Owned `(key, value)` label pairs, for comparing against exported series.
pub fn labels(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
        .collect()
}
