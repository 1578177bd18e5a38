//! Publishing views through an OpenTelemetry [`Meter`].
//!
//! [`OtelBridge::install`] creates one observable instrument per registered view, named by the
//! exporter's naming scheme. Every time the meter provider collects, the instrument callbacks read
//! the current aggregated rows of their view:
//!
//! | Aggregation    | Instrument                       |
//! |----------------|----------------------------------|
//! | `Count`        | `u64` observable counter         |
//! | `Sum`          | `f64` observable up-down counter |
//! | `LastValue`    | `f64` observable gauge           |
//! | `Distribution` | not bridged                      |
//!
//! Rows missing any tag value are not observed, matching [`Exporter::collect`].
//!
//! ```rust
//! use backendapi_stats::{otel::OtelBridge, TagMap};
//! use opentelemetry::metrics::MeterProvider;
//!
//! fn bridge(provider: &impl MeterProvider) -> Result<(), Box<dyn std::error::Error>> {
//!     let stats = backendapi_stats::configure().finish()?;
//!     let bridge = OtelBridge::install(stats.exporter(), &provider.meter("backendapi"));
//!     assert_eq!(bridge.metrics().len(), 7);
//!     Ok(())
//! }
//! ```

use opentelemetry::{KeyValue, metrics::Meter};

use crate::{Aggregation, AggregationData, Exporter, MetricKind, Row, View};

/// The set of views published on a [`Meter`].
///
/// The instruments are owned by the meter provider, dropping this value does not unregister them.
#[derive(Debug, Clone, Default)]
pub struct OtelBridge {
    metrics: Vec<(String, MetricKind)>,
}

impl OtelBridge {
    /// Publish every view currently registered with the exporter's registry on `meter`.
    ///
    /// Views registered afterwards are not picked up; install once startup registration is done.
    #[must_use]
    pub fn install(exporter: &Exporter, meter: &Meter) -> Self {
        let mut metrics = Vec::new();

        for view in exporter.registry().views() {
            let name = exporter.metric_name(&view);
            let description = view.description().to_owned();
            let unit = view.unit().to_owned();

            let kind = match view.aggregation() {
                Aggregation::Count => {
                    meter
                        .u64_observable_counter(name.clone())
                        .with_description(description)
                        .with_unit(unit)
                        .with_callback(move |observer| {
                            for (attributes, data) in observable_rows(&view) {
                                if let AggregationData::Count(count) = data {
                                    observer.observe(count, &attributes);
                                }
                            }
                        })
                        .build();
                    MetricKind::Counter
                }
                Aggregation::Sum => {
                    meter
                        .f64_observable_up_down_counter(name.clone())
                        .with_description(description)
                        .with_unit(unit)
                        .with_callback(move |observer| {
                            for (attributes, data) in observable_rows(&view) {
                                if let AggregationData::Sum(sum) = data {
                                    observer.observe(sum, &attributes);
                                }
                            }
                        })
                        .build();
                    MetricKind::Untyped
                }
                Aggregation::LastValue => {
                    meter
                        .f64_observable_gauge(name.clone())
                        .with_description(description)
                        .with_unit(unit)
                        .with_callback(move |observer| {
                            for (attributes, data) in observable_rows(&view) {
                                if let AggregationData::LastValue(value) = data {
                                    observer.observe(value, &attributes);
                                }
                            }
                        })
                        .build();
                    MetricKind::Gauge
                }
                Aggregation::Distribution(_) => {
                    tracing::debug!(
                        metric = %name,
                        "distribution views are not published through opentelemetry"
                    );
                    continue;
                }
            };

            metrics.push((name, kind));
        }

        tracing::debug!(count = metrics.len(), "bridged views to opentelemetry");
        Self { metrics }
    }

    /// Names and kinds of the published metrics.
    #[must_use]
    pub fn metrics(&self) -> &[(String, MetricKind)] {
        &self.metrics
    }
}

fn observable_rows(view: &View) -> impl Iterator<Item = (Vec<KeyValue>, AggregationData)> {
    view.rows().into_iter().filter_map(|Row { tags, data, .. }| {
        let attributes = tags
            .into_iter()
            .map(|(key, value)| value.map(|value| KeyValue::new(key, value)))
            .collect::<Option<Vec<_>>>()?;
        Some((attributes, data))
    })
}
