use chrono::Utc;

use crate::{
    aggregation::Aggregation,
    measure::{Measure, MeasureValue},
    registry::Registry,
    tags::TagMap,
};

/// The call-site API for recording measurements.
///
/// Obtained from [`Registry::recorder`]. Cheap to clone and safe to share across threads.
#[derive(Clone, Debug)]
pub struct Recorder {
    registry: Registry,
}

impl Recorder {
    pub(crate) fn new(registry: Registry) -> Self {
        Self { registry }
    }

    /// Record `value` against `measure`, tagged with `tags`.
    ///
    /// For every view of `measure`, `tags` is projected down to exactly that view's tag keys and
    /// `value` is folded into the aggregation for the resulting tag combination. Tags a view
    /// declares but `tags` omits are left missing, to be reported when exporting.
    ///
    /// This never fails and never blocks on I/O. Measures belonging to another registry are
    /// dropped. Non-finite values still count towards count views but are not folded into any
    /// other aggregation.
    pub fn record<T: MeasureValue>(&self, measure: &Measure<T>, value: T, tags: &TagMap) {
        if measure.inner.registry_id != self.registry.id() {
            tracing::debug!(
                measure = measure.name(),
                "dropping record for a measure from another registry"
            );
            return;
        }

        let value = value.to_f64();
        let finite = value.is_finite();
        let timestamp = Utc::now();
        for view in measure.inner.subscribers().iter() {
            if !finite && view.aggregation != Aggregation::Count {
                tracing::debug!(
                    measure = measure.name(),
                    view = %view.name,
                    value,
                    "skipping non-finite value"
                );
                continue;
            }
            view.fold(value, tags, timestamp);
        }
    }

    /// The registry this recorder records into.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use crate::{Aggregation, AggregationData, Registry, TagMap, ViewDefinition};

    #[test]
    fn test_record_without_views_is_noop() {
        let registry = Registry::new();
        let measure = registry.register_measure::<i64>("m", "", "1").unwrap();
        registry.recorder().record(&measure, 1, &TagMap::new());
        assert!(registry.views().is_empty());
    }

    #[test]
    fn test_foreign_measure_is_dropped() {
        let registry = Registry::new();
        let other = Registry::new();
        let measure = other.register_measure::<i64>("m", "", "1").unwrap();
        let view = other
            .register_view(ViewDefinition::new("v", &measure, Aggregation::Count))
            .unwrap();

        registry.recorder().record(&measure, 1, &TagMap::new());
        assert!(view.rows().is_empty());

        other.recorder().record(&measure, 1, &TagMap::new());
        assert_eq!(view.rows()[0].data, AggregationData::Count(1));
    }

    #[test]
    fn test_non_finite_values_skip_sum_views() {
        let registry = Registry::new();
        let measure = registry.register_measure::<f64>("m", "", "ms").unwrap();
        let view = registry
            .register_view(ViewDefinition::new("v", &measure, Aggregation::Sum))
            .unwrap();
        let recorder = registry.recorder();
        recorder.record(&measure, f64::NAN, &TagMap::new());
        recorder.record(&measure, f64::INFINITY, &TagMap::new());
        assert!(view.rows().is_empty());

        recorder.record(&measure, 2.5, &TagMap::new());
        assert_eq!(view.rows()[0].data, AggregationData::Sum(2.5));
    }

    #[test]
    fn test_non_finite_values_are_counted() {
        let registry = Registry::new();
        let measure = registry.register_measure::<f64>("m", "", "ms").unwrap();
        let count = registry
            .register_view(ViewDefinition::new("count", &measure, Aggregation::Count))
            .unwrap();
        let last = registry
            .register_view(ViewDefinition::new("last", &measure, Aggregation::LastValue))
            .unwrap();
        let recorder = registry.recorder();

        recorder.record(&measure, 1.0, &TagMap::new());
        recorder.record(&measure, f64::NAN, &TagMap::new());
        recorder.record(&measure, f64::INFINITY, &TagMap::new());

        assert_eq!(count.rows()[0].data, AggregationData::Count(3));
        assert_eq!(last.rows()[0].data, AggregationData::LastValue(1.0));
    }

    #[test]
    fn test_one_record_feeds_every_view() {
        let registry = Registry::new();
        let measure = registry.register_measure::<i64>("m", "", "1").unwrap();
        let count = registry
            .register_view(ViewDefinition::new("count", &measure, Aggregation::Count))
            .unwrap();
        let sum = registry
            .register_view(ViewDefinition::new("sum", &measure, Aggregation::Sum))
            .unwrap();

        let recorder = registry.recorder();
        recorder.record(&measure, 5, &TagMap::new());
        recorder.record(&measure, 7, &TagMap::new());

        assert_eq!(count.rows()[0].data, AggregationData::Count(2));
        assert_eq!(sum.rows()[0].data, AggregationData::Sum(12.0));
    }
}
