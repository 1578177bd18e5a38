use std::{
    collections::{HashMap, hash_map::Entry},
    fmt,
    sync::{Arc, Mutex, PoisonError, RwLock},
};

use chrono::{DateTime, Utc};

use crate::{
    aggregation::{Aggregation, AggregationData},
    measure::{Measure, MeasureInner},
    tags::{TagKey, TagMap},
};

/// Definition of a view, passed to [`Registry::register_view`][crate::Registry::register_view].
#[must_use = "register the definition with `Registry::register_view`"]
pub struct ViewDefinition {
    pub(crate) name: String,
    pub(crate) description: Option<String>,
    pub(crate) measure: Arc<MeasureInner>,
    pub(crate) aggregation: Aggregation,
    pub(crate) tag_keys: Vec<TagKey>,
}

impl ViewDefinition {
    /// A view named `name` aggregating `measure` with `aggregation` and no tag keys.
    pub fn new<T>(name: impl Into<String>, measure: &Measure<T>, aggregation: Aggregation) -> Self {
        Self {
            name: name.into(),
            description: None,
            measure: Arc::clone(&measure.inner),
            aggregation,
            tag_keys: Vec::new(),
        }
    }

    /// Set the description, exported as the metric's HELP text.
    ///
    /// Defaults to the measure description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the tag keys, in label order. These are exactly the dimensions recorded for the view.
    pub fn with_tag_keys<'a>(mut self, tag_keys: impl IntoIterator<Item = &'a TagKey>) -> Self {
        self.tag_keys = tag_keys.into_iter().cloned().collect();
        self
    }
}

/// Projected tag values, in the order of the view's tag keys. `None` marks a missing tag.
pub(crate) type TagValues = Box<[Option<Arc<str>>]>;

struct Cell {
    data: AggregationData,
    last_updated: DateTime<Utc>,
}

/// A registered view together with its aggregation state.
pub(crate) struct ViewState {
    pub(crate) name: String,
    pub(crate) description: String,
    pub(crate) measure_name: String,
    pub(crate) unit: String,
    pub(crate) aggregation: Aggregation,
    pub(crate) tag_keys: Vec<TagKey>,
    /// One cell per distinct tag combination; the map lock is only held to find or insert cells.
    cells: RwLock<HashMap<TagValues, Arc<Mutex<Cell>>>>,
}

impl ViewState {
    pub(crate) fn new(definition: ViewDefinition) -> Self {
        let ViewDefinition {
            name,
            description,
            measure,
            aggregation,
            tag_keys,
        } = definition;
        Self {
            description: description.unwrap_or_else(|| measure.description.clone()),
            name,
            measure_name: measure.name.clone(),
            unit: measure.unit.clone(),
            aggregation,
            tag_keys,
            cells: RwLock::new(HashMap::new()),
        }
    }

    fn project(&self, tags: &TagMap) -> TagValues {
        self.tag_keys.iter().map(|key| tags.get_shared(key)).collect()
    }

    /// Fold one recorded value into the cell for the projected tags.
    pub(crate) fn fold(&self, value: f64, tags: &TagMap, timestamp: DateTime<Utc>) {
        let key = self.project(tags);

        let existing = self
            .cells
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned();

        let cell = match existing {
            Some(cell) => cell,
            None => {
                let mut cells = self.cells.write().unwrap_or_else(PoisonError::into_inner);
                match cells.entry(key) {
                    Entry::Occupied(entry) => Arc::clone(entry.get()),
                    Entry::Vacant(entry) => {
                        entry.insert(Arc::new(Mutex::new(Cell {
                            data: AggregationData::first(&self.aggregation, value),
                            last_updated: timestamp,
                        })));
                        return;
                    }
                }
            }
        };

        let mut cell = cell.lock().unwrap_or_else(PoisonError::into_inner);
        cell.data.fold(value);
        if timestamp > cell.last_updated {
            cell.last_updated = timestamp;
        }
    }

    /// Copy out every tag combination, sorted by tag values.
    pub(crate) fn rows(&self) -> Vec<(TagValues, AggregationData, DateTime<Utc>)> {
        let cells: Vec<_> = self
            .cells
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(key, cell)| (key.clone(), Arc::clone(cell)))
            .collect();

        let mut rows: Vec<_> = cells
            .into_iter()
            .map(|(key, cell)| {
                // one lock per cell, so count and sum of a distribution are read together
                let cell = cell.lock().unwrap_or_else(PoisonError::into_inner);
                (key, cell.data.clone(), cell.last_updated)
            })
            .collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        rows
    }
}

/// A registered view: a named aggregation of a measure over a fixed set of tag keys.
///
/// This is the unit which becomes an exported metric.
#[derive(Clone)]
pub struct View {
    pub(crate) state: Arc<ViewState>,
}

/// Aggregated state of a [`View`] for one tag combination.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Tag key names paired with their values, in the view's tag key order.
    ///
    /// A `None` value means records for this combination did not supply that tag.
    pub tags: Vec<(String, Option<String>)>,
    /// The accumulated value(s).
    pub data: AggregationData,
    /// Arrival time of the most recent record folded into this row.
    pub last_updated: DateTime<Utc>,
}

impl View {
    /// The view name, e.g. `backend/assignments`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.state.name
    }

    /// The view description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.state.description
    }

    /// Name of the aggregated measure.
    #[must_use]
    pub fn measure_name(&self) -> &str {
        &self.state.measure_name
    }

    /// Unit of the aggregated measure.
    #[must_use]
    pub fn unit(&self) -> &str {
        &self.state.unit
    }

    /// The aggregation policy.
    #[must_use]
    pub fn aggregation(&self) -> &Aggregation {
        &self.state.aggregation
    }

    /// The declared tag keys, in label order.
    #[must_use]
    pub fn tag_keys(&self) -> &[TagKey] {
        &self.state.tag_keys
    }

    /// A snapshot of every tag combination recorded so far, sorted by tag values.
    #[must_use]
    pub fn rows(&self) -> Vec<Row> {
        self.state
            .rows()
            .into_iter()
            .map(|(values, data, last_updated)| Row {
                tags: self
                    .state
                    .tag_keys
                    .iter()
                    .zip(values.iter())
                    .map(|(key, value)| (key.name().to_owned(), value.as_deref().map(str::to_owned)))
                    .collect(),
                data,
                last_updated,
            })
            .collect()
    }

    /// The row for the given tag values (in tag key order), if anything was recorded for it.
    #[must_use]
    pub fn row(&self, tag_values: &[&str]) -> Option<Row> {
        self.rows().into_iter().find(|row| {
            row.tags.len() == tag_values.len()
                && row
                    .tags
                    .iter()
                    .zip(tag_values)
                    .all(|((_, value), expected)| value.as_deref() == Some(*expected))
        })
    }
}

impl PartialEq for View {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View")
            .field("name", &self.state.name)
            .field("measure", &self.state.measure_name)
            .field("aggregation", &self.state.aggregation)
            .field("tag_keys", &self.state.tag_keys)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::measure::Measure;

    fn value(s: &str) -> Option<Arc<str>> {
        Some(Arc::from(s))
    }

    fn view_state(aggregation: Aggregation, tag_keys: &[TagKey]) -> ViewState {
        let measure = Measure::<i64>::new(1, "m".into(), "the measure".into(), "1".into());
        ViewState::new(ViewDefinition::new("v", &measure, aggregation).with_tag_keys(tag_keys))
    }

    #[test]
    fn test_description_defaults_to_measure() {
        let state = view_state(Aggregation::Count, &[]);
        assert_eq!(state.description, "the measure");
    }

    #[test]
    fn test_projection_drops_undeclared_and_marks_missing() {
        let method = TagKey::new(1, "method".into());
        let severity = TagKey::new(1, "severity".into());
        let other = TagKey::new(1, "other".into());
        let state = view_state(Aggregation::Count, &[method.clone(), severity]);

        let now = Utc::now();
        state.fold(1.0, &TagMap::new().with(&method, "a").with(&other, "x"), now);
        state.fold(1.0, &TagMap::new().with(&method, "a"), now);

        let rows = state.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0.to_vec(), vec![value("a"), None]);
        assert_eq!(rows[0].1, AggregationData::Count(2));
    }

    #[test]
    fn test_rows_sorted_by_tag_values() {
        let method = TagKey::new(1, "method".into());
        let state = view_state(Aggregation::Sum, &[method.clone()]);
        let now = Utc::now();
        for name in ["c", "a", "b"] {
            state.fold(2.0, &TagMap::new().with(&method, name), now);
        }
        let order: Vec<_> = state
            .rows()
            .into_iter()
            .map(|(values, _, _)| values[0].clone())
            .collect();
        assert_eq!(order, vec![value("a"), value("b"), value("c")]);
    }
}
