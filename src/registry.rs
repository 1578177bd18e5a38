use std::{
    collections::{BTreeMap, HashMap, HashSet},
    fmt,
    sync::{
        Arc, PoisonError, RwLock,
        atomic::{AtomicU64, Ordering},
    },
};

use crate::{
    EntityKind, RegistrationError,
    export::flatten_view_name,
    internal::names::{is_valid_label_name, is_valid_path_name},
    measure::{Measure, MeasureInner, MeasureValue},
    recorder::Recorder,
    tags::{BUCKET_LABEL, RESERVED_LABELS, TagKey},
    view::{View, ViewDefinition, ViewState},
};

static NEXT_REGISTRY_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide owner of all measures, tag keys and views, and of their aggregation state.
///
/// Construct one at startup and hand clones (which share state) to the code that records or
/// exports. Registration takes a coarse lock and is meant to finish before steady-state
/// recording starts; a view registered while its measure is being recorded may miss records
/// in flight.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    id: u64,
    state: RwLock<RegistryState>,
}

#[derive(Default)]
struct RegistryState {
    measures: HashMap<String, Arc<MeasureInner>>,
    tag_keys: HashMap<String, TagKey>,
    views: BTreeMap<String, View>,
    /// Flattened view name -> view name, to catch views which would export under the same name.
    export_names: HashMap<String, String>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// An empty registry, independent of every other registry in the process.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                id: NEXT_REGISTRY_ID.fetch_add(1, Ordering::Relaxed),
                state: RwLock::new(RegistryState::default()),
            }),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.inner.id
    }

    /// A handle for recording against this registry's measures.
    #[must_use]
    pub fn recorder(&self) -> Recorder {
        Recorder::new(self.clone())
    }

    /// Declare a measure recording values of type `T`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::DuplicateName`] if a measure with this name exists, or
    /// [`RegistrationError::InvalidName`] if `name` is not a `/` separated identifier path.
    pub fn register_measure<T: MeasureValue>(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
        unit: impl Into<String>,
    ) -> Result<Measure<T>, RegistrationError> {
        let name = name.into();
        if !is_valid_path_name(&name) {
            return Err(RegistrationError::InvalidName {
                kind: EntityKind::Measure,
                name,
            });
        }

        let mut state = self.write_state();
        if state.measures.contains_key(&name) {
            return Err(RegistrationError::DuplicateName {
                kind: EntityKind::Measure,
                name,
            });
        }

        let measure = Measure::<T>::new(self.id(), name.clone(), description.into(), unit.into());
        state.measures.insert(name, Arc::clone(&measure.inner));
        tracing::debug!(measure = measure.name(), value_type = T::TYPE_NAME, "registered measure");
        Ok(measure)
    }

    /// Declare a tag key.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::ReservedTagKey`] if `name` is one of the
    /// [`RESERVED_LABELS`] (or the histogram bucket label `le`),
    /// [`RegistrationError::InvalidName`] if it is not a valid label name, or
    /// [`RegistrationError::DuplicateName`] if it is already registered.
    pub fn register_tag_key(&self, name: impl Into<String>) -> Result<TagKey, RegistrationError> {
        let name = name.into();
        if RESERVED_LABELS.contains(&name.as_str()) || name == BUCKET_LABEL {
            return Err(RegistrationError::ReservedTagKey { name });
        }
        if !is_valid_label_name(&name) {
            return Err(RegistrationError::InvalidName {
                kind: EntityKind::TagKey,
                name,
            });
        }

        let mut state = self.write_state();
        if state.tag_keys.contains_key(&name) {
            return Err(RegistrationError::DuplicateName {
                kind: EntityKind::TagKey,
                name,
            });
        }

        let key = TagKey::new(self.id(), name.clone());
        state.tag_keys.insert(name, key.clone());
        tracing::debug!(tag_key = key.name(), "registered tag key");
        Ok(key)
    }

    /// Register a view, subscribing it to records of its measure.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::UnknownMeasure`] or [`RegistrationError::UnknownTagKey`] if
    /// the definition references handles this registry did not create,
    /// [`RegistrationError::DuplicateName`] or [`RegistrationError::ExportNameCollision`] on
    /// name clashes, [`RegistrationError::DuplicateViewTagKey`] if a tag key is repeated, and
    /// [`RegistrationError::InvalidName`] for a malformed name.
    pub fn register_view(&self, definition: ViewDefinition) -> Result<View, RegistrationError> {
        if !is_valid_path_name(&definition.name) {
            return Err(RegistrationError::InvalidName {
                kind: EntityKind::View,
                name: definition.name,
            });
        }

        let mut state = self.write_state();

        let measure_known = definition.measure.registry_id == self.id()
            && state
                .measures
                .get(&definition.measure.name)
                .is_some_and(|known| Arc::ptr_eq(known, &definition.measure));
        if !measure_known {
            return Err(RegistrationError::UnknownMeasure {
                view: definition.name,
                measure: definition.measure.name.clone(),
            });
        }

        let mut seen = HashSet::new();
        for key in &definition.tag_keys {
            if key.registry_id() != self.id() {
                return Err(RegistrationError::UnknownTagKey {
                    view: definition.name,
                    tag_key: key.name().to_owned(),
                });
            }
            if !seen.insert(key) {
                return Err(RegistrationError::DuplicateViewTagKey {
                    view: definition.name,
                    tag_key: key.name().to_owned(),
                });
            }
        }

        if state.views.contains_key(&definition.name) {
            return Err(RegistrationError::DuplicateName {
                kind: EntityKind::View,
                name: definition.name,
            });
        }
        let export_name = flatten_view_name(&definition.name);
        if let Some(existing) = state.export_names.get(&export_name) {
            return Err(RegistrationError::ExportNameCollision {
                view: definition.name,
                existing: existing.clone(),
            });
        }

        let measure = Arc::clone(&definition.measure);
        let view_state = Arc::new(ViewState::new(definition));
        measure.subscribe(Arc::clone(&view_state));

        let view = View { state: view_state };
        state
            .export_names
            .insert(export_name, view.name().to_owned());
        state.views.insert(view.name().to_owned(), view.clone());
        tracing::debug!(
            view = view.name(),
            measure = view.measure_name(),
            aggregation = ?view.aggregation(),
            "registered view"
        );
        Ok(view)
    }

    /// All registered views, sorted by name.
    #[must_use]
    pub fn views(&self) -> Vec<View> {
        self.read_state().views.values().cloned().collect()
    }

    /// Look up a registered view by name.
    #[must_use]
    pub fn view(&self, name: &str) -> Option<View> {
        self.read_state().views.get(name).cloned()
    }

    /// Look up a registered tag key by name.
    #[must_use]
    pub fn tag_key(&self, name: &str) -> Option<TagKey> {
        self.read_state().tag_keys.get(name).cloned()
    }

    /// Whether a measure with this name is registered.
    #[must_use]
    pub fn has_measure(&self, name: &str) -> bool {
        self.read_state().measures.contains_key(name)
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, RegistryState> {
        self.inner.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, RegistryState> {
        self.inner.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.read_state();
        f.debug_struct("Registry")
            .field("id", &self.inner.id)
            .field("measures", &state.measures.len())
            .field("tag_keys", &state.tag_keys.len())
            .field("views", &state.views.keys().collect::<Vec<_>>())
            .finish()
    }
}
