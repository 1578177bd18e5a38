use std::{
    collections::BTreeMap,
    fmt,
    hash::{Hash, Hasher},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

/// Labels injected by the scraping infrastructure.
///
/// The k8s pod being monitored contributes `pod` and `namespace`; the way Prometheus gathers the
/// metrics contributes `instance` (scraped address), `job` (scraped service) and `endpoint`
/// (scraped port name). Tag keys must not shadow any of them.
pub const RESERVED_LABELS: [&str; 5] = ["pod", "namespace", "instance", "job", "endpoint"];

/// Label carrying the upper bound of histogram bucket series.
pub(crate) const BUCKET_LABEL: &str = "le";

static NEXT_TAG_KEY_ID: AtomicU64 = AtomicU64::new(1);

/// A named dimension used to partition recorded values.
///
/// Only [`Registry::register_tag_key`][crate::Registry::register_tag_key] creates tag keys, so a
/// [`TagMap`] can only ever hold registered keys.
#[derive(Clone)]
pub struct TagKey {
    inner: Arc<TagKeyInner>,
}

struct TagKeyInner {
    id: u64,
    registry_id: u64,
    name: String,
}

impl TagKey {
    pub(crate) fn new(registry_id: u64, name: String) -> Self {
        Self {
            inner: Arc::new(TagKeyInner {
                id: NEXT_TAG_KEY_ID.fetch_add(1, Ordering::Relaxed),
                registry_id,
                name,
            }),
        }
    }

    /// The tag key name, which is also the exported label name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub(crate) fn registry_id(&self) -> u64 {
        self.inner.registry_id
    }

    fn id(&self) -> u64 {
        self.inner.id
    }
}

impl PartialEq for TagKey {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for TagKey {}

impl Hash for TagKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl fmt::Debug for TagKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TagKey").field(&self.inner.name).finish()
    }
}

/// Concrete tag values supplied with a record, keyed by registered [`TagKey`] handles.
///
/// Keys which a view does not declare are ignored by that view; keys a view declares but which
/// are absent here surface as cardinality mismatches at export time.
#[derive(Clone, Default)]
pub struct TagMap {
    values: BTreeMap<u64, (TagKey, Arc<str>)>,
}

impl TagMap {
    /// An empty tag map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key` to `value`, replacing any previous value.
    pub fn insert(&mut self, key: &TagKey, value: impl Into<Arc<str>>) {
        self.values.insert(key.id(), (key.clone(), value.into()));
    }

    /// Builder form of [`insert`][Self::insert].
    #[must_use]
    pub fn with(mut self, key: &TagKey, value: impl Into<Arc<str>>) -> Self {
        self.insert(key, value);
        self
    }

    /// The value for `key`, if present.
    #[must_use]
    pub fn get(&self, key: &TagKey) -> Option<&str> {
        self.values.get(&key.id()).map(|(_, value)| &**value)
    }

    pub(crate) fn get_shared(&self, key: &TagKey) -> Option<Arc<str>> {
        self.values.get(&key.id()).map(|(_, value)| Arc::clone(value))
    }

    /// Number of tags in the map.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the map is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for TagMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.values.values().map(|(key, value)| (key.name(), value)))
            .finish()
    }
}
