use std::{
    fmt,
    marker::PhantomData,
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard},
};

use crate::view::ViewState;

mod sealed {
    pub trait Sealed {}

    impl Sealed for i64 {}
    impl Sealed for f64 {}
}

/// Numeric types which can be recorded against a [`Measure`].
///
/// Implemented for `i64` and `f64`.
pub trait MeasureValue: sealed::Sealed + Copy + Send + Sync + 'static {
    /// Human readable name of the value type.
    const TYPE_NAME: &'static str;

    /// Converts the value into the representation used for aggregation.
    fn to_f64(self) -> f64;
}

impl MeasureValue for i64 {
    const TYPE_NAME: &'static str = "int64";

    #[expect(
        clippy::cast_precision_loss,
        reason = "counters stay far below 2^53 in practice"
    )]
    fn to_f64(self) -> f64 {
        self as f64
    }
}

impl MeasureValue for f64 {
    const TYPE_NAME: &'static str = "float64";

    fn to_f64(self) -> f64 {
        self
    }
}

/// A named, typed, unit-annotated quantity which can be recorded.
///
/// Created with [`Registry::register_measure`][crate::Registry::register_measure]; the handle is
/// cheap to clone and immutable.
pub struct Measure<T> {
    pub(crate) inner: Arc<MeasureInner>,
    _value: PhantomData<fn(T)>,
}

pub(crate) struct MeasureInner {
    pub(crate) registry_id: u64,
    pub(crate) name: String,
    pub(crate) description: String,
    pub(crate) unit: String,
    pub(crate) type_name: &'static str,
    /// Views folding records of this measure.
    subscribers: RwLock<Vec<Arc<ViewState>>>,
}

impl<T: MeasureValue> Measure<T> {
    pub(crate) fn new(registry_id: u64, name: String, description: String, unit: String) -> Self {
        Self {
            inner: Arc::new(MeasureInner {
                registry_id,
                name,
                description,
                unit,
                type_name: T::TYPE_NAME,
                subscribers: RwLock::new(Vec::new()),
            }),
            _value: PhantomData,
        }
    }
}

impl<T> Measure<T> {
    /// The measure name, e.g. `backendapi/requests_total`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The measure description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.inner.description
    }

    /// The measure unit, e.g. `1` or `ms`.
    #[must_use]
    pub fn unit(&self) -> &str {
        &self.inner.unit
    }
}

impl MeasureInner {
    pub(crate) fn subscribers(&self) -> RwLockReadGuard<'_, Vec<Arc<ViewState>>> {
        self.subscribers.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn subscribe(&self, view: Arc<ViewState>) {
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(view);
    }
}

impl<T> Clone for Measure<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            _value: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Measure<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Measure")
            .field("name", &self.inner.name)
            .field("type", &self.inner.type_name)
            .field("unit", &self.inner.unit)
            .finish_non_exhaustive()
    }
}
