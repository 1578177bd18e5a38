//! # Backend API stats
//!
//! Measurement and export layer for the backend API's operational counters. Call sites record
//! typed numeric events tagged with low-cardinality dimensions; registered views fold those events
//! into aggregated series which an exporter names with a Prometheus-compatible scheme.
//!
//! The building blocks, leaf first:
//!   - [`Measure`]: a named, typed, unit-annotated quantity.
//!   - [`TagKey`]: a named dimension used to partition measurements.
//!   - [`View`]: binds a measure to an [`Aggregation`] and a set of tag keys. Views are what
//!     become exported metrics.
//!   - [`Registry`]: owns all of the above and their aggregation state.
//!   - [`Recorder`]: the call-site API, see [`Recorder::record`].
//!   - [`Exporter`]: reads aggregated state and applies the naming transform in
//!     [`export::export_name`].
//!
//! # Usage
//!
//! ```rust
//! use backendapi_stats::{Aggregation, Registry, TagMap, ViewDefinition};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = Registry::new();
//!
//!     let requests = registry.register_measure::<i64>(
//!         "backendapi/requests_total",
//!         "Number of backend API requests",
//!         "1",
//!     )?;
//!     let method = registry.register_tag_key("method")?;
//!     registry.register_view(
//!         ViewDefinition::new("requests", &requests, Aggregation::Count).with_tag_keys([&method]),
//!     )?;
//!
//!     let recorder = registry.recorder();
//!     recorder.record(&requests, 1, &TagMap::new().with(&method, "FetchMatches"));
//!
//!     let exporter = backendapi_stats::Exporter::new(&registry, "open_match")?;
//!     let snapshot = exporter.collect();
//!     assert_eq!(snapshot.metrics[0].name, "open_match_requests");
//!     Ok(())
//! }
//! ```
//!
//! Most services will instead call [`configure()`] once at startup, which builds a registry with
//! the [standard backend API views][BackendApiStats] and an exporter for the configured namespace.
//!
//! ## Configuration
//!
//! - `BACKENDAPI_STATS_NAMESPACE` - the export namespace, `open_match` by default.
//! - `BACKENDAPI_STATS_DEFAULT_VIEWS` - set to `false` to skip registering the default views.
//!
//! ## Integrations
//!
//! - [`LogLinesLayer`] and [`LogLinesLogger`] count `tracing` events and `log` records on the
//!   log lines view.
//! - [`otel::OtelBridge`] publishes views through an OpenTelemetry meter.

use thiserror::Error;

use crate::config::StatsConfigBuilder;

mod aggregation;
mod backend;
mod bridges;
pub mod config;
pub mod export;
mod measure;
pub mod otel;
mod recorder;
mod registry;
mod stats;
mod tags;
mod view;

mod internal;

pub use crate::aggregation::{Aggregation, AggregationData, BucketBoundaries, DistributionData};
pub use crate::backend::BackendApiStats;
pub use crate::bridges::{log::LogLinesLogger, tracing::LogLinesLayer};
pub use crate::export::{CardinalityMismatch, ExportSnapshot, Exporter, MetricFamily, MetricKind};
pub use crate::measure::{Measure, MeasureValue};
pub use crate::recorder::Recorder;
pub use crate::registry::Registry;
pub use crate::stats::BackendStats;
pub use crate::tags::{RESERVED_LABELS, TagKey, TagMap};
pub use crate::view::{Row, View, ViewDefinition};

/// The kind of entity a name belongs to, used in registration errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    /// A [`Measure`].
    Measure,
    /// A [`TagKey`].
    TagKey,
    /// A [`View`].
    View,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Measure => write!(f, "measure"),
            EntityKind::TagKey => write!(f, "tag key"),
            EntityKind::View => write!(f, "view"),
        }
    }
}

/// An error which may arise when registering measures, tag keys or views.
///
/// These are wiring defects: they are deterministic and should abort startup.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum RegistrationError {
    /// The name is already registered for this kind of entity.
    #[error("{kind} `{name}` is already registered")]
    DuplicateName {
        /// The kind of entity being registered.
        kind: EntityKind,
        /// The duplicated name.
        name: String,
    },

    /// A view references a measure which this registry does not know.
    #[error("view `{view}` references unknown measure `{measure}`")]
    UnknownMeasure {
        /// The view being registered.
        view: String,
        /// The unknown measure.
        measure: String,
    },

    /// A view references a tag key which this registry does not know.
    #[error("view `{view}` references unknown tag key `{tag_key}`")]
    UnknownTagKey {
        /// The view being registered.
        view: String,
        /// The unknown tag key.
        tag_key: String,
    },

    /// The tag key collides with a label added by the scraping infrastructure.
    #[error("tag key `{name}` collides with a reserved label")]
    ReservedTagKey {
        /// The rejected tag key name.
        name: String,
    },

    /// The name is not valid for this kind of entity.
    #[error("invalid {kind} name `{name}`")]
    InvalidName {
        /// The kind of entity being registered.
        kind: EntityKind,
        /// The rejected name.
        name: String,
    },

    /// Distribution bucket boundaries are unusable.
    #[error("invalid bucket boundaries: {0}")]
    InvalidBuckets(&'static str),

    /// A view lists the same tag key more than once.
    #[error("view `{view}` lists tag key `{tag_key}` more than once")]
    DuplicateViewTagKey {
        /// The view being registered.
        view: String,
        /// The repeated tag key.
        tag_key: String,
    },

    /// Two view names would be exported under the same metric name.
    #[error("view `{view}` would be exported under the same name as view `{existing}`")]
    ExportNameCollision {
        /// The view being registered.
        view: String,
        /// The already registered view.
        existing: String,
    },
}

/// An error which may arise when configuring the backend API stats.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigureError {
    /// A configuration value (from environment) was invalid.
    #[error("Invalid configuration value for {parameter}: {value}")]
    InvalidConfigurationValue {
        /// The name of the configuration parameter.
        parameter: &'static str,
        /// The invalid value passed for the parameter.
        value: String,
    },

    /// Registering the default views failed.
    #[error("Error registering the default views: {0}")]
    Registration(#[from] RegistrationError),

    /// Error installing the `log` bridge as the global logger.
    #[error("Error configuring the global logger: {0}")]
    Logging(#[from] log::SetLoggerError),

    /// Any other error.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Main entry point to configure the backend API stats.
///
/// This should be called once at the start of the program.
///
/// See [`StatsConfigBuilder`] for the full set of configuration options.
///
/// # Example
///
/// ```rust
/// use backendapi_stats::TagMap;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let stats = backendapi_stats::configure()
///         .with_namespace("open_match")
///         .finish()?;
///
///     let backend = stats.backend().expect("default views are enabled");
///     stats.recorder().record(&backend.failures, 1, &TagMap::new());
///
///     let text = backendapi_stats::export::encode_text(&stats.exporter().collect());
///     assert!(text.contains("open_match_failures 1"));
///     Ok(())
/// }
/// ```
pub fn configure() -> StatsConfigBuilder {
    StatsConfigBuilder::default()
}

#[cfg(test)]
mod test_utils;
