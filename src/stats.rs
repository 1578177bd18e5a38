use std::collections::HashMap;

use crate::{
    BackendApiStats, ConfigureError, Exporter, LogLinesLayer, LogLinesLogger, Recorder, Registry,
    config::{BACKENDAPI_STATS_DEFAULT_VIEWS, BACKENDAPI_STATS_NAMESPACE, StatsConfigBuilder},
};

/// A configured registry, recorder and exporter for the backend API.
///
/// This instance is created by calling [`configure()`][crate::configure]. Clones share state.
#[derive(Debug, Clone)]
pub struct BackendStats {
    registry: Registry,
    recorder: Recorder,
    exporter: Exporter,
    backend: Option<BackendApiStats>,
}

impl BackendStats {
    /// Called by `StatsConfigBuilder::finish()`.
    pub(crate) fn from_config_builder(
        config: StatsConfigBuilder,
        env: Option<&HashMap<String, String>>,
    ) -> Result<Self, ConfigureError> {
        let namespace = BACKENDAPI_STATS_NAMESPACE.resolve(config.namespace, env)?;
        let default_views = BACKENDAPI_STATS_DEFAULT_VIEWS
            .resolve(config.default_views.map(crate::config::Switch), env)?
            .0;

        let registry = Registry::new();
        let exporter = Exporter::new(&registry, namespace)?;
        let recorder = registry.recorder();

        let backend = if default_views {
            Some(BackendApiStats::register(&registry)?)
        } else {
            None
        };

        if config.log_bridge {
            let Some(backend) = &backend else {
                return Err(ConfigureError::Other(
                    "the log bridge needs the default views to be registered".into(),
                ));
            };
            LogLinesLogger::new(recorder.clone(), backend).init()?;
        }

        tracing::debug!(
            namespace = exporter.namespace(),
            default_views,
            log_bridge = config.log_bridge,
            "configured backend API stats"
        );

        Ok(Self {
            registry,
            recorder,
            exporter,
            backend,
        })
    }

    /// The registry owning all definitions and aggregation state.
    ///
    /// Use it to register additional measures, tag keys and views during startup.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The recorder for call sites.
    #[must_use]
    pub fn recorder(&self) -> &Recorder {
        &self.recorder
    }

    /// The exporter for the configured namespace.
    #[must_use]
    pub fn exporter(&self) -> &Exporter {
        &self.exporter
    }

    /// The standard backend API definitions, unless they were disabled.
    #[must_use]
    pub fn backend(&self) -> Option<&BackendApiStats> {
        self.backend.as_ref()
    }

    /// A `tracing` layer counting events on the log lines view, unless default views are
    /// disabled.
    #[must_use]
    pub fn log_lines_layer(&self) -> Option<LogLinesLayer> {
        self.backend
            .as_ref()
            .map(|backend| LogLinesLayer::new(self.recorder.clone(), backend))
    }
}
