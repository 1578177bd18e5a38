use crate::{
    Aggregation, RegistrationError, Registry, TagKey, View, ViewDefinition, measure::Measure,
};

/// Name of the measure counting logged lines, fed by the log bridges.
pub(crate) const LOG_LINES_MEASURE: &str = "backendapi/logs_total";

/// The standard backend API measures, tag keys and views.
///
/// Measure names become part of the exported metric name once a view over them is exported; see
/// [`export_name`][crate::export::export_name].
#[derive(Debug, Clone)]
pub struct BackendApiStats {
    /// Lines logged by the backend API, tagged with [`key_severity`][Self::key_severity].
    ///
    /// There is no need to record this directly when a [`LogLinesLayer`][crate::LogLinesLayer] or
    /// [`LogLinesLogger`][crate::LogLinesLogger] is installed.
    pub log_lines: Measure<i64>,
    /// Backend API failures.
    pub failures: Measure<i64>,
    /// Players assigned to matches.
    pub assignments: Measure<i64>,
    /// Player match assignment failures.
    pub assignment_failures: Measure<i64>,
    /// Player match assignment deletions.
    pub assignment_deletions: Measure<i64>,
    /// Player match assignment deletion failures.
    pub assignment_deletion_failures: Measure<i64>,
    /// Backend API requests, tagged with [`key_method`][Self::key_method].
    pub requests: Measure<i64>,

    /// The currently running API method.
    pub key_method: TagKey,
    /// The severity of a log message.
    pub key_severity: TagKey,

    views: Vec<View>,
}

impl BackendApiStats {
    /// Register the standard definitions in `registry`.
    ///
    /// # Errors
    ///
    /// Fails if any of the names is already registered in `registry`.
    pub fn register(registry: &Registry) -> Result<Self, RegistrationError> {
        let counter = |name: &str, description: &str| {
            registry.register_measure::<i64>(name, description, "1")
        };

        let log_lines = counter(LOG_LINES_MEASURE, "Number of Backend API lines logged")?;
        let failures = counter("backendapi/failures_total", "Number of Backend API failures")?;
        let assignments = counter(
            "backendapi/assignments_total",
            "Number of players assigned to matches",
        )?;
        let assignment_failures = counter(
            "backendapi/assignment/failures_total",
            "Number of player match assignment failures",
        )?;
        let assignment_deletions = counter(
            "backendapi/assignment/deletions_total",
            "Number of player match assignment deletions",
        )?;
        let assignment_deletion_failures = counter(
            "backendapi/assignment/deletions/failures_total",
            "Number of player match assignment deletion failures",
        )?;
        let requests = counter(
            "backendapi/requests_total",
            "Number of Backend API requests",
        )?;

        let key_method = registry.register_tag_key("method")?;
        let key_severity = registry.register_tag_key("severity")?;

        let definitions = [
            ViewDefinition::new("log_lines/total", &log_lines, Aggregation::Count)
                .with_description("The number of lines logged")
                .with_tag_keys([&key_severity]),
            ViewDefinition::new("failures", &failures, Aggregation::Count)
                .with_description("The number of failures"),
            ViewDefinition::new("backend/assignments", &assignments, Aggregation::Count)
                .with_description("The number of successful player match assignments"),
            ViewDefinition::new(
                "backend/assignments/failures",
                &assignment_failures,
                Aggregation::Count,
            )
            .with_description("The number of player match assignment failures"),
            ViewDefinition::new(
                "backend/assignments/deletions",
                &assignment_deletions,
                Aggregation::Count,
            )
            .with_description("The number of successful player match assignment deletions"),
            ViewDefinition::new(
                "backend/assignments/deletions/failures",
                &assignment_deletion_failures,
                Aggregation::Count,
            )
            .with_description("The number of player match assignment deletion failures"),
            ViewDefinition::new("backend/requests", &requests, Aggregation::Count)
                .with_description("The number of Backend API requests")
                .with_tag_keys([&key_method]),
        ];

        let views = definitions
            .into_iter()
            .map(|definition| registry.register_view(definition))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            log_lines,
            failures,
            assignments,
            assignment_failures,
            assignment_deletions,
            assignment_deletion_failures,
            requests,
            key_method,
            key_severity,
            views,
        })
    }

    /// The standard exported views, in declaration order.
    #[must_use]
    pub fn default_views(&self) -> &[View] {
        &self.views
    }
}
