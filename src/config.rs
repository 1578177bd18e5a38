//! Configuration options for the backend API stats.
//!
//! See [`StatsConfigBuilder`] for documentation of all these options.

use std::{collections::HashMap, convert::Infallible, env::VarError, str::FromStr};

use crate::{ConfigureError, stats::BackendStats};

/// Namespace used when neither the builder nor the environment provide one.
pub const DEFAULT_NAMESPACE: &str = "open_match";

/// Builder for the stats configuration, returned from [`configure()`][crate::configure].
#[must_use = "call `.finish()` to complete configuration."]
#[derive(Debug, Default)]
pub struct StatsConfigBuilder {
    pub(crate) namespace: Option<String>,
    pub(crate) default_views: Option<bool>,
    pub(crate) log_bridge: bool,
}

impl StatsConfigBuilder {
    /// Set the export namespace, prepended to every metric name.
    ///
    /// Defaults to the value of `BACKENDAPI_STATS_NAMESPACE` if set, otherwise `open_match`.
    pub fn with_namespace<T: Into<String>>(mut self, namespace: T) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Whether to register the [standard backend API views][crate::BackendApiStats].
    ///
    /// Defaults to the value of `BACKENDAPI_STATS_DEFAULT_VIEWS` if set, otherwise `true`.
    pub fn with_default_views(mut self, enable: bool) -> Self {
        self.default_views = Some(enable);
        self
    }

    /// Whether to install a [`LogLinesLogger`][crate::LogLinesLogger] as the global `log`
    /// logger, counting `log` records on the log lines view.
    ///
    /// Requires the default views. Off by default, since only one global logger can be set per
    /// program.
    pub fn with_log_bridge(mut self, install: bool) -> Self {
        self.log_bridge = install;
        self
    }

    /// Finish configuring.
    ///
    /// # Errors
    ///
    /// See [`ConfigureError`] for possible errors.
    pub fn finish(self) -> Result<BackendStats, ConfigureError> {
        BackendStats::from_config_builder(self, None)
    }
}

/// Boolean switch which accepts `true`/`false` as well as `1`/`0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Switch(pub(crate) bool);

impl FromStr for Switch {
    type Err = ConfigureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(Switch(true)),
            "false" | "0" => Ok(Switch(false)),
            _ => Err(ConfigureError::InvalidConfigurationValue {
                parameter: "BACKENDAPI_STATS_DEFAULT_VIEWS",
                value: s.to_owned(),
            }),
        }
    }
}

pub(crate) trait ParseConfigValue: Sized {
    fn parse_config_value(s: &str) -> Result<Self, ConfigureError>;
}

impl<T> ParseConfigValue for T
where
    T: FromStr,
    ConfigureError: From<T::Err>,
{
    fn parse_config_value(s: &str) -> Result<Self, ConfigureError> {
        Ok(s.parse()?)
    }
}

/// Reads `var` from `env` when given, otherwise from the process environment.
fn read_env_var(
    var: &'static str,
    env: Option<&HashMap<String, String>>,
) -> Result<Option<String>, ConfigureError> {
    let Some(env) = env else {
        return match std::env::var(var) {
            Ok(value) => Ok(Some(value)),
            Err(VarError::NotPresent) => Ok(None),
            Err(VarError::NotUnicode(raw)) => Err(ConfigureError::InvalidConfigurationValue {
                parameter: var,
                value: raw.to_string_lossy().into_owned(),
            }),
        };
    };
    Ok(env.get(var).cloned())
}

pub(crate) struct ConfigValue<T> {
    env_vars: &'static [&'static str],
    default_value: fn() -> T,
}

impl<T> ConfigValue<T> {
    const fn new(env_vars: &'static [&'static str], default_value: fn() -> T) -> Self {
        Self {
            env_vars,
            default_value,
        }
    }
}

impl<T: ParseConfigValue> ConfigValue<T> {
    /// Resolves a config value, using the provided value if present, otherwise falling back to the environment variable or the default.
    pub(crate) fn resolve(
        &self,
        value: Option<T>,
        env: Option<&HashMap<String, String>>,
    ) -> Result<T, ConfigureError> {
        if let Some(v) = try_resolve_from_env(value, self.env_vars, env)? {
            return Ok(v);
        }

        Ok((self.default_value)())
    }
}

fn try_resolve_from_env<T>(
    value: Option<T>,
    env_vars: &'static [&'static str],
    env: Option<&HashMap<String, String>>,
) -> Result<Option<T>, ConfigureError>
where
    T: ParseConfigValue,
{
    if let Some(v) = value {
        return Ok(Some(v));
    }

    for var in env_vars {
        if let Some(s) = read_env_var(*var, env)? {
            return T::parse_config_value(&s).map(Some);
        }
    }

    Ok(None)
}

impl From<Infallible> for ConfigureError {
    fn from(_: Infallible) -> Self {
        unreachable!("Infallible cannot be constructed")
    }
}

pub(crate) static BACKENDAPI_STATS_NAMESPACE: ConfigValue<String> =
    ConfigValue::new(&["BACKENDAPI_STATS_NAMESPACE"], || {
        DEFAULT_NAMESPACE.to_owned()
    });

pub(crate) static BACKENDAPI_STATS_DEFAULT_VIEWS: ConfigValue<Switch> =
    ConfigValue::new(&["BACKENDAPI_STATS_DEFAULT_VIEWS"], || Switch(true));
