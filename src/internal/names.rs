use std::sync::LazyLock;

use regex::Regex;

/// Measure and view names: identifier segments separated by `/`.
static PATH_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(/[A-Za-z0-9_]+)*$")
        .expect("path name regex is known to be valid")
});

/// Prometheus label names, also used for the export namespace.
static LABEL_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("label name regex is known to be valid")
});

pub(crate) fn is_valid_path_name(name: &str) -> bool {
    PATH_NAME.is_match(name)
}

pub(crate) fn is_valid_label_name(name: &str) -> bool {
    // `__` prefixed labels are reserved for Prometheus internal use
    LABEL_NAME.is_match(name) && !name.starts_with("__")
}
