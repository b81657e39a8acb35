/// Shortens a `ps` elapsed time of the form `days-hh:mm:ss` to `N days`;
/// shorter durations are kept as they are.
pub fn normalize_elapsed(elapsed: &str) -> String {
    match elapsed.split_once('-') {
        Some((days, _)) => format!("{days} days"),
        None => elapsed.to_string(),
    }
}

pub fn format_mib(mib: u64) -> String {
    format!("{mib}MiB")
}

/// Formats an optional percentage with one decimal, empty when unknown.
pub fn format_percent(value: Option<f64>) -> String {
    value.map(|v| format!("{v:.1}")).unwrap_or_default()
}

/// A `+-----+` border as wide as `line`.
pub fn border_for(line: &str) -> String {
    let width = line.chars().count().saturating_sub(2);
    format!("+{}+", "-".repeat(width))
}
