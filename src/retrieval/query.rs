// Search string composition from a diagnostic snapshot


use itertools::Itertools;
use serde_json::Value;

pub const UNKNOWN_DATABASE: &str = "unknown_database";
pub const UNKNOWN_VERSION: &str = "unknown_version";

/// Build the similarity search string for a snapshot.
///
/// `"Failing KPIs: a, b"` is emitted only when at least one KPI name is
/// present; the database and version clauses are always emitted, using
/// placeholders for missing metadata. Clauses are joined by `". "`.
#[inline]
pub fn compose_query(snapshot: &Value) -> String {
    let kpi_names: Vec<&str> = snapshot
        .get("kpi_summary")
        .and_then(Value::as_array)
        .map(|kpis| {
            kpis.iter()
                .filter_map(|kpi| kpi.get("kpi_name").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();

    let metadata = snapshot.get("metadata");
    let database = metadata_field(metadata, "database_name", UNKNOWN_DATABASE);
    let version = metadata_field(metadata, "pg_version", UNKNOWN_VERSION);

    let mut clauses = Vec::with_capacity(3);
    if !kpi_names.is_empty() {
        clauses.push(format!("Failing KPIs: {}", kpi_names.join(", ")));
    }
    clauses.push(format!("PostgreSQL database: {database}"));
    clauses.push(format!("PostgreSQL version: {version}"));

    clauses.iter().join(". ")
}

/// Strings verbatim, other scalars as JSON text, missing or null as `fallback`
pub(crate) fn metadata_field(metadata: Option<&Value>, key: &str, fallback: &str) -> String {
    match metadata.and_then(|m| m.get(key)) {
        None | Some(Value::Null) => fallback.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
