// ABOUTME: Explodes per-issue changelog entries into one row per changed field
// ABOUTME: from/to values go through the field-id extraction lookup table

use serde_json::{Map, Value as JsonValue};

use super::columns::{extraction_for, Extraction, CHANGELOG_COLUMNS};
use super::table::ShapedTable;
use super::values::{normalize_datetime, value_to_text};
use super::ShapeOptions;
use crate::error::{Result, SyncError};
use crate::tracker::IssueChangelog;

/// Turn one from/to value into a cell according to the field's strategy.
pub fn extract_change_value(
    field_id: &str,
    value: Option<&JsonValue>,
) -> std::result::Result<String, String> {
    match (extraction_for(field_id), value) {
        (_, None) | (_, Some(JsonValue::Null)) => Ok(String::new()),
        (Extraction::DisplayField(sub_field), Some(JsonValue::Object(obj))) => obj
            .get(sub_field)
            .map(|v| value_to_text(Some(v)))
            .ok_or_else(|| format!("'{}' value has no '{}' field", field_id, sub_field)),
        (Extraction::DisplayField(_), Some(scalar)) | (Extraction::RawScalar, Some(scalar)) => {
            Ok(value_to_text(Some(scalar)))
        }
    }
}

fn nested_text(entry: &Map<String, JsonValue>, parent: &str, child: &str) -> String {
    value_to_text(entry.get(parent).and_then(|p| p.get(child)))
}

/// Rows for one changelog entry: one per `fields[]` item, or a single row
/// with empty field cells when the entry changed no fields (e.g. worklog).
fn entry_rows(
    changelog: &IssueChangelog,
    entry: &Map<String, JsonValue>,
    org_id: &str,
    options: &ShapeOptions,
) -> std::result::Result<Vec<Vec<String>>, (String, String)> {
    let updated_at = normalize_datetime(entry.get("updatedAt"), options.strict_dates)
        .map_err(|reason| ("updatedAt".to_string(), reason))?;
    let worklog = match entry.get("worklog") {
        None | Some(JsonValue::Null) => String::new(),
        Some(payload) => payload.to_string(),
    };

    let prefix = [
        org_id.to_string(),
        value_to_text(entry.get("id")),
        changelog.issue_id.clone(),
        changelog.issue_key.clone(),
        updated_at,
        nested_text(entry, "updatedBy", "display"),
        value_to_text(entry.get("type")),
        value_to_text(entry.get("transport")),
    ];
    let row = |field_id: String, field_display: String, from: String, to: String| {
        let mut row = Vec::with_capacity(CHANGELOG_COLUMNS.len());
        row.extend(prefix.iter().cloned());
        row.extend([field_id, field_display, from, to, worklog.clone()]);
        row
    };

    let fields: &[JsonValue] = match entry.get("fields") {
        None | Some(JsonValue::Null) => &[],
        Some(JsonValue::Array(fields)) => fields,
        Some(_) => return Err(("fields".to_string(), "expected a list".to_string())),
    };
    if fields.is_empty() {
        return Ok(vec![row(String::new(), String::new(), String::new(), String::new())]);
    }

    fields
        .iter()
        .map(|change| {
            let field_id = value_to_text(change.get("field").and_then(|f| f.get("id")));
            let field_display = value_to_text(change.get("field").and_then(|f| f.get("display")));
            let from = extract_change_value(&field_id, change.get("from"))
                .map_err(|reason| ("from".to_string(), reason))?;
            let to = extract_change_value(&field_id, change.get("to"))
                .map_err(|reason| ("to".to_string(), reason))?;
            Ok(row(field_id, field_display, from, to))
        })
        .collect()
}

/// Shape the changelogs of a batch of issues.
pub fn shape_changelog(
    changelogs: &[IssueChangelog],
    org_id: &str,
    options: &ShapeOptions,
) -> Result<ShapedTable> {
    let mut table = ShapedTable::new(CHANGELOG_COLUMNS);
    for changelog in changelogs {
        for (index, entry) in changelog.entries.iter().enumerate() {
            let label = || {
                entry
                    .get("id")
                    .and_then(|v| v.as_str())
                    .map(|id| format!("{}/{}", changelog.issue_key, id))
                    .unwrap_or_else(|| format!("{}/#{}", changelog.issue_key, index))
            };
            let entry_obj = entry
                .as_object()
                .ok_or_else(|| SyncError::shape(label(), "*", "changelog entry is not a JSON object"))?;
            let rows = entry_rows(changelog, entry_obj, org_id, options)
                .map_err(|(column, reason)| SyncError::shape(label(), column, reason))?;
            for row in rows {
                table.push_row(row);
            }
        }
    }
    tracing::debug!(rows = table.len(), "shaped changelog");
    Ok(table)
}
