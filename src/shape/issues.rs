// ABOUTME: Shapes raw tracker issue JSON into fixed-width issue rows
// ABOUTME: Two-level flattening, joined list columns, typed normalization per column

use std::collections::BTreeMap;

use serde_json::{Map, Value as JsonValue};

use super::columns::{ColumnKind, FLATTEN_SEPARATOR, ISSUE_COLUMNS, ORGANIZATION_COLUMN};
use super::table::ShapedTable;
use super::values::{normalize_datetime, normalize_decimal, value_to_text};
use super::ShapeOptions;
use crate::error::{Result, SyncError};

/// A derived column that exists only if its source path does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionalColumn {
    Present(String),
    Absent,
}

impl OptionalColumn {
    pub fn into_cell(self) -> String {
        match self {
            OptionalColumn::Present(value) => value,
            OptionalColumn::Absent => String::new(),
        }
    }
}

/// Flatten an issue object up to two levels deep.
///
/// `{"queue": {"key": "OPS"}}` becomes `queue_key`. Values nested deeper than
/// the second level are kept whole and later rendered as JSON text.
pub fn flatten_record(record: &Map<String, JsonValue>) -> BTreeMap<String, JsonValue> {
    let mut flat = BTreeMap::new();
    for (key, value) in record {
        match value {
            JsonValue::Object(children) => {
                for (child_key, child) in children {
                    flat.insert(
                        format!("{}{}{}", key, FLATTEN_SEPARATOR, child_key),
                        child.clone(),
                    );
                }
            }
            other => {
                flat.insert(key.clone(), other.clone());
            }
        }
    }
    flat
}

/// Render a list of objects as the comma-joined values of `sub_field`.
///
/// Absent or null source paths yield [`OptionalColumn::Absent`]; any other
/// shape is schema drift and reported as an error.
pub fn join_list_field(
    record: &Map<String, JsonValue>,
    path: &str,
    sub_field: &str,
) -> std::result::Result<OptionalColumn, String> {
    let items = match record.get(path) {
        None | Some(JsonValue::Null) => return Ok(OptionalColumn::Absent),
        Some(JsonValue::Array(items)) => items,
        Some(other) => return Err(format!("expected a list, got {}", json_kind(other))),
    };

    let mut parts = Vec::with_capacity(items.len());
    for item in items {
        let value = item
            .as_object()
            .and_then(|obj| obj.get(sub_field))
            .ok_or_else(|| format!("list item has no '{}' field", sub_field))?;
        parts.push(value_to_text(Some(value)));
    }
    Ok(OptionalColumn::Present(parts.join(",")))
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "a list",
        JsonValue::Object(_) => "an object",
    }
}

fn record_label(record: &Map<String, JsonValue>, index: usize) -> String {
    record
        .get("key")
        .or_else(|| record.get("id"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| format!("#{}", index))
}

/// Shape one issue into a row in `ISSUE_COLUMNS` order.
pub fn shape_issue(
    record: &Map<String, JsonValue>,
    index: usize,
    org_id: &str,
    options: &ShapeOptions,
) -> Result<Vec<String>> {
    let flat = flatten_record(record);
    let label = record_label(record, index);
    let mut row = Vec::with_capacity(ISSUE_COLUMNS.len());

    for column in ISSUE_COLUMNS {
        if column.name == ORGANIZATION_COLUMN {
            row.push(org_id.to_string());
            continue;
        }

        let source = flat.get(column.name);
        let cell = match column.kind {
            ColumnKind::Text => Ok(value_to_text(source)),
            ColumnKind::DateTime => normalize_datetime(source, options.strict_dates),
            ColumnKind::Decimal => normalize_decimal(source, options.missing_numbers),
            ColumnKind::Joined { sub_field } => {
                join_list_field(record, column.name, sub_field).map(OptionalColumn::into_cell)
            }
        };
        row.push(cell.map_err(|reason| SyncError::shape(label.clone(), column.name, reason))?);
    }

    Ok(row)
}

/// Shape a batch of raw issues.
pub fn shape_issues(raw: &[JsonValue], org_id: &str, options: &ShapeOptions) -> Result<ShapedTable> {
    let mut table = ShapedTable::new(ISSUE_COLUMNS);
    for (index, value) in raw.iter().enumerate() {
        let record = value
            .as_object()
            .ok_or_else(|| SyncError::shape(format!("#{}", index), "*", "issue is not a JSON object"))?;
        table.push_row(shape_issue(record, index, org_id, options)?);
    }
    tracing::debug!(rows = table.len(), "shaped issues");
    Ok(table)
}
