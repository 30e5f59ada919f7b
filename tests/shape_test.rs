// ABOUTME: Integration tests for the shaping pipeline through the public API
// ABOUTME: Covers fixed row width, missing-field fallbacks, idempotence and TSV round trips

use serde_json::{json, Value};
use tracker_import::shape::columns::ORGANIZATION_COLUMN;
use tracker_import::shape::values::{DATETIME_FORMAT, MissingNumbers};
use tracker_import::shape::{
    shape_changelog, shape_issues, ColumnKind, ShapeOptions, ISSUE_COLUMNS,
};
use tracker_import::sink::tsv;
use tracker_import::tracker::IssueChangelog;
use tracker_import::SyncError;

fn three_issues() -> Vec<Value> {
    vec![
        json!({
            "self": "https://api.tracker.yandex.net/v2/issues/OPS-1",
            "id": "64a1",
            "key": "OPS-1",
            "summary": "Pager loops forever",
            "description": "Steps:\n1. open\n2.\twait",
            "status": {"key": "inProgress", "display": "In Progress"},
            "queue": {"key": "OPS", "display": "Operations"},
            "assignee": {"id": "1130000001", "display": "Jane Roe"},
            "sprint": [{"id": "7", "display": "Sprint 7"}, {"id": "8", "display": "Sprint 8"}],
            "boards": [{"id": 14}],
            "components": [{"id": "3", "display": "Backend"}],
            "tags": ["etl", "pager"],
            "createdAt": "2024-04-30T08:15:00.000+0000",
            "updatedAt": "2024-05-01T10:00:00.123456+0300",
            "storyPoints": 5,
            "votes": 1
        }),
        json!({
            "id": "64a2",
            "key": "OPS-2",
            "summary": "No estimate yet",
            "createdAt": "2024-05-02T09:00:00.000+0000",
            "updatedAt": "2024-05-02T09:30:00.000+0000"
        }),
        json!({
            "id": "64a3",
            "key": "OPS-3",
            "summary": "Half points",
            "updatedAt": "2024-05-03T12:00:00.000+0000",
            "storyPoints": 0.125
        }),
    ]
}

#[test]
fn three_issues_with_one_missing_story_points() {
    let table = shape_issues(&three_issues(), "org-7", &ShapeOptions::default()).unwrap();

    assert_eq!(table.len(), 3);
    assert!(table.rows().iter().all(|row| row.len() == ISSUE_COLUMNS.len()));
    assert_eq!(table.value(0, "storyPoints"), Some("5.00"));
    assert_eq!(table.value(1, "storyPoints"), Some(""));
    assert_eq!(table.value(2, "storyPoints"), Some("0.13"));

    let datetime_columns: Vec<_> = ISSUE_COLUMNS
        .iter()
        .filter(|c| c.kind == ColumnKind::DateTime)
        .map(|c| c.name)
        .collect();
    for row in 0..table.len() {
        for column in &datetime_columns {
            let value = table.value(row, column).unwrap();
            assert!(
                chrono::NaiveDateTime::parse_from_str(value, DATETIME_FORMAT).is_ok(),
                "row {row} column {column}: {value}"
            );
            assert_eq!(value.len(), "2024-05-01 10:00:00.000".len());
        }
    }
}

#[test]
fn zero_policy_makes_missing_story_points_explicit() {
    let options = ShapeOptions {
        missing_numbers: MissingNumbers::Zero,
        strict_dates: false,
    };
    let table = shape_issues(&three_issues(), "org-7", &options).unwrap();
    assert_eq!(table.value(1, "storyPoints"), Some("0.00"));
}

#[test]
fn flattened_and_joined_columns() {
    let table = shape_issues(&three_issues(), "org-7", &ShapeOptions::default()).unwrap();

    assert_eq!(table.value(0, "organization_id"), Some("org-7"));
    assert_eq!(table.value(0, "status_display"), Some("In Progress"));
    assert_eq!(table.value(0, "queue_key"), Some("OPS"));
    assert_eq!(table.value(0, "assignee_display"), Some("Jane Roe"));
    assert_eq!(table.value(0, "sprint"), Some("Sprint 7,Sprint 8"));
    assert_eq!(table.value(0, "boards"), Some("14"));
    assert_eq!(table.value(0, "components"), Some("Backend"));
    assert_eq!(table.value(0, "tags"), Some("[\"etl\",\"pager\"]"));
    assert_eq!(table.value(0, "updatedAt"), Some("2024-05-01 07:00:00.123"));
}

#[test]
fn missing_fields_fall_back_to_sentinels() {
    let table = shape_issues(&three_issues(), "org-7", &ShapeOptions::default()).unwrap();

    assert_eq!(table.value(1, "description"), Some(""));
    assert_eq!(table.value(1, "status_display"), Some(""));
    assert_eq!(table.value(1, "sprint"), Some(""));
    assert_eq!(table.value(1, "resolvedAt"), Some("1970-01-01 00:00:00.000"));
    assert_eq!(table.value(2, "createdAt"), Some("1970-01-01 00:00:00.000"));
}

#[test]
fn shaping_is_idempotent() {
    let raw = three_issues();
    let first = shape_issues(&raw, "org-7", &ShapeOptions::default()).unwrap();
    let second = shape_issues(&raw, "org-7", &ShapeOptions::default()).unwrap();
    assert_eq!(first.to_tsv().as_bytes(), second.to_tsv().as_bytes());
}

#[test]
fn serialized_rows_parse_back_unchanged() {
    let table = shape_issues(&three_issues(), "org-7", &ShapeOptions::default()).unwrap();
    let parsed = tsv::parse(&table.to_tsv()).unwrap();

    assert_eq!(parsed.len(), table.len() + 1);
    assert_eq!(parsed[0], table.columns());
    assert_eq!(&parsed[1..], table.rows());
    assert_eq!(
        table.value(0, "description"),
        Some("Steps:\n1. open\n2.\twait")
    );
}

#[test]
fn non_numeric_story_points_are_rejected() {
    let raw = vec![json!({"key": "OPS-4", "storyPoints": "a lot"})];
    let err = shape_issues(&raw, "org-7", &ShapeOptions::default()).unwrap_err();
    assert!(matches!(err, SyncError::Shape { ref column, .. } if column == "storyPoints"));
}

#[test]
fn strict_dates_reject_garbage() {
    let raw = vec![json!({"key": "OPS-5", "updatedAt": "last tuesday"})];
    let lenient = shape_issues(&raw, "org-7", &ShapeOptions::default()).unwrap();
    assert_eq!(lenient.value(0, "updatedAt"), Some("1970-01-01 00:00:00.000"));

    let strict = ShapeOptions {
        strict_dates: true,
        ..ShapeOptions::default()
    };
    assert!(shape_issues(&raw, "org-7", &strict).is_err());
}

#[test]
fn changelog_extraction_by_field_id() {
    let changelog = IssueChangelog {
        issue_id: "64a1".to_string(),
        issue_key: "OPS-1".to_string(),
        entries: vec![json!({
            "id": "ch-1",
            "updatedAt": "2024-05-01T10:00:00.000+0000",
            "updatedBy": {"display": "Jane Roe"},
            "type": "IssueWorkflow",
            "fields": [
                {"field": {"id": "status", "display": "Status"},
                 "from": {"key": "open", "display": "Open"},
                 "to": {"key": "inProgress", "display": "In Progress"}},
                {"field": {"id": "description", "display": "Description"},
                 "from": "old text", "to": "new text"}
            ]
        })],
    };

    let table = shape_changelog(&[changelog], "org-7", &ShapeOptions::default()).unwrap();
    assert_eq!(table.len(), 2);
    assert_eq!(table.value(0, "from"), Some("Open"));
    assert_eq!(table.value(0, "to"), Some("In Progress"));
    assert_eq!(table.value(1, "from"), Some("old text"));
    assert_eq!(table.value(1, "to"), Some("new text"));
    assert_eq!(table.value(1, "issue_id"), Some("64a1"));
}

/// One issue that fills every catalogue column, and the cell each one should become.
fn fully_populated_issue() -> (Value, Vec<String>) {
    let mut record = serde_json::Map::new();
    let mut expected = Vec::with_capacity(ISSUE_COLUMNS.len());

    for (i, column) in ISSUE_COLUMNS.iter().enumerate() {
        if column.name == ORGANIZATION_COLUMN {
            expected.push("org-7".to_string());
            continue;
        }
        let (value, cell) = match column.kind {
            ColumnKind::DateTime => {
                let day = i % 28 + 1;
                (
                    json!(format!("2024-05-{:02}T10:11:12.345678+0000", day)),
                    format!("2024-05-{:02} 10:11:12.345", day),
                )
            }
            ColumnKind::Decimal => (json!(i as f64 + 0.125), format!("{}.13", i)),
            ColumnKind::Joined { sub_field } => {
                let items: Vec<Value> = ["a", "b"]
                    .iter()
                    .map(|suffix| {
                        let mut item = serde_json::Map::new();
                        item.insert(sub_field.to_string(), json!(format!("{}-{}", column.name, suffix)));
                        Value::Object(item)
                    })
                    .collect();
                (Value::Array(items), format!("{0}-a,{0}-b", column.name))
            }
            ColumnKind::Text if i % 3 == 0 => {
                let text = format!("{} line one\nline\ttwo \\ end", column.name);
                (json!(text), text)
            }
            ColumnKind::Text => (json!(format!("value of {}", column.name)), format!("value of {}", column.name)),
        };

        match column.name.split_once('_') {
            Some((parent, child)) => {
                record
                    .entry(parent)
                    .or_insert_with(|| json!({}))
                    .as_object_mut()
                    .unwrap()
                    .insert(child.to_string(), value);
            }
            None => {
                record.insert(column.name.to_string(), value);
            }
        }
        expected.push(cell);
    }

    (Value::Object(record), expected)
}

#[test]
fn every_issue_column_survives_tsv_round_trip() {
    let (issue, expected) = fully_populated_issue();
    let table = shape_issues(&[issue], "org-7", &ShapeOptions::default()).unwrap();
    let parsed = tsv::parse(&table.to_tsv()).unwrap();

    assert_eq!(parsed.len(), 2);
    assert_eq!(parsed[0], table.columns());
    for (index, column) in ISSUE_COLUMNS.iter().enumerate() {
        assert_eq!(parsed[1][index], expected[index], "column {}", column.name);
    }
    assert!(parsed[1].iter().all(|cell| !cell.is_empty()));
}
