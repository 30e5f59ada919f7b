// ABOUTME: Declared, ordered column catalogues for the issues and changelog tables
// ABOUTME: Also holds the field-id lookup table for changelog from/to extraction

/// Separator between a parent key and its child key when flattening.
pub const FLATTEN_SEPARATOR: &str = "_";

/// Column injected from configuration at position 0 of every table.
pub const ORGANIZATION_COLUMN: &str = "organization_id";

/// Version column used for ranking and by the replacing engine.
pub const VERSION_COLUMN: &str = "updatedAt";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    DateTime,
    Decimal,
    /// List of objects rendered as a comma-joined string of one sub-field.
    /// Present only when the source path exists.
    Joined { sub_field: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub kind: ColumnKind,
}

impl Column {
    pub const fn text(name: &'static str) -> Self {
        Self {
            name,
            kind: ColumnKind::Text,
        }
    }

    pub const fn datetime(name: &'static str) -> Self {
        Self {
            name,
            kind: ColumnKind::DateTime,
        }
    }

    pub const fn decimal(name: &'static str) -> Self {
        Self {
            name,
            kind: ColumnKind::Decimal,
        }
    }

    pub const fn joined(name: &'static str, sub_field: &'static str) -> Self {
        Self {
            name,
            kind: ColumnKind::Joined { sub_field },
        }
    }

    /// ClickHouse type used in the table DDL.
    pub fn sql_type(&self) -> &'static str {
        match self.kind {
            ColumnKind::Text | ColumnKind::Joined { .. } => "String",
            ColumnKind::DateTime => "DateTime64(3, 'UTC')",
            ColumnKind::Decimal => "Nullable(Decimal(15, 2))",
        }
    }
}

pub const ISSUE_COLUMNS: &[Column] = &[
    Column::text(ORGANIZATION_COLUMN),
    Column::text("self"),
    Column::text("id"),
    Column::text("key"),
    Column::text("version"),
    Column::text("summary"),
    Column::text("description"),
    Column::text("type_key"),
    Column::text("type_display"),
    Column::text("status_key"),
    Column::text("status_display"),
    Column::datetime("statusStartTime"),
    Column::text("previousStatus_display"),
    Column::text("previousStatusLastAssignee_display"),
    Column::text("resolution_key"),
    Column::text("resolution_display"),
    Column::datetime("resolvedAt"),
    Column::text("resolvedBy_display"),
    Column::text("priority_key"),
    Column::text("priority_display"),
    Column::text("queue_key"),
    Column::text("queue_display"),
    Column::text("previousQueue_display"),
    Column::text("lastQueue_display"),
    Column::text("project_display"),
    Column::text("parent_key"),
    Column::text("parent_display"),
    Column::text("epic_key"),
    Column::text("epic_display"),
    Column::joined("boards", "id"),
    Column::joined("components", "display"),
    Column::joined("sprint", "display"),
    Column::text("tags"),
    Column::text("aliases"),
    Column::text("followers"),
    Column::text("votedBy"),
    Column::text("access"),
    Column::datetime("createdAt"),
    Column::text("createdBy_display"),
    Column::datetime(VERSION_COLUMN),
    Column::text("updatedBy_display"),
    Column::text("assignee_id"),
    Column::text("assignee_display"),
    Column::text("pendingReplyFrom"),
    Column::text("deadline"),
    Column::datetime("start"),
    Column::datetime("end"),
    Column::datetime("lastCommentUpdatedAt"),
    Column::text("originalEstimation"),
    Column::text("estimation"),
    Column::text("spent"),
    Column::decimal("storyPoints"),
    Column::decimal("votes"),
    Column::decimal("commentWithExternalMessageCount"),
    Column::decimal("commentWithoutExternalMessageCount"),
    Column::decimal("checklistDone"),
    Column::decimal("checklistTotal"),
    Column::decimal("Effort"),
    Column::decimal("Confidence"),
    Column::decimal("Impact"),
    Column::decimal("Reach"),
    Column::decimal("Score"),
    Column::text("favorite"),
    Column::text("sla"),
    Column::text("emailFrom"),
    Column::text("emailTo"),
    Column::text("emailCreatedBy"),
];

pub const CHANGELOG_COLUMNS: &[Column] = &[
    Column::text(ORGANIZATION_COLUMN),
    Column::text("id"),
    Column::text("issue_id"),
    Column::text("issue_key"),
    Column::datetime(VERSION_COLUMN),
    Column::text("updatedBy_display"),
    Column::text("type"),
    Column::text("transport"),
    Column::text("field_id"),
    Column::text("field_display"),
    Column::text("from"),
    Column::text("to"),
    Column::text("worklog"),
];

/// How a changelog from/to value is turned into a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extraction {
    /// Value is an object; take this sub-field's display string.
    DisplayField(&'static str),
    /// Value is used verbatim.
    RawScalar,
}

/// Fields whose from/to values arrive as structured objects.
pub const STRUCTURED_FIELDS: &[(&str, Extraction)] = &[
    ("status", Extraction::DisplayField("display")),
    ("resolution", Extraction::DisplayField("display")),
    ("assignee", Extraction::DisplayField("display")),
];

pub fn extraction_for(field_id: &str) -> Extraction {
    STRUCTURED_FIELDS
        .iter()
        .find(|(id, _)| *id == field_id)
        .map(|(_, extraction)| *extraction)
        .unwrap_or(Extraction::RawScalar)
}

pub fn column_names(columns: &[Column]) -> Vec<String> {
    columns.iter().map(|c| c.name.to_string()).collect()
}
