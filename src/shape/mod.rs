// ABOUTME: Record shaper - turns nested tracker JSON into fixed-width rows
// ABOUTME: Column catalogues, value normalization and the issue/changelog shapers

pub mod changelog;
pub mod columns;
pub mod issues;
pub mod table;
pub mod values;

pub use changelog::shape_changelog;
pub use columns::{Column, ColumnKind, CHANGELOG_COLUMNS, ISSUE_COLUMNS};
pub use issues::shape_issues;
pub use table::ShapedTable;
pub use values::MissingNumbers;

/// Fallback policies applied while shaping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShapeOptions {
    pub missing_numbers: MissingNumbers,
    /// Reject unparseable dates instead of writing the epoch sentinel.
    pub strict_dates: bool,
}
