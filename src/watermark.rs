// ABOUTME: Watermark resolution - decides how far back a sync run queries the tracker
// ABOUTME: Last committed updatedAt minus a fixed skew, else configured depth, else one year

use std::fmt;
use std::str::FromStr;

use chrono::{Duration, NaiveDateTime};

use crate::error::Result;
use crate::sink::ClickHouseClient;

/// Overlap subtracted from the persisted watermark to absorb clock skew and
/// late-arriving updates.
pub const WATERMARK_SKEW_MINUTES: i64 = 5;

/// Lookback used when the sink is empty and no initial depth is configured.
pub const DEFAULT_LOOKBACK_DAYS: i64 = 365;

/// Absolute date-time literal of the tracker query language, `"YYYY-MM-DD HH:MM:SS"`.
/// Values are UTC. Sub-second digits are dropped, which only widens the window.
const QUERY_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn watermark_skew() -> Duration {
    Duration::minutes(WATERMARK_SKEW_MINUTES)
}

/// The epoch value the sink reports for `max(...)` over an empty table.
pub fn epoch_sentinel() -> NaiveDateTime {
    NaiveDateTime::default()
}

/// How much history to pull when the sink holds no prior rows.
///
/// Accepts tracker-style short forms (`30d`, `12h`, `2w`, `90m`) and spelled
/// out windows (`90 days`, `6 months`, `1 year`). Months count as 30 days and
/// years as 365 days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryDepth {
    minutes: i64,
}

impl HistoryDepth {
    pub fn days(days: i64) -> Self {
        Self {
            minutes: days * 24 * 60,
        }
    }

    pub fn as_duration(&self) -> Duration {
        Duration::minutes(self.minutes)
    }

    /// Tracker relative expression, using the largest unit that divides evenly.
    pub fn relative_expr(&self) -> String {
        if self.minutes % (24 * 60) == 0 {
            format!("now()-{}d", self.minutes / (24 * 60))
        } else if self.minutes % 60 == 0 {
            format!("now()-{}h", self.minutes / 60)
        } else {
            format!("now()-{}m", self.minutes)
        }
    }
}

impl FromStr for HistoryDepth {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let trimmed = s.trim();
        let split = trimmed
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| format!("history depth '{}' is missing a unit", trimmed))?;
        let (amount, unit) = trimmed.split_at(split);
        let amount: i64 = amount
            .parse()
            .map_err(|_| format!("history depth '{}' must start with a number", trimmed))?;
        if amount <= 0 {
            return Err(format!("history depth '{}' must be positive", trimmed));
        }

        let minutes_per_unit = match unit.trim().to_ascii_lowercase().as_str() {
            "m" | "min" | "mins" | "minute" | "minutes" => 1,
            "h" | "hour" | "hours" => 60,
            "d" | "day" | "days" => 24 * 60,
            "w" | "week" | "weeks" => 7 * 24 * 60,
            "mo" | "month" | "months" => 30 * 24 * 60,
            "y" | "year" | "years" => 365 * 24 * 60,
            other => return Err(format!("unknown history depth unit '{}'", other)),
        };

        amount
            .checked_mul(minutes_per_unit)
            .map(|minutes| Self { minutes })
            .ok_or_else(|| format!("history depth '{}' is too large", trimmed))
    }
}

/// Lower bound of the tracker query for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryWindow {
    /// Issues updated strictly after this UTC instant.
    UpdatedAfter(NaiveDateTime),
    /// Issues updated within a relative lookback.
    Lookback(HistoryDepth),
}

impl QueryWindow {
    /// Three-tier fallback: skewed watermark, configured depth, default lookback.
    pub fn plan(max_updated_at: Option<NaiveDateTime>, initial_depth: Option<HistoryDepth>) -> Self {
        match max_updated_at {
            Some(ts) if ts > epoch_sentinel() => QueryWindow::UpdatedAfter(ts - watermark_skew()),
            _ => QueryWindow::Lookback(
                initial_depth.unwrap_or_else(|| HistoryDepth::days(DEFAULT_LOOKBACK_DAYS)),
            ),
        }
    }

    pub fn to_query(&self) -> String {
        match self {
            QueryWindow::UpdatedAfter(ts) => {
                format!("updated: >\"{}\"", ts.format(QUERY_TIMESTAMP_FORMAT))
            }
            QueryWindow::Lookback(depth) => format!("updated: >{}", depth.relative_expr()),
        }
    }
}

impl fmt::Display for QueryWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_query())
    }
}

/// Join an optional user filter with the window clause.
///
/// Tracker query language ANDs space-separated conditions.
pub fn compose_query(window: &QueryWindow, filter: Option<&str>) -> String {
    match filter.map(str::trim).filter(|f| !f.is_empty()) {
        Some(filter) => format!("{} {}", filter, window.to_query()),
        None => window.to_query(),
    }
}

/// Read the committed watermark from the sink and build this run's query window.
///
/// The watermark is `max(updatedAt)` of the issues table as recorded by the
/// last run that loaded both tables. Issue rows from a run that failed after
/// its issue insert do not count, so their window is fetched again.
pub async fn resolve_query_window(
    sink: &ClickHouseClient,
    runs_table: &str,
    initial_depth: Option<HistoryDepth>,
) -> Result<QueryWindow> {
    let max_updated_at = sink.committed_watermark(runs_table).await?;
    let window = QueryWindow::plan(max_updated_at, initial_depth);

    match (&window, max_updated_at) {
        (QueryWindow::UpdatedAfter(_), Some(watermark)) => tracing::info!(
            %watermark,
            skew_minutes = WATERMARK_SKEW_MINUTES,
            query = %window,
            "resolved incremental window from watermark"
        ),
        _ => tracing::info!(query = %window, "no completed run in sink, using lookback window"),
    }

    Ok(window)
}
