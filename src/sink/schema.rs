// ABOUTME: DDL for the versioned issue/changelog tables, the runs table and the dedup views
// ABOUTME: Idempotent create-if-not-exists, optional drop and ON CLUSTER replication

use chrono::NaiveDateTime;

use super::tsv;
use crate::error::Result;
use crate::shape::columns::{Column, CHANGELOG_COLUMNS, ISSUE_COLUMNS, VERSION_COLUMN};
use crate::shape::values::format_datetime;
use crate::sink::ClickHouseClient;
use crate::utils::{quote_ident, quote_literal};

/// Suffix of the deduplicating view created next to each table.
pub const LATEST_VIEW_SUFFIX: &str = "_latest";

/// Window column added by the dedup views and hidden from their output.
const RANK_COLUMN: &str = "_rank";

/// Column of the runs table holding the committed issues watermark.
pub const RUN_WATERMARK_COLUMN: &str = "watermark";

/// Runs table layout: name and ClickHouse type, in insert order.
pub const RUN_COLUMNS: &[(&str, &str)] = &[
    ("finishedAt", "DateTime64(3, 'UTC')"),
    (RUN_WATERMARK_COLUMN, "DateTime64(3, 'UTC')"),
    ("query", "String"),
    ("issue_rows", "UInt64"),
    ("changelog_rows", "UInt64"),
];

/// One run that loaded both tables.
///
/// `watermark` is `max(updatedAt)` of the issues table read after the
/// changelog insert succeeded. Only these rows move the next run's window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRecord {
    pub finished_at: NaiveDateTime,
    pub watermark: NaiveDateTime,
    pub query: String,
    pub issue_rows: usize,
    pub changelog_rows: usize,
}

impl RunRecord {
    pub fn to_tsv(&self) -> String {
        let names: Vec<&str> = RUN_COLUMNS.iter().map(|(name, _)| *name).collect();
        let row = vec![
            format_datetime(&self.finished_at),
            format_datetime(&self.watermark),
            self.query.clone(),
            self.issue_rows.to_string(),
            self.changelog_rows.to_string(),
        ];
        tsv::encode(&names, &[row])
    }
}

/// Names of every object the sync owns. Identifiers are validated by the
/// configuration layer before they reach this module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaNames {
    pub database: String,
    pub issues_table: String,
    pub changelog_table: String,
    pub runs_table: String,
    pub cluster: Option<String>,
}

impl SchemaNames {
    pub fn issues_view(&self) -> String {
        format!("{}{}", self.issues_table, LATEST_VIEW_SUFFIX)
    }

    pub fn changelog_view(&self) -> String {
        format!("{}{}", self.changelog_table, LATEST_VIEW_SUFFIX)
    }

    fn qualified(&self, object: &str) -> String {
        format!("{}.{}", quote_ident(&self.database), quote_ident(object))
    }

    fn on_cluster(&self) -> String {
        match &self.cluster {
            Some(cluster) => format!(" ON CLUSTER {}", quote_literal(cluster)),
            None => String::new(),
        }
    }

    fn replica_path(&self, table: &str) -> String {
        quote_literal(&format!("/clickhouse/tables/{{shard}}/{}.{}", self.database, table))
    }

    fn engine(&self, table: &str) -> String {
        let version = quote_ident(VERSION_COLUMN);
        match self.cluster {
            Some(_) => format!(
                "ReplicatedReplacingMergeTree({}, '{{replica}}', {})",
                self.replica_path(table),
                version
            ),
            None => format!("ReplacingMergeTree({})", version),
        }
    }

    fn plain_engine(&self, table: &str) -> String {
        match self.cluster {
            Some(_) => format!("ReplicatedMergeTree({}, '{{replica}}')", self.replica_path(table)),
            None => "MergeTree".to_string(),
        }
    }
}

fn column_list(columns: &[Column]) -> String {
    columns
        .iter()
        .map(|c| format!("    {} {}", quote_ident(c.name), c.sql_type()))
        .collect::<Vec<_>>()
        .join(",\n")
}

fn key_list(keys: &[&str]) -> String {
    keys.iter()
        .map(|k| quote_ident(k))
        .collect::<Vec<_>>()
        .join(", ")
}

fn create_table(names: &SchemaNames, table: &str, columns: &[Column], order_by: &[&str]) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {}{}\n(\n{}\n)\nENGINE = {}\nORDER BY ({})",
        names.qualified(table),
        names.on_cluster(),
        column_list(columns),
        names.engine(table),
        key_list(order_by)
    )
}

/// Issues: one versioned snapshot per sync, collapsed by `id`.
pub fn issues_table_ddl(names: &SchemaNames) -> String {
    create_table(names, &names.issues_table, ISSUE_COLUMNS, &["id"])
}

/// Changelog: identity is (issue, field, version).
pub fn changelog_table_ddl(names: &SchemaNames) -> String {
    create_table(
        names,
        &names.changelog_table,
        CHANGELOG_COLUMNS,
        &["issue_id", "field_id", VERSION_COLUMN],
    )
}

/// Runs: one row per run that loaded both tables. Append-only.
pub fn runs_table_ddl(names: &SchemaNames) -> String {
    let columns = RUN_COLUMNS
        .iter()
        .map(|(name, sql_type)| format!("    {} {}", quote_ident(name), sql_type))
        .collect::<Vec<_>>()
        .join(",\n");
    format!(
        "CREATE TABLE IF NOT EXISTS {}{}\n(\n{}\n)\nENGINE = {}\nORDER BY ({})",
        names.qualified(&names.runs_table),
        names.on_cluster(),
        columns,
        names.plain_engine(&names.runs_table),
        quote_ident(RUN_COLUMNS[0].0)
    )
}

/// View keeping only the most recent row per `partition_by` key.
pub fn latest_view_ddl(names: &SchemaNames, view: &str, table: &str, partition_by: &[&str]) -> String {
    format!(
        "CREATE VIEW IF NOT EXISTS {}{} AS\nSELECT * EXCEPT ({rank})\nFROM\n(\n    SELECT *, row_number() OVER (PARTITION BY {} ORDER BY {} DESC) AS {rank}\n    FROM {}\n)\nWHERE {rank} = 1",
        names.qualified(view),
        names.on_cluster(),
        key_list(partition_by),
        quote_ident(VERSION_COLUMN),
        names.qualified(table),
        rank = RANK_COLUMN
    )
}

pub fn issues_view_ddl(names: &SchemaNames) -> String {
    latest_view_ddl(names, &names.issues_view(), &names.issues_table, &["id"])
}

pub fn changelog_view_ddl(names: &SchemaNames) -> String {
    latest_view_ddl(
        names,
        &names.changelog_view(),
        &names.changelog_table,
        &["issue_id", "field_display"],
    )
}

/// Statements creating every table and then the views, in dependency order.
pub fn create_statements(names: &SchemaNames) -> Vec<String> {
    vec![
        issues_table_ddl(names),
        changelog_table_ddl(names),
        runs_table_ddl(names),
        issues_view_ddl(names),
        changelog_view_ddl(names),
    ]
}

/// Statements dropping views before the tables they read from. The runs
/// table goes too, so the next run starts from the initial lookback.
pub fn drop_statements(names: &SchemaNames) -> Vec<String> {
    let cluster = names.on_cluster();
    vec![
        format!("DROP VIEW IF EXISTS {}{}", names.qualified(&names.issues_view()), cluster),
        format!("DROP VIEW IF EXISTS {}{}", names.qualified(&names.changelog_view()), cluster),
        format!("DROP TABLE IF EXISTS {}{}", names.qualified(&names.issues_table), cluster),
        format!("DROP TABLE IF EXISTS {}{}", names.qualified(&names.changelog_table), cluster),
        format!("DROP TABLE IF EXISTS {}{}", names.qualified(&names.runs_table), cluster),
    ]
}

/// Create tables and views if missing. With `drop_existing` everything is
/// dropped first, discarding all synced history.
pub async fn init_schema(client: &ClickHouseClient, names: &SchemaNames, drop_existing: bool) -> Result<()> {
    if drop_existing {
        tracing::warn!(
            database = %names.database,
            issues = %names.issues_table,
            changelog = %names.changelog_table,
            runs = %names.runs_table,
            "dropping existing tables and views"
        );
        for statement in drop_statements(names) {
            client.execute(&statement).await?;
        }
    }

    for statement in create_statements(names) {
        client.execute(&statement).await?;
    }

    tracing::info!(
        database = %names.database,
        issues = %names.issues_table,
        changelog = %names.changelog_table,
        "schema ready"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::clickhouse::test_support::sink_config;
    use wiremock::matchers::{body_string_contains, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn names(cluster: Option<&str>) -> SchemaNames {
        SchemaNames {
            database: "tracker".to_string(),
            issues_table: "issues".to_string(),
            changelog_table: "issues_changelog".to_string(),
            runs_table: "issues_sync_runs".to_string(),
            cluster: cluster.map(str::to_string),
        }
    }

    #[test]
    fn test_issues_table_ddl() {
        let ddl = issues_table_ddl(&names(None));
        assert!(ddl.starts_with("CREATE TABLE IF NOT EXISTS `tracker`.`issues`\n("));
        assert!(ddl.contains("    `organization_id` String,\n"));
        assert!(ddl.contains("    `updatedAt` DateTime64(3, 'UTC'),\n"));
        assert!(ddl.contains("    `storyPoints` Nullable(Decimal(15, 2)),\n"));
        assert!(ddl.ends_with("ENGINE = ReplacingMergeTree(`updatedAt`)\nORDER BY (`id`)"));
    }

    #[test]
    fn test_changelog_table_ordering_key() {
        let ddl = changelog_table_ddl(&names(None));
        assert!(ddl.contains("ORDER BY (`issue_id`, `field_id`, `updatedAt`)"));
        assert!(ddl.contains("    `worklog` String\n)"));
    }

    #[test]
    fn test_cluster_ddl_uses_replicated_engine() {
        let ddl = issues_table_ddl(&names(Some("{cluster}")));
        assert!(ddl.contains("`tracker`.`issues` ON CLUSTER '{cluster}'\n"));
        assert!(ddl.contains(
            "ENGINE = ReplicatedReplacingMergeTree('/clickhouse/tables/{shard}/tracker.issues', '{replica}', `updatedAt`)"
        ));
    }

    #[test]
    fn test_latest_views() {
        let issues = issues_view_ddl(&names(None));
        assert!(issues.starts_with("CREATE VIEW IF NOT EXISTS `tracker`.`issues_latest` AS\n"));
        assert!(issues.contains("SELECT * EXCEPT (_rank)"));
        assert!(issues.contains("PARTITION BY `id` ORDER BY `updatedAt` DESC"));
        assert!(issues.contains("FROM `tracker`.`issues`\n"));
        assert!(issues.ends_with("WHERE _rank = 1"));

        let changelog = changelog_view_ddl(&names(None));
        assert!(changelog.contains("PARTITION BY `issue_id`, `field_display` ORDER BY `updatedAt` DESC"));
    }

    #[test]
    fn test_drop_views_before_tables() {
        let drops = drop_statements(&names(Some("main")));
        assert_eq!(drops.len(), 5);
        assert!(drops[0].starts_with("DROP VIEW IF EXISTS `tracker`.`issues_latest`"));
        assert!(drops[3].starts_with("DROP TABLE IF EXISTS `tracker`.`issues_changelog`"));
        assert!(drops[4].starts_with("DROP TABLE IF EXISTS `tracker`.`issues_sync_runs`"));
        assert!(drops.iter().all(|d| d.ends_with(" ON CLUSTER 'main'")));
    }

    #[test]
    fn test_runs_table_ddl() {
        let ddl = runs_table_ddl(&names(None));
        assert!(ddl.starts_with("CREATE TABLE IF NOT EXISTS `tracker`.`issues_sync_runs`\n("));
        assert!(ddl.contains("    `watermark` DateTime64(3, 'UTC'),\n"));
        assert!(ddl.contains("    `changelog_rows` UInt64\n)"));
        assert!(ddl.ends_with("ENGINE = MergeTree\nORDER BY (`finishedAt`)"));

        let replicated = runs_table_ddl(&names(Some("main")));
        assert!(replicated.contains(
            "ENGINE = ReplicatedMergeTree('/clickhouse/tables/{shard}/tracker.issues_sync_runs', '{replica}')"
        ));
    }

    #[test]
    fn test_run_record_tsv() {
        let at = |h| {
            chrono::NaiveDate::from_ymd_opt(2024, 5, 2)
                .unwrap()
                .and_hms_opt(h, 30, 0)
                .unwrap()
        };
        let record = RunRecord {
            finished_at: at(12),
            watermark: at(11),
            query: "updated: >now()-365d".to_string(),
            issue_rows: 2,
            changelog_rows: 3,
        };
        assert_eq!(
            record.to_tsv(),
            "finishedAt\twatermark\tquery\tissue_rows\tchangelog_rows\n\
             2024-05-02 12:30:00.000\t2024-05-02 11:30:00.000\tupdated: >now()-365d\t2\t3\n"
        );
    }

    #[tokio::test]
    async fn init_schema_creates_five_objects() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("CREATE"))
            .respond_with(ResponseTemplate::new(200))
            .expect(5)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_string_contains("DROP"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = ClickHouseClient::new(&sink_config(&server.uri())).unwrap();
        init_schema(&client, &names(None), false).await.unwrap();
    }

    #[tokio::test]
    async fn init_schema_drops_first_when_asked() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(10)
            .mount(&server)
            .await;

        let client = ClickHouseClient::new(&sink_config(&server.uri())).unwrap();
        init_schema(&client, &names(None), true).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let first = String::from_utf8(requests[0].body.clone()).unwrap();
        assert!(first.starts_with("DROP VIEW"), "got: {first}");
    }
}
