// ABOUTME: ClickHouse HTTP interface client - statements, bulk TSV inserts, watermark reads
// ABOUTME: Header authentication, optional CA bundle, explicit request timeout

use chrono::NaiveDateTime;
use reqwest::{Certificate, Client, RequestBuilder};

use super::schema::{RunRecord, RUN_WATERMARK_COLUMN};
use super::tsv;
use crate::config::SinkConfig;
use crate::error::{Result, SyncError};
use crate::shape::columns::VERSION_COLUMN;
use crate::shape::ShapedTable;
use crate::utils::quote_ident;

const SERVICE: &str = "clickhouse";

const USER_HEADER: &str = "X-ClickHouse-User";
const KEY_HEADER: &str = "X-ClickHouse-Key";

/// Layout ClickHouse uses for DateTime64 values in text output.
const RESULT_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

pub struct ClickHouseClient {
    client: Client,
    base_url: String,
    database: String,
    user: String,
    password: String,
}

impl ClickHouseClient {
    pub fn new(config: &SinkConfig) -> Result<Self> {
        let mut builder = Client::builder().timeout(config.timeout);

        if let Some(path) = &config.ca_cert {
            let pem = std::fs::read(path).map_err(|e| {
                SyncError::Config(format!("cannot read CA bundle {}: {}", path.display(), e))
            })?;
            let cert = Certificate::from_pem(&pem).map_err(|e| {
                SyncError::Config(format!("invalid CA bundle {}: {}", path.display(), e))
            })?;
            builder = builder
                .tls_built_in_root_certs(false)
                .add_root_certificate(cert);
        }

        let client = builder.build().map_err(|source| SyncError::Request {
            service: SERVICE,
            source,
        })?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            database: config.database.clone(),
            user: config.user.clone(),
            password: config.password.clone(),
        })
    }

    fn post(&self) -> RequestBuilder {
        self.client
            .post(&self.base_url)
            .query(&[("database", self.database.as_str())])
            .header(USER_HEADER, &self.user)
            .header(KEY_HEADER, &self.password)
    }

    async fn send(&self, request: RequestBuilder) -> Result<String> {
        let response = request.send().await.map_err(|source| SyncError::Request {
            service: SERVICE,
            source,
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|source| SyncError::Request {
            service: SERVICE,
            source,
        })?;

        if !status.is_success() {
            tracing::error!(%status, "clickhouse request failed");
            return Err(SyncError::Transport {
                service: SERVICE,
                status,
                body: body.trim().to_string(),
            });
        }

        Ok(body)
    }

    /// Run one statement and return the raw response text.
    pub async fn execute(&self, query: &str) -> Result<String> {
        tracing::debug!(query, "executing clickhouse statement");
        self.send(self.post().body(query.to_string())).await
    }

    /// Bulk insert a TabSeparatedWithNames payload.
    ///
    /// Empty fields take the column default, so blank numbers land as NULL.
    pub async fn insert_tsv(&self, table: &str, payload: String) -> Result<()> {
        let insert = format!("INSERT INTO {} FORMAT TabSeparatedWithNames", quote_ident(table));
        let request = self
            .post()
            .query(&[
                ("query", insert.as_str()),
                ("input_format_tsv_empty_as_default", "1"),
            ])
            .body(payload);
        self.send(request).await?;
        Ok(())
    }

    /// Insert all rows of a shaped table. Returns the number of rows sent.
    pub async fn load(&self, table: &str, rows: &ShapedTable) -> Result<usize> {
        if rows.is_empty() {
            tracing::info!(table, "nothing to load");
            return Ok(0);
        }
        self.insert_tsv(table, rows.to_tsv()).await?;
        tracing::info!(table, rows = rows.len(), "loaded rows");
        Ok(rows.len())
    }

    /// Largest `updatedAt` in `table`, or `None` when the server returns no value.
    ///
    /// An empty table reports the epoch, which is returned as-is.
    pub async fn max_updated_at(&self, table: &str) -> Result<Option<NaiveDateTime>> {
        self.max_datetime(table, VERSION_COLUMN).await
    }

    /// Watermark of the last run that loaded both tables, from the runs table.
    pub async fn committed_watermark(&self, runs_table: &str) -> Result<Option<NaiveDateTime>> {
        self.max_datetime(runs_table, RUN_WATERMARK_COLUMN).await
    }

    /// Append one completed-run row.
    pub async fn record_run(&self, runs_table: &str, record: &RunRecord) -> Result<()> {
        self.insert_tsv(runs_table, record.to_tsv()).await?;
        tracing::debug!(table = runs_table, watermark = %record.watermark, "recorded completed run");
        Ok(())
    }

    async fn max_datetime(&self, table: &str, column: &str) -> Result<Option<NaiveDateTime>> {
        let query = format!(
            "SELECT max({}) FROM {} FORMAT TabSeparated",
            quote_ident(column),
            quote_ident(table)
        );
        let body = self.execute(&query).await?;
        let rows = tsv::parse(&body).map_err(SyncError::Protocol)?;

        let Some(value) = rows.first().and_then(|row| row.first()) else {
            return Ok(None);
        };
        let value = value.trim();
        if value.is_empty() || value == "\\N" {
            return Ok(None);
        }

        NaiveDateTime::parse_from_str(value, RESULT_DATETIME_FORMAT)
            .map(Some)
            .map_err(|e| {
                SyncError::Protocol(format!("cannot parse max({}) '{}': {}", column, value, e))
            })
    }
}
