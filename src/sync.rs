// ABOUTME: Sync orchestrator - runs one import from schema init to the final load
// ABOUTME: Linear stages, each raced against shutdown and the optional run deadline

use std::future::Future;
use std::time::Duration;

use chrono::{NaiveDateTime, Utc};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::Instant;

use crate::config::SyncConfig;
use crate::error::{Result, Stage, SyncError};
use crate::shape::{shape_changelog, shape_issues};
use crate::sink::{init_schema, ClickHouseClient, RunRecord};
use crate::tracker::{issue_refs, TrackerClient};
use crate::watermark::{compose_query, epoch_sentinel, resolve_query_window};

/// What a run got done. On failure this is the progress up to the failed stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Tracker query the run used.
    pub query: Option<String>,
    pub issues_fetched: usize,
    pub changelog_entries: usize,
    /// Issue keys whose changelog was skipped after a fetch error.
    pub skipped_changelogs: Vec<String>,
    pub issue_rows_loaded: usize,
    pub changelog_rows_loaded: usize,
    /// Watermark recorded for the next run. `None` when this run did not
    /// commit one, so the next run repeats its window.
    pub committed_watermark: Option<NaiveDateTime>,
    pub duration_ms: u64,
}

/// A run that ended in the FAILED state.
#[derive(Debug, thiserror::Error)]
#[error("sync failed during {stage}: {error}")]
pub struct RunFailure {
    pub stage: Stage,
    #[source]
    pub error: SyncError,
    pub report: SyncReport,
}

/// Executes one sync run against the configured tracker and sink.
///
/// Stages run strictly in order:
/// 1. create tables and views if missing
/// 2. read the watermark and build the query window
/// 3. drain the issue search
/// 4. fetch every issue's changelog
/// 5. shape both record sets
/// 6. load issues, then changelog, then record the run
///
/// The next run's window comes only from recorded runs. A run that fails
/// after inserting issues, or that skipped changelogs, records nothing.
/// Nothing is retried; the caller re-runs the whole sync.
pub struct SyncRunner<'a> {
    config: &'a SyncConfig,
    tracker: TrackerClient,
    sink: ClickHouseClient,
}

struct StageGuard {
    shutdown: broadcast::Receiver<()>,
    deadline: Option<Instant>,
    timeout: Option<Duration>,
}

impl StageGuard {
    async fn run<T>(&mut self, stage: Stage, work: impl Future<Output = Result<T>>) -> Result<T> {
        tracing::info!(stage = %stage, "stage started");
        let deadline = self.deadline;
        let timeout = self.timeout.unwrap_or_default();
        let shutdown = &mut self.shutdown;

        tokio::select! {
            biased;

            _ = shutdown_signal(shutdown) => {
                tracing::warn!(stage = %stage, "shutdown signal received, aborting run");
                Err(SyncError::Deadline {
                    stage,
                    reason: "shutdown signal received".to_string(),
                })
            }
            _ = deadline_reached(deadline) => {
                tracing::warn!(stage = %stage, "run deadline reached, aborting run");
                Err(SyncError::Deadline {
                    stage,
                    reason: format!("run timeout of {:?} exceeded", timeout),
                })
            }
            result = work => result,
        }
    }
}

async fn shutdown_signal(shutdown: &mut broadcast::Receiver<()>) {
    match shutdown.recv().await {
        Ok(()) | Err(RecvError::Lagged(_)) => {}
        // Sender gone: nobody can ask for a shutdown any more.
        Err(RecvError::Closed) => std::future::pending::<()>().await,
    }
}

async fn deadline_reached(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

impl<'a> SyncRunner<'a> {
    pub fn new(config: &'a SyncConfig) -> Result<Self> {
        Ok(Self {
            config,
            tracker: TrackerClient::new(config.tracker.clone())?,
            sink: ClickHouseClient::new(&config.sink)?,
        })
    }

    /// Run every stage once. Returns the report, or the failed stage with the
    /// progress made before it.
    pub async fn run(
        &self,
        shutdown: broadcast::Receiver<()>,
    ) -> std::result::Result<SyncReport, RunFailure> {
        let started = Instant::now();
        let timeout = self.config.sync.run_timeout;
        let mut guard = StageGuard {
            shutdown,
            deadline: timeout.map(|t| started + t),
            timeout,
        };
        let mut report = SyncReport::default();

        let result = self.run_stages(&mut guard, &mut report).await;
        report.duration_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(()) => {
                tracing::info!(
                    issues = report.issue_rows_loaded,
                    changelog = report.changelog_rows_loaded,
                    skipped = report.skipped_changelogs.len(),
                    duration_ms = report.duration_ms,
                    "sync complete"
                );
                Ok(report)
            }
            Err((stage, error)) => {
                tracing::error!(stage = %stage, error = %error, "sync failed");
                Err(RunFailure {
                    stage,
                    error,
                    report,
                })
            }
        }
    }

    async fn run_stages(
        &self,
        guard: &mut StageGuard,
        report: &mut SyncReport,
    ) -> std::result::Result<(), (Stage, SyncError)> {
        let config = self.config;
        let names = config.sink.schema_names();
        let at = |stage: Stage| move |error: SyncError| (stage, error);

        guard
            .run(Stage::InitSchema, init_schema(&self.sink, &names, false))
            .await
            .map_err(at(Stage::InitSchema))?;

        let window = guard
            .run(
                Stage::ResolveWatermark,
                resolve_query_window(&self.sink, &config.sink.runs_table, config.sync.initial_depth),
            )
            .await
            .map_err(at(Stage::ResolveWatermark))?;
        let query = compose_query(&window, config.tracker.query_filter.as_deref());
        report.query = Some(query.clone());

        let issues = guard
            .run(Stage::FetchIssues, self.tracker.fetch_all(&query))
            .await
            .map_err(at(Stage::FetchIssues))?;
        report.issues_fetched = issues.len();

        let refs = issue_refs(&issues).map_err(at(Stage::FetchChangelog))?;
        let batch = guard
            .run(
                Stage::FetchChangelog,
                self.tracker.fetch_changelogs(
                    &refs,
                    config.sync.on_changelog_error,
                    config.sync.changelog_concurrency,
                ),
            )
            .await
            .map_err(at(Stage::FetchChangelog))?;
        report.changelog_entries = batch.entry_count();
        report.skipped_changelogs = batch.failed.clone();

        tracing::info!(stage = %Stage::Shape, "stage started");
        let org_id = &config.tracker.org_id;
        let issue_rows =
            shape_issues(&issues, org_id, &config.sync.shape).map_err(at(Stage::Shape))?;
        let changelog_rows = shape_changelog(&batch.changelogs, org_id, &config.sync.shape)
            .map_err(at(Stage::Shape))?;

        report.issue_rows_loaded = guard
            .run(Stage::Load, self.sink.load(&config.sink.issues_table, &issue_rows))
            .await
            .map_err(at(Stage::Load))?;

        match guard
            .run(Stage::Load, self.sink.load(&config.sink.changelog_table, &changelog_rows))
            .await
        {
            Ok(rows) => report.changelog_rows_loaded = rows,
            Err(error) if report.issue_rows_loaded > 0 => {
                return Err((
                    Stage::Load,
                    SyncError::PartialLoad {
                        loaded: config.sink.issues_table.clone(),
                        rows: report.issue_rows_loaded,
                        failed: config.sink.changelog_table.clone(),
                        source: Box::new(error),
                    },
                ));
            }
            Err(error) => return Err((Stage::Load, error)),
        }

        if report.skipped_changelogs.is_empty() {
            let watermark = guard
                .run(Stage::Load, self.commit_run(&query, report))
                .await
                .map_err(at(Stage::Load))?;
            report.committed_watermark = Some(watermark);
        } else {
            tracing::warn!(
                skipped = report.skipped_changelogs.len(),
                "changelogs were skipped, watermark not advanced"
            );
        }

        tracing::info!(stage = %Stage::Done, "all stages finished");
        Ok(())
    }

    /// Record the run once both loads succeeded. The recorded watermark is the
    /// issues table maximum at this point, which now has every changelog behind it.
    async fn commit_run(&self, query: &str, report: &SyncReport) -> Result<NaiveDateTime> {
        let sink = &self.config.sink;
        let watermark = self
            .sink
            .max_updated_at(&sink.issues_table)
            .await?
            .unwrap_or_else(epoch_sentinel);
        let record = RunRecord {
            finished_at: Utc::now().naive_utc(),
            watermark,
            query: query.to_string(),
            issue_rows: report.issue_rows_loaded,
            changelog_rows: report.changelog_rows_loaded,
        };
        self.sink.record_run(&sink.runs_table, &record).await?;
        tracing::info!(%watermark, "watermark committed");
        Ok(watermark)
    }
}
