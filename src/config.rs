// ABOUTME: Command-line and environment configuration for tracker imports
// ABOUTME: Parsed once by clap, validated into an immutable SyncConfig passed by reference

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use clap::Args;

use crate::error::{Result, SyncError};
use crate::shape::{MissingNumbers, ShapeOptions};
use crate::sink::SchemaNames;
use crate::tracker::{OnChangelogError, OrgHeader};
use crate::utils::{validate_cluster_name, validate_identifier};
use crate::watermark::HistoryDepth;

pub const DEFAULT_TRACKER_API_URL: &str = "https://api.tracker.yandex.net/v2/issues";
pub const DEFAULT_CLICKHOUSE_PORT: u16 = 8443;

#[derive(Args, Clone)]
pub struct TrackerArgs {
    /// Tracker issues API base URL
    #[arg(long, env = "TRACKER_API_URL", default_value = DEFAULT_TRACKER_API_URL)]
    pub tracker_api_url: String,
    /// Tracker organization id
    #[arg(long, env = "TRACKER_ORG_ID")]
    pub org_id: String,
    /// Send the organization id as X-Cloud-Org-ID instead of X-Org-ID
    #[arg(long, env = "TRACKER_CLOUD_ORG")]
    pub cloud_org: bool,
    /// OAuth token for the tracker API
    #[arg(long, env = "TRACKER_OAUTH_TOKEN", hide_env_values = true)]
    pub oauth_token: String,
    /// Extra tracker query conditions, combined with the sync window
    #[arg(long, env = "TRACKER_QUERY_TEXT")]
    pub query_filter: Option<String>,
    /// Issues per scroll page
    #[arg(long, env = "TRACKER_PER_SCROLL", default_value_t = 100)]
    pub per_scroll: u32,
    /// Lifetime of a scroll cursor in milliseconds
    #[arg(long, env = "TRACKER_SCROLL_TTL_MS", default_value_t = 10_000)]
    pub scroll_ttl_ms: u64,
    /// Changelog entries per page
    #[arg(long, env = "TRACKER_CHANGELOG_PER_PAGE", default_value_t = 50)]
    pub changelog_per_page: u32,
    /// Changelog entry types to fetch (repeatable, or comma-separated in the environment)
    #[arg(
        long = "changelog-type",
        env = "TRACKER_CHANGELOG_TYPES",
        value_delimiter = ',',
        default_value = "IssueWorkflow"
    )]
    pub changelog_types: Vec<String>,
    /// Upper bound on pages fetched for one scroll or one changelog
    #[arg(long, env = "TRACKER_MAX_PAGES", default_value_t = 10_000)]
    pub max_pages: usize,
    /// Timeout for each tracker request in seconds
    #[arg(long, env = "TRACKER_TIMEOUT_SECS", default_value_t = 30)]
    pub tracker_timeout_secs: u64,
}

#[derive(Args, Clone)]
pub struct SinkArgs {
    /// ClickHouse host name
    #[arg(long, env = "CH_HOST")]
    pub ch_host: Option<String>,
    /// ClickHouse HTTPS port
    #[arg(long, env = "CH_PORT", default_value_t = DEFAULT_CLICKHOUSE_PORT)]
    pub ch_port: u16,
    /// Full ClickHouse HTTP URL, overrides --ch-host and --ch-port
    #[arg(long, env = "CH_URL")]
    pub ch_url: Option<String>,
    /// ClickHouse database
    #[arg(long, env = "CH_DB")]
    pub ch_db: String,
    /// ClickHouse user
    #[arg(long, env = "CH_USER")]
    pub ch_user: String,
    /// ClickHouse password
    #[arg(long, env = "CH_PASSWORD", hide_env_values = true)]
    pub ch_password: String,
    /// PEM bundle to verify the ClickHouse certificate against
    #[arg(long, env = "CH_CA_CERT")]
    pub ch_ca_cert: Option<PathBuf>,
    /// Timeout for each ClickHouse request in seconds
    #[arg(long, env = "CH_TIMEOUT_SECS", default_value_t = 1500)]
    pub ch_timeout_secs: u64,
    /// Issues table
    #[arg(long, env = "CH_TABLE", default_value = "issues")]
    pub issues_table: String,
    /// Changelog table
    #[arg(long, env = "CH_CHANGELOG_TABLE", default_value = "issues_changelog")]
    pub changelog_table: String,
    /// Completed-run table; its newest watermark bounds the next run
    #[arg(long, env = "CH_RUNS_TABLE", default_value = "issues_sync_runs")]
    pub runs_table: String,
    /// Cluster for ON CLUSTER DDL, e.g. '{cluster}'
    #[arg(long, env = "CH_CLUSTER")]
    pub ch_cluster: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct SyncArgs {
    /// History to import when the sink is empty, e.g. 30d, 12h, "6 months"
    #[arg(long, env = "TRACKER_INITIAL_HISTORY_DEPTH")]
    pub initial_history_depth: Option<HistoryDepth>,
    /// What to do when one issue's changelog cannot be fetched
    #[arg(
        long,
        env = "TRACKER_ON_CHANGELOG_ERROR",
        value_enum,
        default_value_t = OnChangelogError::Abort
    )]
    pub on_changelog_error: OnChangelogError,
    /// Number of changelog requests in flight
    #[arg(long, env = "TRACKER_CHANGELOG_CONCURRENCY", default_value_t = 1)]
    pub changelog_concurrency: usize,
    /// How missing numeric values are written
    #[arg(
        long,
        env = "TRACKER_MISSING_NUMBERS",
        value_enum,
        default_value_t = MissingNumbers::Blank
    )]
    pub missing_numbers: MissingNumbers,
    /// Fail on unparseable dates instead of writing the epoch
    #[arg(long, env = "TRACKER_STRICT_DATES")]
    pub strict_dates: bool,
    /// Abort the whole run after this many seconds
    #[arg(long, env = "TRACKER_RUN_TIMEOUT_SECS")]
    pub run_timeout_secs: Option<u64>,
}

#[derive(Clone)]
pub struct TrackerConfig {
    pub api_url: String,
    pub org_id: String,
    pub org_header: OrgHeader,
    pub oauth_token: String,
    pub query_filter: Option<String>,
    pub per_scroll: u32,
    pub scroll_ttl_ms: u64,
    pub changelog_per_page: u32,
    pub changelog_types: Vec<String>,
    pub max_pages: usize,
    pub timeout: Duration,
}

impl fmt::Debug for TrackerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackerConfig")
            .field("api_url", &self.api_url)
            .field("org_id", &self.org_id)
            .field("org_header", &self.org_header)
            .field("oauth_token", &"<redacted>")
            .field("query_filter", &self.query_filter)
            .field("per_scroll", &self.per_scroll)
            .field("scroll_ttl_ms", &self.scroll_ttl_ms)
            .field("changelog_per_page", &self.changelog_per_page)
            .field("changelog_types", &self.changelog_types)
            .field("max_pages", &self.max_pages)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Clone)]
pub struct SinkConfig {
    /// HTTP interface URL, e.g. `https://host:8443/`.
    pub base_url: String,
    pub database: String,
    pub user: String,
    pub password: String,
    pub ca_cert: Option<PathBuf>,
    pub timeout: Duration,
    pub issues_table: String,
    pub changelog_table: String,
    /// Completed-run markers; the watermark is read from here.
    pub runs_table: String,
    pub cluster: Option<String>,
}

impl SinkConfig {
    pub fn schema_names(&self) -> SchemaNames {
        SchemaNames {
            database: self.database.clone(),
            issues_table: self.issues_table.clone(),
            changelog_table: self.changelog_table.clone(),
            runs_table: self.runs_table.clone(),
            cluster: self.cluster.clone(),
        }
    }
}

impl fmt::Debug for SinkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkConfig")
            .field("base_url", &self.base_url)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("ca_cert", &self.ca_cert)
            .field("timeout", &self.timeout)
            .field("issues_table", &self.issues_table)
            .field("changelog_table", &self.changelog_table)
            .field("runs_table", &self.runs_table)
            .field("cluster", &self.cluster)
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    pub initial_depth: Option<HistoryDepth>,
    pub on_changelog_error: OnChangelogError,
    pub changelog_concurrency: usize,
    pub shape: ShapeOptions,
    pub run_timeout: Option<Duration>,
}

/// Everything a sync run needs, validated once at startup.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub tracker: TrackerConfig,
    pub sink: SinkConfig,
    pub sync: SyncOptions,
}

impl SyncConfig {
    pub fn from_args(tracker: TrackerArgs, sink: SinkArgs, sync: SyncArgs) -> Result<Self> {
        Ok(Self {
            tracker: tracker.into_config()?,
            sink: sink.into_config()?,
            sync: sync.into_options()?,
        })
    }
}

fn require_non_empty(name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(SyncError::Config(format!("{} must not be empty", name)));
    }
    Ok(())
}

fn require_positive(name: &str, value: u64) -> Result<()> {
    if value == 0 {
        return Err(SyncError::Config(format!("{} must be greater than zero", name)));
    }
    Ok(())
}

fn validate_url(name: &str, value: &str) -> Result<()> {
    let parsed = url::Url::parse(value)
        .map_err(|e| SyncError::Config(format!("{} '{}' is not a valid URL: {}", name, value, e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(SyncError::Config(format!(
            "{} must use http or https, not '{}'",
            name, other
        ))),
    }
}

fn check_identifier(name: &str, value: &str) -> Result<()> {
    validate_identifier(value).map_err(|e| SyncError::Config(format!("{}: {}", name, e)))
}

impl TrackerArgs {
    pub fn into_config(self) -> Result<TrackerConfig> {
        validate_url("--tracker-api-url", &self.tracker_api_url)?;
        require_non_empty("--org-id", &self.org_id)?;
        require_non_empty("--oauth-token", &self.oauth_token)?;
        require_positive("--per-scroll", self.per_scroll.into())?;
        require_positive("--changelog-per-page", self.changelog_per_page.into())?;
        require_positive("--max-pages", self.max_pages as u64)?;
        require_positive("--tracker-timeout-secs", self.tracker_timeout_secs)?;

        let changelog_types: Vec<String> = self
            .changelog_types
            .iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        if changelog_types.is_empty() {
            return Err(SyncError::Config(
                "at least one --changelog-type is required".to_string(),
            ));
        }

        Ok(TrackerConfig {
            api_url: self.tracker_api_url.trim_end_matches('/').to_string(),
            org_id: self.org_id.trim().to_string(),
            org_header: if self.cloud_org {
                OrgHeader::Cloud
            } else {
                OrgHeader::Org
            },
            oauth_token: self.oauth_token,
            query_filter: self
                .query_filter
                .map(|q| q.trim().to_string())
                .filter(|q| !q.is_empty()),
            per_scroll: self.per_scroll,
            scroll_ttl_ms: self.scroll_ttl_ms,
            changelog_per_page: self.changelog_per_page,
            changelog_types,
            max_pages: self.max_pages,
            timeout: Duration::from_secs(self.tracker_timeout_secs),
        })
    }
}

impl SinkArgs {
    /// Base URL of the HTTP interface: `--ch-url` verbatim, else `https://host:port/`.
    pub fn base_url(&self) -> Result<String> {
        let url = match (&self.ch_url, &self.ch_host) {
            (Some(url), _) => url.trim().to_string(),
            (None, Some(host)) if !host.trim().is_empty() => {
                format!("https://{}:{}/", host.trim(), self.ch_port)
            }
            _ => {
                return Err(SyncError::Config(
                    "either --ch-host (CH_HOST) or --ch-url (CH_URL) is required".to_string(),
                ))
            }
        };
        validate_url("ClickHouse URL", &url)?;
        Ok(url)
    }

    pub fn into_config(self) -> Result<SinkConfig> {
        let base_url = self.base_url()?;
        check_identifier("--ch-db", &self.ch_db)?;
        check_identifier("--issues-table", &self.issues_table)?;
        check_identifier("--changelog-table", &self.changelog_table)?;
        check_identifier("--runs-table", &self.runs_table)?;
        if self.issues_table == self.changelog_table
            || self.runs_table == self.issues_table
            || self.runs_table == self.changelog_table
        {
            return Err(SyncError::Config(
                "--issues-table, --changelog-table and --runs-table must all differ".to_string(),
            ));
        }
        require_non_empty("--ch-user", &self.ch_user)?;
        require_positive("--ch-timeout-secs", self.ch_timeout_secs)?;

        let cluster = match self.ch_cluster.map(|c| c.trim().to_string()) {
            Some(c) if c.is_empty() => None,
            Some(c) => {
                validate_cluster_name(&c)
                    .map_err(|e| SyncError::Config(format!("--ch-cluster: {}", e)))?;
                Some(c)
            }
            None => None,
        };

        Ok(SinkConfig {
            base_url,
            database: self.ch_db,
            user: self.ch_user,
            password: self.ch_password,
            ca_cert: self.ch_ca_cert,
            timeout: Duration::from_secs(self.ch_timeout_secs),
            issues_table: self.issues_table,
            changelog_table: self.changelog_table,
            runs_table: self.runs_table,
            cluster,
        })
    }
}

impl SyncArgs {
    pub fn into_options(self) -> Result<SyncOptions> {
        require_positive("--changelog-concurrency", self.changelog_concurrency as u64)?;
        if let Some(secs) = self.run_timeout_secs {
            require_positive("--run-timeout-secs", secs)?;
        }

        Ok(SyncOptions {
            initial_depth: self.initial_history_depth,
            on_changelog_error: self.on_changelog_error,
            changelog_concurrency: self.changelog_concurrency,
            shape: ShapeOptions {
                missing_numbers: self.missing_numbers,
                strict_dates: self.strict_dates,
            },
            run_timeout: self.run_timeout_secs.map(Duration::from_secs),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const ENV_VARS: &[&str] = &[
        "TRACKER_API_URL",
        "TRACKER_ORG_ID",
        "TRACKER_OAUTH_TOKEN",
        "TRACKER_QUERY_TEXT",
        "TRACKER_INITIAL_HISTORY_DEPTH",
        "CH_HOST",
        "CH_PORT",
        "CH_URL",
        "CH_DB",
        "CH_USER",
        "CH_PASSWORD",
        "CH_CA_CERT",
        "CH_TABLE",
        "CH_CHANGELOG_TABLE",
        "CH_CLUSTER",
        "CH_RUNS_TABLE",
        "CH_TIMEOUT_SECS",
        "TRACKER_CLOUD_ORG",
        "TRACKER_PER_SCROLL",
        "TRACKER_SCROLL_TTL_MS",
        "TRACKER_CHANGELOG_PER_PAGE",
        "TRACKER_CHANGELOG_TYPES",
        "TRACKER_MAX_PAGES",
        "TRACKER_TIMEOUT_SECS",
        "TRACKER_ON_CHANGELOG_ERROR",
        "TRACKER_CHANGELOG_CONCURRENCY",
        "TRACKER_MISSING_NUMBERS",
        "TRACKER_STRICT_DATES",
        "TRACKER_RUN_TIMEOUT_SECS",
    ];

    fn clear_env() {
        for var in ENV_VARS {
            std::env::remove_var(var);
        }
    }

    #[derive(Parser)]
    #[command(args_override_self = true)]
    struct TestCli {
        #[command(flatten)]
        tracker: TrackerArgs,
        #[command(flatten)]
        sink: SinkArgs,
        #[command(flatten)]
        sync: SyncArgs,
    }

    const MINIMAL: &[&str] = &[
        "test",
        "--org-id",
        "org-1",
        "--oauth-token",
        "tok",
        "--ch-host",
        "ch.example",
        "--ch-db",
        "tracker",
        "--ch-user",
        "etl",
        "--ch-password",
        "pw",
    ];

    fn parse(extra: &[&str]) -> std::result::Result<TestCli, clap::Error> {
        TestCli::try_parse_from(MINIMAL.iter().chain(extra.iter()).copied())
    }

    fn build(extra: &[&str]) -> Result<SyncConfig> {
        let cli = parse(extra).unwrap();
        SyncConfig::from_args(cli.tracker, cli.sink, cli.sync)
    }

    #[test]
    fn test_defaults() {
        let _g = ENV_LOCK.lock().unwrap();
        clear_env();
        let config = build(&[]).unwrap();

        assert_eq!(config.tracker.api_url, DEFAULT_TRACKER_API_URL);
        assert_eq!(config.tracker.org_header, OrgHeader::Org);
        assert_eq!(config.tracker.per_scroll, 100);
        assert_eq!(config.tracker.scroll_ttl_ms, 10_000);
        assert_eq!(config.tracker.changelog_types, vec!["IssueWorkflow"]);
        assert_eq!(config.sink.base_url, "https://ch.example:8443/");
        assert_eq!(config.sink.timeout, Duration::from_secs(1500));
        assert_eq!(config.sink.issues_table, "issues");
        assert_eq!(config.sink.changelog_table, "issues_changelog");
        assert_eq!(config.sink.runs_table, "issues_sync_runs");
        assert_eq!(config.sync.on_changelog_error, OnChangelogError::Abort);
        assert_eq!(config.sync.changelog_concurrency, 1);
        assert_eq!(config.sync.shape.missing_numbers, MissingNumbers::Blank);
        assert!(config.sync.initial_depth.is_none());
        assert!(config.sync.run_timeout.is_none());
    }

    #[test]
    fn test_environment_variables() {
        let _g = ENV_LOCK.lock().unwrap();
        clear_env();
        std::env::set_var("TRACKER_ORG_ID", "env-org");
        std::env::set_var("TRACKER_OAUTH_TOKEN", "env-token");
        std::env::set_var("TRACKER_QUERY_TEXT", "Queue: OPS");
        std::env::set_var("TRACKER_INITIAL_HISTORY_DEPTH", "30d");
        std::env::set_var("CH_URL", "http://localhost:8123/");
        std::env::set_var("CH_DB", "analytics");
        std::env::set_var("CH_USER", "etl");
        std::env::set_var("CH_PASSWORD", "pw");
        std::env::set_var("CH_TABLE", "tracker_issues");
        std::env::set_var("CH_CLUSTER", "{cluster}");

        let cli = TestCli::try_parse_from(["test"]).unwrap();
        let config = SyncConfig::from_args(cli.tracker, cli.sink, cli.sync);
        clear_env();
        let config = config.unwrap();

        assert_eq!(config.tracker.org_id, "env-org");
        assert_eq!(config.tracker.query_filter.as_deref(), Some("Queue: OPS"));
        assert_eq!(config.sync.initial_depth, Some(HistoryDepth::days(30)));
        assert_eq!(config.sink.base_url, "http://localhost:8123/");
        assert_eq!(config.sink.database, "analytics");
        assert_eq!(config.sink.issues_table, "tracker_issues");
        assert_eq!(config.sink.cluster.as_deref(), Some("{cluster}"));
    }

    #[test]
    fn test_tuning_options_from_environment() {
        let _g = ENV_LOCK.lock().unwrap();
        clear_env();
        std::env::set_var("TRACKER_CLOUD_ORG", "true");
        std::env::set_var("TRACKER_PER_SCROLL", "500");
        std::env::set_var("TRACKER_SCROLL_TTL_MS", "60000");
        std::env::set_var("TRACKER_CHANGELOG_PER_PAGE", "100");
        std::env::set_var("TRACKER_CHANGELOG_TYPES", "IssueWorkflow,IssueCreated");
        std::env::set_var("TRACKER_MAX_PAGES", "50");
        std::env::set_var("TRACKER_TIMEOUT_SECS", "5");
        std::env::set_var("CH_TIMEOUT_SECS", "60");
        std::env::set_var("CH_RUNS_TABLE", "import_runs");
        std::env::set_var("TRACKER_ON_CHANGELOG_ERROR", "skip");
        std::env::set_var("TRACKER_CHANGELOG_CONCURRENCY", "4");
        std::env::set_var("TRACKER_MISSING_NUMBERS", "zero");
        std::env::set_var("TRACKER_STRICT_DATES", "true");
        std::env::set_var("TRACKER_RUN_TIMEOUT_SECS", "900");

        let config = build(&[]);
        clear_env();
        let config = config.unwrap();

        assert_eq!(config.tracker.org_header, OrgHeader::Cloud);
        assert_eq!(config.tracker.per_scroll, 500);
        assert_eq!(config.tracker.scroll_ttl_ms, 60_000);
        assert_eq!(config.tracker.changelog_per_page, 100);
        assert_eq!(config.tracker.changelog_types, vec!["IssueWorkflow", "IssueCreated"]);
        assert_eq!(config.tracker.max_pages, 50);
        assert_eq!(config.tracker.timeout, Duration::from_secs(5));
        assert_eq!(config.sink.timeout, Duration::from_secs(60));
        assert_eq!(config.sink.runs_table, "import_runs");
        assert_eq!(config.sync.on_changelog_error, OnChangelogError::Skip);
        assert_eq!(config.sync.changelog_concurrency, 4);
        assert_eq!(config.sync.shape.missing_numbers, MissingNumbers::Zero);
        assert!(config.sync.shape.strict_dates);
        assert_eq!(config.sync.run_timeout, Some(Duration::from_secs(900)));
    }

    #[test]
    fn test_missing_required_options() {
        let _g = ENV_LOCK.lock().unwrap();
        clear_env();
        assert!(TestCli::try_parse_from(["test", "--ch-db", "x"]).is_err());
    }

    #[test]
    fn test_sink_location_required() {
        let _g = ENV_LOCK.lock().unwrap();
        clear_env();
        let cli = TestCli::try_parse_from([
            "test", "--org-id", "o", "--oauth-token", "t", "--ch-db", "d", "--ch-user", "u",
            "--ch-password", "p",
        ])
        .unwrap();
        let err = SyncConfig::from_args(cli.tracker, cli.sink, cli.sync).unwrap_err();
        assert!(err.to_string().contains("--ch-host"), "got: {err}");
    }

    #[test]
    fn test_rejects_unsafe_identifiers() {
        let _g = ENV_LOCK.lock().unwrap();
        clear_env();
        assert!(build(&["--issues-table", "issues; DROP TABLE x"]).is_err());
        assert!(build(&["--ch-db", "my-db"]).is_err());
        assert!(build(&["--ch-cluster", "main'"]).is_err());
        assert!(build(&["--changelog-table", "issues"]).is_err());
        assert!(build(&["--runs-table", "issues_changelog"]).is_err());
    }

    #[test]
    fn test_rejects_bad_values() {
        let _g = ENV_LOCK.lock().unwrap();
        clear_env();
        assert!(build(&["--changelog-concurrency", "0"]).is_err());
        assert!(build(&["--per-scroll", "0"]).is_err());
        assert!(build(&["--ch-url", "ftp://ch.example/"]).is_err());
        assert!(parse(&["--initial-history-depth", "forever"]).is_err());
        assert!(parse(&["--on-changelog-error", "retry"]).is_err());
    }

    #[test]
    fn test_explicit_options() {
        let _g = ENV_LOCK.lock().unwrap();
        clear_env();
        let config = build(&[
            "--cloud-org",
            "--changelog-type",
            "IssueWorkflow",
            "--changelog-type",
            "IssueCreated",
            "--on-changelog-error",
            "skip",
            "--changelog-concurrency",
            "8",
            "--missing-numbers",
            "zero",
            "--strict-dates",
            "--run-timeout-secs",
            "600",
            "--initial-history-depth",
            "6 months",
        ])
        .unwrap();

        assert_eq!(config.tracker.org_header, OrgHeader::Cloud);
        assert_eq!(config.tracker.changelog_types, vec!["IssueWorkflow", "IssueCreated"]);
        assert_eq!(config.sync.on_changelog_error, OnChangelogError::Skip);
        assert_eq!(config.sync.changelog_concurrency, 8);
        assert_eq!(config.sync.shape.missing_numbers, MissingNumbers::Zero);
        assert!(config.sync.shape.strict_dates);
        assert_eq!(config.sync.run_timeout, Some(Duration::from_secs(600)));
        assert_eq!(config.sync.initial_depth, Some(HistoryDepth::days(180)));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let _g = ENV_LOCK.lock().unwrap();
        clear_env();
        let config = build(&[]).unwrap();
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("tok\""), "got: {rendered}");
        assert!(!rendered.contains("\"pw\""), "got: {rendered}");
        assert!(rendered.contains("<redacted>"));
    }
}
