// ABOUTME: Per-issue changelog fetching with Link-header pagination
// ABOUTME: Applies the abort/skip policy across issues and optionally runs requests concurrently

use clap::ValueEnum;
use futures::stream::{self, StreamExt};
use reqwest::header::{HeaderMap, LINK};
use reqwest::Method;
use serde_json::Value as JsonValue;
use url::Url;

use super::client::{read_json, TrackerClient};
use crate::error::{Result, SyncError};
use crate::utils::url_for_log;

/// What to do when one issue's changelog cannot be fetched.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq, Default)]
pub enum OnChangelogError {
    /// Fail the whole run.
    #[default]
    Abort,
    /// Log the issue key, leave it out of the load and keep going.
    Skip,
}

/// Identity of an issue whose changelog is needed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueRef {
    pub id: String,
    pub key: String,
}

/// All changelog entries of one issue, in server order.
#[derive(Debug, Clone, PartialEq)]
pub struct IssueChangelog {
    pub issue_id: String,
    pub issue_key: String,
    pub entries: Vec<JsonValue>,
}

#[derive(Debug, Default)]
pub struct ChangelogBatch {
    pub changelogs: Vec<IssueChangelog>,
    /// Keys skipped under [`OnChangelogError::Skip`].
    pub failed: Vec<String>,
}

impl ChangelogBatch {
    pub fn entry_count(&self) -> usize {
        self.changelogs.iter().map(|c| c.entries.len()).sum()
    }
}

/// Extract `(id, key)` pairs from raw search results.
pub fn issue_refs(issues: &[JsonValue]) -> Result<Vec<IssueRef>> {
    issues
        .iter()
        .enumerate()
        .map(|(index, issue)| {
            let key = issue
                .get("key")
                .and_then(|v| v.as_str())
                .ok_or_else(|| SyncError::shape(format!("#{}", index), "key", "issue has no key"))?;
            let id = issue
                .get("id")
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            Ok(IssueRef {
                id: id.to_string(),
                key: key.to_string(),
            })
        })
        .collect()
}

/// Target of the `rel="next"` entry of a Link header, resolved against `base`.
pub fn next_link(headers: &HeaderMap, base: &Url) -> Option<Url> {
    headers
        .get_all(LINK)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .find_map(|entry| {
            let mut parts = entry.split(';');
            let target = parts.next()?.trim();
            let is_next = parts.any(|param| {
                let param = param.trim();
                param
                    .strip_prefix("rel=")
                    .map(|rel| rel.trim_matches('"').split_whitespace().any(|r| r == "next"))
                    .unwrap_or(false)
            });
            if !is_next {
                return None;
            }
            let target = target.strip_prefix('<')?.strip_suffix('>')?;
            base.join(target).ok()
        })
}

impl TrackerClient {
    /// Fetch every changelog entry of one issue, following `rel="next"` links.
    pub async fn fetch_changelog(&self, issue_key: &str) -> Result<Vec<JsonValue>> {
        let config = self.config();
        let first = self.url(&format!("{}/changelog", issue_key));
        let mut request = self.request(Method::GET, &first).query(&[
            ("perPage", config.changelog_per_page.to_string()),
            ("type", config.changelog_types.join(",")),
        ]);

        let mut entries = Vec::new();
        let mut pages = 0usize;
        loop {
            if pages >= config.max_pages {
                return Err(SyncError::Protocol(format!(
                    "changelog of {} did not finish within {} pages",
                    issue_key, config.max_pages
                )));
            }

            let response = self.send(request).await?;
            pages += 1;
            let url = response.url().clone();
            let next = next_link(response.headers(), &url);
            let page: Vec<JsonValue> = read_json(response).await?;
            entries.extend(page);

            match next {
                Some(next) => {
                    tracing::debug!(issue = issue_key, next = %url_for_log(next.as_str()), "following changelog link");
                    request = self.request(Method::GET, next.as_str());
                }
                None => break,
            }
        }

        Ok(entries)
    }

    /// Fetch the changelogs of many issues.
    ///
    /// With `concurrency > 1` requests overlap, but results keep the order of
    /// `issues`. Under [`OnChangelogError::Abort`] the first failure is returned
    /// and outstanding requests are dropped.
    pub async fn fetch_changelogs(
        &self,
        issues: &[IssueRef],
        policy: OnChangelogError,
        concurrency: usize,
    ) -> Result<ChangelogBatch> {
        let mut results = stream::iter(issues)
            .map(|issue| async move { (issue, self.fetch_changelog(&issue.key).await) })
            .buffered(concurrency.max(1));

        let mut batch = ChangelogBatch::default();
        while let Some((issue, result)) = results.next().await {
            match result {
                Ok(entries) => batch.changelogs.push(IssueChangelog {
                    issue_id: issue.id.clone(),
                    issue_key: issue.key.clone(),
                    entries,
                }),
                Err(e) => match policy {
                    OnChangelogError::Abort => {
                        tracing::error!(issue = %issue.key, error = %e, "changelog fetch failed, aborting");
                        return Err(e);
                    }
                    OnChangelogError::Skip => {
                        tracing::warn!(issue = %issue.key, error = %e, "changelog fetch failed, skipping issue");
                        batch.failed.push(issue.key.clone());
                    }
                },
            }
        }

        tracing::info!(
            issues = batch.changelogs.len(),
            entries = batch.entry_count(),
            skipped = batch.failed.len(),
            "changelog fetch complete"
        );
        Ok(batch)
    }
}
