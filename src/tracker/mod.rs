// ABOUTME: Tracker API access - search scroll pagination and per-issue changelogs
// ABOUTME: Every request carries the organization header and OAuth token

pub mod changelog;
pub mod client;
pub mod pager;

pub use changelog::{
    issue_refs, ChangelogBatch, IssueChangelog, IssueRef, OnChangelogError,
};
pub use client::{OrgHeader, TrackerClient};
