// ABOUTME: Library root for tracker-import
// ABOUTME: Exposes the tracker client, shaper, ClickHouse sink and sync orchestrator

pub mod config;
pub mod error;
pub mod shape;
pub mod sink;
pub mod sync;
pub mod tracker;
pub mod utils;
pub mod watermark;

pub use config::SyncConfig;
pub use error::{Stage, SyncError};
pub use sync::{RunFailure, SyncReport, SyncRunner};
