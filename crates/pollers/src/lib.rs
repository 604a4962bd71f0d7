//! Background discovery loops for GitLab and Jira (spec.md §4.1, §4.9):
//! cooperative per-source polling, watermark-cursor driven, feeding the same
//! review/coding pipelines the webhook path uses.

mod backoff;
mod forge;
mod status;
mod tracker;

pub use forge::run_forge_poller;
pub use status::{PollerSnapshot, PollerStatus};
pub use tracker::run_tracker_poller;
