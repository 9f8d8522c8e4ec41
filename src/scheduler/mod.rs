//! Durable scheduling of consolidation jobs.
//!
//! Jobs go into a cron store shared with an external executor, which is
//! then woken so it does not wait for its next polling tick.

pub mod jobs;
pub mod store;
pub mod wake;

pub use jobs::{CronJob, Schedule, consolidation_job_id};
pub use store::{CronStore, FileJobStore, JobStore, UpsertOutcome};
pub use wake::{ChannelWake, NoopWake, WakeRequest, WakeSignal, wake_channel};
