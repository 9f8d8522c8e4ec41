//! Cron job records.
//!
//! Defines [`CronJob`] and its parts as written by this crate. Every level
//! keeps fields it does not know about in an `extra` map, so a record read
//! back from the store round-trips verbatim. Jobs owned by other writers are
//! never parsed into these types; see [`crate::scheduler::store`].

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Id prefix for consolidation jobs. The suffix is the source session id.
pub const CONSOLIDATION_JOB_PREFIX: &str = "memory-consolidation-";

/// Deterministic job id for a source session.
#[must_use]
pub fn consolidation_job_id(session_id: &str) -> String {
    format!("{CONSOLIDATION_JOB_PREFIX}{session_id}")
}

/// When a job should run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Schedule {
    /// Run once at an absolute time.
    #[serde(rename_all = "camelCase")]
    At {
        /// Epoch milliseconds.
        at_ms: u64,
    },
    /// Run every N milliseconds.
    #[serde(rename_all = "camelCase")]
    Every { every_ms: u64 },
    /// Run on a cron expression.
    Cron {
        expr: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tz: Option<String>,
    },
}

impl std::fmt::Display for Schedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::At { at_ms } => write!(f, "once at {at_ms}ms"),
            Self::Every { every_ms } => write!(f, "every {}s", every_ms / 1000),
            Self::Cron { expr, tz: Some(tz) } => write!(f, "cron '{expr}' ({tz})"),
            Self::Cron { expr, tz: None } => write!(f, "cron '{expr}'"),
        }
    }
}

/// Which session a job's agent turn runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionTarget {
    /// A fresh context that never shows up in the user's conversation.
    Isolated,
    /// The user's main session.
    Main,
}

/// How eagerly the executor should pick a job up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WakeMode {
    /// Run as soon as the scheduler is woken.
    Now,
    /// Wait for the scheduler's next regular tick.
    NextHeartbeat,
}

/// What kind of work a payload describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PayloadKind {
    AgentTurn,
    SystemEvent,
}

/// Work carried by a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPayload {
    pub kind: PayloadKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl JobPayload {
    /// An agent turn with the given prompt.
    #[must_use]
    pub fn agent_turn(message: impl Into<String>) -> Self {
        Self {
            kind: PayloadKind::AgentTurn,
            message: message.into(),
            model: None,
            thinking: None,
            timeout_seconds: None,
            extra: serde_json::Map::new(),
        }
    }
}

/// Whether results are announced back to a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// Discard the result silently.
    None,
    /// Announce the result in the originating channel.
    Announce,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delivery {
    pub mode: DeliveryMode,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Delivery {
    #[must_use]
    pub fn new(mode: DeliveryMode) -> Self {
        Self {
            mode,
            extra: serde_json::Map::new(),
        }
    }
}

/// Mutable run state maintained by the executor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_run_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Executor bookkeeping this crate does not interpret.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A job in the cron store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CronJob {
    /// Unique job identifier.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    pub enabled: bool,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
    pub schedule: Schedule,
    pub session_target: SessionTarget,
    pub wake_mode: WakeMode,
    pub payload: JobPayload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery: Option<Delivery>,
    #[serde(default)]
    pub state: JobState,
    /// Fields written by other store users.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl CronJob {
    /// A one-shot job that runs immediately in an isolated session.
    ///
    /// `now_ms` becomes the creation time, the schedule time and the next
    /// run time, so the executor treats the job as due on its next poll.
    #[must_use]
    pub fn run_once_now(
        id: impl Into<String>,
        name: impl Into<String>,
        payload: JobPayload,
        delivery: DeliveryMode,
        now_ms: u64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            enabled: true,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
            schedule: Schedule::At { at_ms: now_ms },
            session_target: SessionTarget::Isolated,
            wake_mode: WakeMode::Now,
            payload,
            delivery: Some(Delivery::new(delivery)),
            state: JobState {
                next_run_at_ms: Some(now_ms),
                ..JobState::default()
            },
            extra: serde_json::Map::new(),
        }
    }
}

/// Current UTC epoch milliseconds.
#[must_use]
pub fn now_epoch_millis() -> u64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(duration) => u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
        Err(_) => 0,
    }
}
