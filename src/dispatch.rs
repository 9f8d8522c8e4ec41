//! Consolidation dispatch strategies.
//!
//! A deployment uses exactly one strategy, held by a [`Dispatcher`]:
//!
//! - [`ScheduledDispatch`] persists a one-shot cron job and wakes the
//!   scheduler. Durable across restarts; the default.
//! - [`DirectDispatch`] calls the agent gateway directly, bounded by a
//!   timeout. Nothing survives a crash, and a timeout only means the call
//!   was abandoned, not that the subagent stopped.
//!
//! Neither strategy retries.

use crate::config::{ConsolidationConfig, DispatchStrategy, HookConfig};
use crate::error::{ConsolidationError, Result};
use crate::gateway::{AgentCall, AgentGateway, HttpGateway};
use crate::scheduler::jobs::{
    CronJob, DeliveryMode, JobPayload, consolidation_job_id, now_epoch_millis,
};
use crate::scheduler::store::{FileJobStore, JobStore};
use crate::scheduler::wake::WakeSignal;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// Marker embedded in generated subagent session keys.
pub const CONSOLIDATION_SESSION_MARKER: &str = "consolidation";

/// Everything a strategy needs to hand off one consolidation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsolidationRequest {
    /// Id of the session being consolidated.
    pub session_id: String,
    /// Key of the session that replaced it.
    pub session_key: String,
    /// Rendered task text.
    pub prompt: String,
}

/// What a successful dispatch produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum DispatchReceipt {
    /// A job is in the cron store.
    Scheduled { job_id: String, replaced: bool },
    /// The gateway accepted the agent call.
    Direct {
        session_key: String,
        idempotency_key: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        run_id: Option<String>,
    },
}

/// Fresh session key for a consolidation subagent turn.
///
/// The random suffix keeps repeated resets from ever sharing a key.
#[must_use]
pub fn subagent_session_key(agent_id: &str) -> String {
    format!(
        "agent:{agent_id}:{CONSOLIDATION_SESSION_MARKER}:{}",
        Uuid::new_v4()
    )
}

/// Strategy A: direct gateway call.
pub struct DirectDispatch {
    gateway: Arc<dyn AgentGateway>,
    timeout: Duration,
}

impl DirectDispatch {
    #[must_use]
    pub fn new(gateway: Arc<dyn AgentGateway>, timeout: Duration) -> Self {
        Self { gateway, timeout }
    }

    /// Call the gateway, abandoning the call once the bound elapses.
    pub async fn dispatch(
        &self,
        request: &ConsolidationRequest,
        config: &ConsolidationConfig,
    ) -> Result<DispatchReceipt> {
        let call = AgentCall {
            message: request.prompt.clone(),
            session_key: subagent_session_key(&config.agent_id),
            deliver: config.deliver,
            idempotency_key: Uuid::new_v4().to_string(),
        };
        let timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);

        debug!(
            session_id = %request.session_id,
            session_key = %request.session_key,
            subagent_session = %call.session_key,
            timeout_ms,
            "calling agent gateway for consolidation"
        );

        match tokio::time::timeout(self.timeout, self.gateway.call_agent(&call, timeout_ms)).await {
            Ok(Ok(ack)) => {
                info!(
                    session_id = %request.session_id,
                    subagent_session = %call.session_key,
                    run_id = ?ack.run_id,
                    "consolidation accepted by gateway"
                );
                Ok(DispatchReceipt::Direct {
                    session_key: call.session_key,
                    idempotency_key: call.idempotency_key,
                    run_id: ack.run_id,
                })
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ConsolidationError::DispatchTimeout(format!(
                "gateway did not answer within {timeout_ms}ms"
            ))),
        }
    }
}

/// Strategy B: durable one-shot cron job plus scheduler wake.
pub struct ScheduledDispatch {
    store: Arc<dyn JobStore>,
    wake: Arc<dyn WakeSignal>,
}

impl ScheduledDispatch {
    #[must_use]
    pub fn new(store: Arc<dyn JobStore>, wake: Arc<dyn WakeSignal>) -> Self {
        Self { store, wake }
    }

    /// Build the cron job for `request`.
    #[must_use]
    pub fn build_job(
        request: &ConsolidationRequest,
        config: &ConsolidationConfig,
        now_ms: u64,
    ) -> CronJob {
        let mut payload = JobPayload::agent_turn(request.prompt.clone());
        payload.model = config.model.clone();
        payload.thinking = config.thinking.clone();
        payload.timeout_seconds = Some(config.job_timeout_secs());

        let delivery = if config.deliver {
            DeliveryMode::Announce
        } else {
            DeliveryMode::None
        };

        CronJob::run_once_now(
            consolidation_job_id(&request.session_id),
            format!("Memory consolidation ({})", request.session_id),
            payload,
            delivery,
            now_ms,
        )
    }

    /// Persist the job, then wake the scheduler. No wake on a failed write.
    pub async fn dispatch(
        &self,
        request: &ConsolidationRequest,
        config: &ConsolidationConfig,
    ) -> Result<DispatchReceipt> {
        let job = Self::build_job(request, config, now_epoch_millis());
        let job_id = job.id.clone();
        let schedule = job.schedule.to_string();

        // The store write takes a file lock and may sleep while waiting.
        let store = Arc::clone(&self.store);
        let outcome = tokio::task::spawn_blocking(move || store.upsert(job))
            .await
            .map_err(|e| ConsolidationError::Persistence(format!("store task failed: {e}")))??;

        info!(
            job_id = %job_id,
            session_key = %request.session_key,
            replaced = outcome.replaced,
            schedule = %schedule,
            "consolidation job scheduled"
        );

        self.wake
            .request_immediate_poll(&format!("memory-consolidation:{}", request.session_id));

        Ok(DispatchReceipt::Scheduled {
            job_id,
            replaced: outcome.replaced,
        })
    }
}

/// The one strategy a deployment dispatches through.
pub enum Dispatcher {
    Scheduled(ScheduledDispatch),
    Direct(DirectDispatch),
}

impl Dispatcher {
    /// Build the production dispatcher selected by `config.consolidation.strategy`.
    #[must_use]
    pub fn from_config(config: &HookConfig, wake: Arc<dyn WakeSignal>) -> Self {
        match config.consolidation.strategy {
            DispatchStrategy::Scheduled => {
                let store = FileJobStore::new(
                    config.scheduler.resolved_store_path(),
                    Duration::from_millis(config.scheduler.lock_timeout_ms),
                );
                Self::Scheduled(ScheduledDispatch::new(Arc::new(store), wake))
            }
            DispatchStrategy::Direct => {
                let gateway = HttpGateway::from_config(&config.gateway);
                Self::Direct(DirectDispatch::new(Arc::new(gateway), config.call_timeout()))
            }
        }
    }

    #[must_use]
    pub fn strategy(&self) -> DispatchStrategy {
        match self {
            Self::Scheduled(_) => DispatchStrategy::Scheduled,
            Self::Direct(_) => DispatchStrategy::Direct,
        }
    }

    pub async fn dispatch(
        &self,
        request: &ConsolidationRequest,
        config: &ConsolidationConfig,
    ) -> Result<DispatchReceipt> {
        match self {
            Self::Scheduled(s) => s.dispatch(request, config).await,
            Self::Direct(d) => d.dispatch(request, config).await,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::error::ErrorKind;
    use crate::gateway::GatewayAck;
    use crate::scheduler::jobs::{Schedule, SessionTarget, WakeMode};
    use crate::scheduler::store::UpsertOutcome;
    use crate::scheduler::wake::wake_channel;
    use std::sync::Mutex;

    struct RecordingGateway {
        calls: Mutex<Vec<(AgentCall, u64)>>,
    }

    #[async_trait::async_trait]
    impl AgentGateway for RecordingGateway {
        async fn call_agent(&self, call: &AgentCall, timeout_ms: u64) -> Result<GatewayAck> {
            self.calls.lock().unwrap().push((call.clone(), timeout_ms));
            Ok(GatewayAck {
                run_id: Some("run-1".to_owned()),
            })
        }
    }

    struct HangingGateway;

    #[async_trait::async_trait]
    impl AgentGateway for HangingGateway {
        async fn call_agent(&self, _call: &AgentCall, _timeout_ms: u64) -> Result<GatewayAck> {
            std::future::pending().await
        }
    }

    struct FailingStore;

    impl JobStore for FailingStore {
        fn upsert(&self, _job: CronJob) -> Result<UpsertOutcome> {
            Err(ConsolidationError::Persistence("disk full".to_owned()))
        }
    }

    fn request() -> ConsolidationRequest {
        ConsolidationRequest {
            session_id: "s1".to_owned(),
            session_key: "agent:main:default".to_owned(),
            prompt: "consolidate s1".to_owned(),
        }
    }

    #[test]
    fn subagent_keys_carry_marker_and_never_repeat() {
        let a = subagent_session_key("main");
        let b = subagent_session_key("main");
        assert!(a.starts_with("agent:main:consolidation:"));
        assert_ne!(a, b);
    }

    #[test]
    fn build_job_applies_overrides() {
        let mut config = ConsolidationConfig::default();
        config.model = Some("small".to_owned());
        config.thinking = Some("low".to_owned());
        config.deliver = true;

        let job = ScheduledDispatch::build_job(&request(), &config, 42);
        assert_eq!(job.id, "memory-consolidation-s1");
        assert_eq!(job.schedule, Schedule::At { at_ms: 42 });
        assert_eq!(job.session_target, SessionTarget::Isolated);
        assert_eq!(job.wake_mode, WakeMode::Now);
        assert_eq!(job.payload.model.as_deref(), Some("small"));
        assert_eq!(job.payload.thinking.as_deref(), Some("low"));
        assert_eq!(job.payload.timeout_seconds, Some(120));
        assert_eq!(job.delivery.unwrap().mode, DeliveryMode::Announce);
    }

    #[tokio::test]
    async fn direct_dispatch_sends_fresh_keys() {
        let gateway = Arc::new(RecordingGateway {
            calls: Mutex::new(Vec::new()),
        });
        let direct = DirectDispatch::new(gateway.clone(), Duration::from_secs(600));
        let config = ConsolidationConfig::default();

        let first = direct.dispatch(&request(), &config).await.unwrap();
        let _second = direct.dispatch(&request(), &config).await.unwrap();

        let calls = gateway.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].1, 600_000);
        assert!(!calls[0].0.deliver);
        assert_eq!(calls[0].0.message, "consolidate s1");
        assert_ne!(calls[0].0.session_key, calls[1].0.session_key);
        assert_ne!(calls[0].0.idempotency_key, calls[1].0.idempotency_key);

        match first {
            DispatchReceipt::Direct { run_id, .. } => assert_eq!(run_id.as_deref(), Some("run-1")),
            other => panic!("expected direct receipt, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn direct_dispatch_times_out() {
        let direct = DirectDispatch::new(Arc::new(HangingGateway), Duration::from_millis(20));
        let err = direct
            .dispatch(&request(), &ConsolidationConfig::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DispatchTimeout);
    }

    #[tokio::test]
    async fn scheduled_dispatch_persists_then_wakes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.json");
        let (wake, mut wake_rx) = wake_channel();
        let scheduled = ScheduledDispatch::new(
            Arc::new(FileJobStore::new(path.clone(), Duration::from_secs(1))),
            Arc::new(wake),
        );

        let receipt = scheduled
            .dispatch(&request(), &ConsolidationConfig::default())
            .await
            .unwrap();
        assert_eq!(
            receipt,
            DispatchReceipt::Scheduled {
                job_id: "memory-consolidation-s1".to_owned(),
                replaced: false,
            }
        );
        assert_eq!(wake_rx.try_recv().unwrap().reason, "memory-consolidation:s1");

        let store = crate::scheduler::store::load_store(&path).unwrap();
        assert_eq!(store.jobs.len(), 1);
    }

    #[tokio::test]
    async fn failed_store_write_skips_wake() {
        let (wake, mut wake_rx) = wake_channel();
        let scheduled = ScheduledDispatch::new(Arc::new(FailingStore), Arc::new(wake));

        let err = scheduled
            .dispatch(&request(), &ConsolidationConfig::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Persistence);
        assert!(wake_rx.try_recv().is_err());
    }

    #[test]
    fn from_config_selects_exactly_one_strategy() {
        let (wake, _rx) = wake_channel();
        let wake: Arc<dyn WakeSignal> = Arc::new(wake);

        let mut config = HookConfig::default();
        let dispatcher = Dispatcher::from_config(&config, Arc::clone(&wake));
        assert_eq!(dispatcher.strategy(), DispatchStrategy::Scheduled);

        config.consolidation.strategy = DispatchStrategy::Direct;
        let dispatcher = Dispatcher::from_config(&config, wake);
        assert_eq!(dispatcher.strategy(), DispatchStrategy::Direct);
    }

    #[test]
    fn receipts_serialize_with_strategy_tag() {
        let receipt = DispatchReceipt::Scheduled {
            job_id: "memory-consolidation-s1".to_owned(),
            replaced: true,
        };
        let value = serde_json::to_value(&receipt).unwrap();
        assert_eq!(value["strategy"], "scheduled");
        assert_eq!(value["job_id"], "memory-consolidation-s1");
    }
}
