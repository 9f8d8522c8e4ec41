//! Session reset hook.
//!
//! [`ConsolidationHook`] runs once per lifecycle event. Each step is a gate
//! that may end the run without side effects:
//!
//! 1. not a `command:new` / `command:reset` event → [`TriggerOutcome::Ignored`]
//! 2. consolidation disabled → [`TriggerOutcome::Disabled`]
//! 3. no usable previous session → [`TriggerOutcome::NoPriorSession`]
//! 4. render the prompt for today's date and dispatch it
//!
//! Dispatch errors are logged and reported as [`TriggerOutcome::Failed`].
//! They never escape the hook: a failed consolidation must not break the
//! reset that triggered it.

use crate::config::{DispatchStrategy, HookConfig};
use crate::dispatch::{ConsolidationRequest, DispatchReceipt, Dispatcher};
use crate::error::{ConsolidationError, ErrorKind};
use crate::event::LifecycleEvent;
use crate::prompt::{self, DEFAULT_DIRECT_PROMPT, DEFAULT_SCHEDULED_PROMPT, PromptContext};
use crate::scheduler::wake::WakeSignal;
use chrono::NaiveDate;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error};

/// Terminal state of one hook run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TriggerOutcome {
    /// The event is not a session reset.
    Ignored,
    /// Consolidation is turned off.
    Disabled,
    /// Nothing to consolidate (first session, or placeholder id).
    NoPriorSession,
    /// Handed off to the executor.
    Dispatched { receipt: DispatchReceipt },
    /// Dispatch failed; already logged.
    Failed {
        error_kind: ErrorKind,
        message: String,
    },
}

impl TriggerOutcome {
    #[must_use]
    pub fn is_dispatched(&self) -> bool {
        matches!(self, Self::Dispatched { .. })
    }
}

/// Reacts to session resets by dispatching a consolidation.
#[derive(Clone)]
pub struct ConsolidationHook {
    dispatcher: Arc<Dispatcher>,
}

impl ConsolidationHook {
    #[must_use]
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
        }
    }

    /// Hook wired to the production strategy chosen by `config`.
    #[must_use]
    pub fn from_config(config: &HookConfig, wake: Arc<dyn WakeSignal>) -> Self {
        Self::new(Dispatcher::from_config(config, wake))
    }

    /// Handle `event` using today's date on the host clock.
    pub async fn handle(&self, event: &LifecycleEvent, config: &HookConfig) -> TriggerOutcome {
        self.handle_on(event, config, prompt::today()).await
    }

    /// Handle `event` as if it happened on `date`.
    pub async fn handle_on(
        &self,
        event: &LifecycleEvent,
        config: &HookConfig,
        date: NaiveDate,
    ) -> TriggerOutcome {
        let Some(kind) = event.kind() else {
            return TriggerOutcome::Ignored;
        };

        let settings = &config.consolidation;
        if !settings.enabled {
            debug!(event = kind.as_str(), "memory consolidation disabled; skipping");
            return TriggerOutcome::Disabled;
        }

        let Some(previous) = event.previous_session() else {
            debug!(
                event = kind.as_str(),
                session_key = %event.session_key,
                "no previous session to consolidate"
            );
            return TriggerOutcome::NoPriorSession;
        };

        let template = settings
            .custom_prompt()
            .unwrap_or(match self.dispatcher.strategy() {
                DispatchStrategy::Scheduled => DEFAULT_SCHEDULED_PROMPT,
                DispatchStrategy::Direct => DEFAULT_DIRECT_PROMPT,
            });
        let ctx = PromptContext {
            session_id: previous.session_id.clone(),
            session_key: event.session_key.clone(),
            date,
            session_file: previous.session_file.clone(),
        };
        let request = ConsolidationRequest {
            session_id: previous.session_id.clone(),
            session_key: event.session_key.clone(),
            prompt: prompt::render(template, &ctx),
        };

        match self.dispatcher.dispatch(&request, settings).await {
            Ok(receipt) => TriggerOutcome::Dispatched { receipt },
            Err(e) => {
                error!(
                    event = kind.as_str(),
                    session_id = %request.session_id,
                    strategy = self.dispatcher.strategy().as_str(),
                    error_kind = %e.kind(),
                    error = %e,
                    chain = %error_chain(&e),
                    "memory consolidation failed"
                );
                TriggerOutcome::Failed {
                    error_kind: e.kind(),
                    message: e.to_string(),
                }
            }
        }
    }

    /// Run the hook on a background task so the caller's reply is not held up.
    pub fn spawn(
        &self,
        event: LifecycleEvent,
        config: HookConfig,
    ) -> tokio::task::JoinHandle<TriggerOutcome> {
        let hook = self.clone();
        tokio::spawn(async move { hook.handle(&event, &config).await })
    }
}

/// `error: cause: cause...` for logging.
fn error_chain(err: &ConsolidationError) -> String {
    let mut out = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}
