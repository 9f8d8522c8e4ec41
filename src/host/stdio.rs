//! Stdin/stdout JSON bridge for the consolidation hook.
//!
//! Reads newline-delimited JSON from stdin, each line either a
//! [`LifecycleEvent`] or a [`SlashCommand`], and writes one
//! [`BridgeMessage`] per input line to stdout:
//!
//! - `{"type":"outcome", ...}` once the hook run for that event finished,
//! - `{"type":"error", ...}` for unparseable lines or unreadable config,
//! - `{"type":"wake", ...}` whenever a scheduled job asks the parent's
//!   scheduler to poll now.
//!
//! The config file is re-read for every event, so edits take effect on the
//! next reset without restarting the host. Hook runs are spawned and may
//! finish out of order; `line` ties each outcome to its input.
//!
//! Stdout is exclusively reserved for the JSON protocol; all diagnostic
//! output (tracing, logs) must be routed to stderr.

use crate::config::HookConfig;
use crate::error::Result;
use crate::event::{LifecycleEvent, SlashCommand};
use crate::hook::{ConsolidationHook, TriggerOutcome};
use crate::scheduler::wake::{WakeSignal, wake_channel};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::Mutex;
use tokio::task::JoinSet;

/// Error code for an input line that is not a lifecycle event.
pub const PARSE_ERROR_CODE: &str = "PARSE_ERROR";

/// Error code for a hook task that panicked or was cancelled.
pub const INTERNAL_ERROR_CODE: &str = "INTERNAL";

/// One line of bridge output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeMessage {
    Outcome {
        line: u64,
        #[serde(rename = "sessionKey", skip_serializing_if = "String::is_empty")]
        session_key: String,
        outcome: TriggerOutcome,
    },
    Error {
        line: u64,
        code: String,
        message: String,
    },
    Wake {
        reason: String,
    },
}

/// One line of bridge input.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BridgeInput {
    Event(LifecycleEvent),
    Command(SlashCommand),
}

impl BridgeInput {
    fn into_event(self) -> LifecycleEvent {
        match self {
            Self::Event(event) => event,
            Self::Command(command) => command.into_event(),
        }
    }
}

/// Run the bridge on the process stdin/stdout until stdin closes.
///
/// Pending hook runs are awaited before returning.
pub async fn run_stdio_bridge(config_path: PathBuf) -> Result<()> {
    let writer = Arc::new(Mutex::new(BufWriter::new(tokio::io::stdout())));

    let (wake, mut wake_rx) = wake_channel();
    let wake_writer = Arc::clone(&writer);
    let forwarder = tokio::spawn(async move {
        while let Some(request) = wake_rx.recv().await {
            let message = BridgeMessage::Wake {
                reason: request.reason,
            };
            if let Err(e) = emit(&wake_writer, &message).await {
                tracing::warn!(
                    error = %e,
                    "failed to write wake message to stdout; stopping wake forwarder"
                );
                break;
            }
        }
    });

    tracing::info!(config = %config_path.display(), "consolidation bridge ready");
    let reader = BufReader::new(tokio::io::stdin());
    let result = run_bridge(reader, Arc::clone(&writer), &config_path, Arc::new(wake)).await;

    // Every wake sender is gone once run_bridge has drained its hook runs.
    let _ = forwarder.await;
    result
}

/// Bridge loop over arbitrary input and output streams.
pub async fn run_bridge<R, W>(
    input: R,
    writer: Arc<Mutex<W>>,
    config_path: &Path,
    wake: Arc<dyn WakeSignal>,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let mut lines = input.lines();
    let mut pending = JoinSet::new();
    let mut line_no = 0_u64;

    while let Some(raw) = lines.next_line().await? {
        line_no += 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            continue;
        }

        let event = match serde_json::from_str::<BridgeInput>(trimmed) {
            Ok(input) => input.into_event(),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    line = line_no,
                    "failed to parse lifecycle event from stdin"
                );
                let message = BridgeMessage::Error {
                    line: line_no,
                    code: PARSE_ERROR_CODE.to_owned(),
                    message: format!("failed to parse lifecycle event: {e}"),
                };
                emit(&writer, &message).await?;
                continue;
            }
        };

        let config = match HookConfig::load_or_default(config_path) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!(
                    error_kind = %e.kind(),
                    error = %e,
                    config = %config_path.display(),
                    "failed to load hook config; event skipped"
                );
                let message = BridgeMessage::Error {
                    line: line_no,
                    code: e.kind().as_str().to_owned(),
                    message: e.to_string(),
                };
                emit(&writer, &message).await?;
                continue;
            }
        };

        let hook = ConsolidationHook::from_config(&config, Arc::clone(&wake));
        let session_key = event.session_key.clone();
        let run = hook.spawn(event, config);
        let writer = Arc::clone(&writer);
        let line = line_no;

        pending.spawn(async move {
            let message = match run.await {
                Ok(outcome) => BridgeMessage::Outcome {
                    line,
                    session_key,
                    outcome,
                },
                Err(e) => {
                    tracing::error!(error = %e, line, "hook task failed");
                    BridgeMessage::Error {
                        line,
                        code: INTERNAL_ERROR_CODE.to_owned(),
                        message: format!("hook task failed: {e}"),
                    }
                }
            };
            if let Err(e) = emit(&writer, &message).await {
                tracing::warn!(error = %e, line, "failed to write outcome to stdout");
            }
        });

        while pending.try_join_next().is_some() {}
    }

    tracing::info!(
        pending = pending.len(),
        "stdin closed (EOF); waiting for pending hook runs"
    );
    while pending.join_next().await.is_some() {}
    Ok(())
}

/// Serialize `message` as a single JSON line and flush.
async fn emit<W: AsyncWrite + Unpin>(
    writer: &Arc<Mutex<W>>,
    message: &BridgeMessage,
) -> Result<()> {
    let json = serde_json::to_string(message).map_err(std::io::Error::from)?;
    let mut w = writer.lock().await;
    w.write_all(json.as_bytes()).await?;
    w.write_all(b"\n").await?;
    w.flush().await?;
    Ok(())
}
