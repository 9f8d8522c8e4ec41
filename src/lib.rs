//! Consolidator: memory consolidation on session reset.
//!
//! When a conversational agent session is replaced (`/new`, `/reset`), the
//! finished transcript is handed to a background subagent that distils it
//! into long-term memory files. This crate provides the hook that decides
//! whether to do so and hands the work off without delaying the reset:
//!
//! - **Event model** ([`event`]): lifecycle events and the replaced session
//! - **Prompt** ([`prompt`]): the consolidation task template and renderer
//! - **Dispatch** ([`dispatch`]): one of two strategies, selected by config
//!   - scheduled: a durable one-shot job in the cron store ([`scheduler`])
//!     plus an immediate scheduler wake
//!   - direct: a bounded call to the agent gateway ([`gateway`])
//! - **Hook** ([`hook`]): the gated trigger tying it together
//! - **Host** ([`host`]): an NDJSON stdin/stdout bridge for embedding

pub mod config;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod gateway;
pub mod hook;
pub mod host;
pub mod paths;
pub mod prompt;
pub mod scheduler;

pub use config::{DispatchStrategy, HookConfig};
pub use dispatch::{DispatchReceipt, Dispatcher};
pub use error::{ConsolidationError, ErrorKind, Result};
pub use event::LifecycleEvent;
pub use hook::{ConsolidationHook, TriggerOutcome};
