//! Session lifecycle events delivered to the consolidation hook.
//!
//! The session manager emits one [`LifecycleEvent`] per `/new` or `/reset`.
//! Events of any other type or action still deserialize so that a shared
//! event stream can be fed straight in; the hook ignores them.
//!
//! Hosts without a session manager can send the typed chat command instead
//! as a [`SlashCommand`] and convert it with [`SlashCommand::into_event`].

use serde::{Deserialize, Serialize};

/// Session id the session manager uses when it has no real id.
pub const PLACEHOLDER_SESSION_ID: &str = "unknown";

/// Top-level event category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Command,
    #[serde(other)]
    Other,
}

/// Action carried by a command event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionAction {
    New,
    Reset,
    #[serde(other)]
    Other,
}

impl SessionAction {
    /// Route a chat slash command to a session action.
    ///
    /// Only the first word counts, so `/new focus on tests` is `New`.
    /// Returns `None` for anything that is not a session command.
    #[must_use]
    pub fn from_slash_command(input: &str) -> Option<Self> {
        let head = input.split_whitespace().next()?;
        match head.to_ascii_lowercase().as_str() {
            "/new" => Some(Self::New),
            "/reset" => Some(Self::Reset),
            _ => None,
        }
    }
}

/// Reset kinds the hook reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    CommandNew,
    CommandReset,
}

impl EventKind {
    /// Render as `type:action`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CommandNew => "command:new",
            Self::CommandReset => "command:reset",
        }
    }
}

/// Reference to a persisted session. Only read here, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEntry {
    #[serde(default)]
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_file: Option<String>,
}

impl SessionEntry {
    #[must_use]
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            session_file: None,
        }
    }

    #[must_use]
    pub fn with_file(mut self, session_file: impl Into<String>) -> Self {
        self.session_file = Some(session_file.into());
        self
    }

    /// Returns `true` when the entry identifies a real session.
    #[must_use]
    pub fn has_session_id(&self) -> bool {
        let id = self.session_id.trim();
        !id.is_empty() && id != PLACEHOLDER_SESSION_ID
    }
}

/// Extra data attached to an event.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_session_entry: Option<SessionEntry>,
}

/// "A session was reset or replaced."
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub action: SessionAction,
    /// Key of the *new* session.
    #[serde(default)]
    pub session_key: String,
    #[serde(default)]
    pub context: EventContext,
}

impl LifecycleEvent {
    /// Build the command event emitted when `action` replaces a session.
    #[must_use]
    pub fn from_command(
        action: SessionAction,
        session_key: impl Into<String>,
        previous: Option<SessionEntry>,
    ) -> Self {
        Self {
            event_type: EventType::Command,
            action,
            session_key: session_key.into(),
            context: EventContext {
                previous_session_entry: previous,
            },
        }
    }

    /// Reset kind of this event, or `None` if the hook should ignore it.
    #[must_use]
    pub fn kind(&self) -> Option<EventKind> {
        match (self.event_type, self.action) {
            (EventType::Command, SessionAction::New) => Some(EventKind::CommandNew),
            (EventType::Command, SessionAction::Reset) => Some(EventKind::CommandReset),
            _ => None,
        }
    }

    /// The replaced session, if it has a usable id.
    #[must_use]
    pub fn previous_session(&self) -> Option<&SessionEntry> {
        self.context
            .previous_session_entry
            .as_ref()
            .filter(|entry| entry.has_session_id())
    }
}

/// A chat command as typed by the user, with the session it replaces.
///
/// Wire shape: `{"command": "/new", "sessionKey": "...", "previousSessionEntry": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlashCommand {
    pub command: String,
    #[serde(default)]
    pub session_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_session_entry: Option<SessionEntry>,
}

impl SlashCommand {
    /// The lifecycle event this command produces. Text that is not a
    /// session command becomes an event the hook ignores.
    #[must_use]
    pub fn into_event(self) -> LifecycleEvent {
        let action = SessionAction::from_slash_command(&self.command).unwrap_or(SessionAction::Other);
        LifecycleEvent::from_command(action, self.session_key, self.previous_session_entry)
    }
}
