//! Consolidation prompt templates.
//!
//! Templates use a closed set of `{placeholder}` tokens (see
//! [`Placeholder`]). Rendering is literal replacement of every occurrence;
//! any other `{token}` is left untouched.

use chrono::NaiveDate;

/// Recognised template placeholders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    SessionId,
    SessionKey,
    Date,
    SessionFile,
}

impl Placeholder {
    pub const ALL: [Self; 4] = [
        Self::SessionId,
        Self::SessionKey,
        Self::Date,
        Self::SessionFile,
    ];

    /// Literal token as it appears in a template.
    #[must_use]
    pub fn token(self) -> &'static str {
        match self {
            Self::SessionId => "{sessionId}",
            Self::SessionKey => "{sessionKey}",
            Self::Date => "{date}",
            Self::SessionFile => "{sessionFile}",
        }
    }
}

/// Values substituted into a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptContext {
    pub session_id: String,
    pub session_key: String,
    pub date: NaiveDate,
    pub session_file: Option<String>,
}

impl PromptContext {
    fn value(&self, placeholder: Placeholder) -> String {
        match placeholder {
            Placeholder::SessionId => self.session_id.clone(),
            Placeholder::SessionKey => self.session_key.clone(),
            Placeholder::Date => format_date(self.date),
            Placeholder::SessionFile => self
                .session_file
                .clone()
                .unwrap_or_else(|| format!("sessions/{}.jsonl", self.session_id)),
        }
    }
}

/// Render `template` by replacing every recognised placeholder.
#[must_use]
pub fn render(template: &str, ctx: &PromptContext) -> String {
    // Substitute from a single left-to-right scan so values that happen to
    // contain a token are never expanded a second time.
    let mut out = String::with_capacity(template.len() + 64);
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        match Placeholder::ALL
            .iter()
            .find(|p| tail.starts_with(p.token()))
        {
            Some(p) => {
                out.push_str(&ctx.value(*p));
                rest = &tail[p.token().len()..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Calendar date as `YYYY-MM-DD`.
#[must_use]
pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Today's date on the host clock.
#[must_use]
pub fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

/// Default template for a job run by the scheduler in an isolated session.
///
/// Silent: the run produces no user-facing output.
pub const DEFAULT_SCHEDULED_PROMPT: &str = "\
Background task: consolidate memory from a finished session.

Session id: {sessionId}
New session key: {sessionKey}
Date: {date}
Transcript: {sessionFile}

1. Read the transcript without loading it whole. If it is larger than 50KB or
   300 lines, read only the trailing 300 lines (or last 50KB).
2. Extract only what is worth keeping: decisions made, milestones reached,
   lessons learned, and anything the user explicitly asked you to remember.
   Skip greetings, small talk and trivial exchanges.
3. Append the notes to memory/{date}.md under a heading for session {sessionId}.
4. If something is durable, merge it into MEMORY.md. Merge user preferences into
   USER.md and mistakes worth not repeating into SELF-REVIEW.md.
5. Append or merge only. Never overwrite or truncate an existing memory file.

This is a silent background task. Do not send any message to the user.";

/// Default template for a direct gateway call.
///
/// Reads the transcript in chunks and ends with a short completion report.
pub const DEFAULT_DIRECT_PROMPT: &str = "\
Consolidate memory from the session that just ended ({sessionId}, replaced by {sessionKey}) on {date}.

The transcript is at {sessionFile}. Do not read it in one go: check its size
first and read it in chunks of at most 300 lines (about 50KB). For a long
transcript, start from the end and stop once earlier content is routine.

Keep decisions, milestones, lessons learned, and explicit requests to remember
something. Ignore trivial exchanges.

Write the notes to memory/{date}.md. Merge durable facts into MEMORY.md, user
preferences into USER.md and self-critique into SELF-REVIEW.md. Append or
merge; never overwrite existing content.

When finished, reply with one short line summarising what was saved.";
