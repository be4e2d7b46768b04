use regex::Regex;
use std::sync::LazyLock;

use crate::error::{Result, ScheduleError};

/// Host name followed by the `?<digits>-<word>` event query. Anchored to the
/// scheme and host so the name cannot be smuggled in through a path. The
/// event id is ASCII only.
static EVENT_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^https?://(?:www\.)?when2meet\.com/?\?([0-9]+-[A-Za-z0-9_]+)")
        .expect("event url pattern is valid")
});

/// A URL that passed the syntactic gate, together with its event id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventUrl {
    url: String,
    event_id: String,
}

impl EventUrl {
    pub fn as_str(&self) -> &str {
        &self.url
    }

    /// The `12345-abcDE` part of the query.
    pub fn event_id(&self) -> &str {
        &self.event_id
    }
}

/// Confirms a caller-supplied URL looks like a When2Meet event page.
///
/// No network access happens here.
pub fn validate(candidate: &str) -> Result<EventUrl> {
    let candidate = candidate.trim();
    if candidate.is_empty() {
        return Err(ScheduleError::MissingUrl);
    }

    let captures = EVENT_URL.captures(candidate).ok_or(ScheduleError::InvalidUrl)?;

    Ok(EventUrl {
        url: candidate.to_string(),
        event_id: captures[1].to_string(),
    })
}
