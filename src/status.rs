use std::time::{Duration, Instant};

pub const DEFAULT_TTL: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl StatusLevel {
    fn tag(self) -> &'static str {
        match self {
            StatusLevel::Info => "",
            StatusLevel::Success => "ok: ",
            StatusLevel::Warning => "warn: ",
            StatusLevel::Error => "error: ",
        }
    }
}

#[derive(Debug, Clone)]
struct StatusMessage {
    level: StatusLevel,
    text: String,
    posted_at: Instant,
}

/// Last user-visible message, shown in the HUD until it expires
#[derive(Debug, Clone)]
pub struct StatusLine {
    current: Option<StatusMessage>,
    ttl: Duration,
}

impl Default for StatusLine {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl StatusLine {
    pub fn new(ttl: Duration) -> Self {
        Self { current: None, ttl }
    }

    /// Replace the current message. Errors and warnings also go to the log.
    pub fn post(&mut self, level: StatusLevel, text: impl Into<String>, now: Instant) {
        let text = text.into();
        match level {
            StatusLevel::Error => log::error!("{}", text),
            StatusLevel::Warning => log::warn!("{}", text),
            _ => log::info!("{}", text),
        }
        self.current = Some(StatusMessage {
            level,
            text,
            posted_at: now,
        });
    }

    pub fn info(&mut self, text: impl Into<String>, now: Instant) {
        self.post(StatusLevel::Info, text, now);
    }

    pub fn success(&mut self, text: impl Into<String>, now: Instant) {
        self.post(StatusLevel::Success, text, now);
    }

    pub fn warning(&mut self, text: impl Into<String>, now: Instant) {
        self.post(StatusLevel::Warning, text, now);
    }

    pub fn error(&mut self, text: impl Into<String>, now: Instant) {
        self.post(StatusLevel::Error, text, now);
    }

    /// Drop an expired message; true when something was cleared
    pub fn expire(&mut self, now: Instant) -> bool {
        let expired = self
            .current
            .as_ref()
            .is_some_and(|m| now.saturating_duration_since(m.posted_at) >= self.ttl);
        if expired {
            self.current = None;
        }
        expired
    }

    pub fn level(&self) -> Option<StatusLevel> {
        self.current.as_ref().map(|m| m.level)
    }

    /// HUD text, prefixed by level
    pub fn display(&self) -> Option<String> {
        self.current
            .as_ref()
            .map(|m| format!("{}{}", m.level.tag(), m.text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_expires_after_ttl() {
        let t0 = Instant::now();
        let mut s = StatusLine::default();
        s.success("Saved slave 1", t0);
        assert_eq!(s.display().as_deref(), Some("ok: Saved slave 1"));
        assert!(!s.expire(t0 + Duration::from_millis(2999)));
        assert!(s.expire(t0 + DEFAULT_TTL));
        assert_eq!(s.display(), None);
        assert!(!s.expire(t0 + DEFAULT_TTL));
    }

    #[test]
    fn test_newer_message_replaces_and_restarts_ttl() {
        let t0 = Instant::now();
        let mut s = StatusLine::new(Duration::from_secs(1));
        s.info("connecting", t0);
        s.error("init timed out", t0 + Duration::from_millis(900));
        assert_eq!(s.level(), Some(StatusLevel::Error));
        assert!(!s.expire(t0 + Duration::from_millis(1500)));
        assert_eq!(s.display().as_deref(), Some("error: init timed out"));
    }
}
