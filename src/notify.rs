//! User-facing status notices.
//!
//! Every operation the CLI runs ends in one notice: green for success,
//! red for failure. A notice disappears on its own after a few seconds,
//! and a newer notice replaces the one on screen.

use chrono::{DateTime, Duration, Utc};
use std::fmt;
use tracing::{error, info};

use crate::config::NotificationConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    pub shown_at: DateTime<Utc>,
    pub dismiss_at: DateTime<Utc>,
}

impl Notice {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.dismiss_at
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.level {
            NoticeLevel::Success => write!(f, "✓ {}", self.message),
            NoticeLevel::Error => write!(f, "✗ {}", self.message),
        }
    }
}

pub struct Notifier {
    dismiss_after: Duration,
    current: Option<Notice>,
}

impl Notifier {
    pub fn new(config: &NotificationConfig) -> Self {
        Self {
            dismiss_after: Duration::seconds(config.dismiss_after_secs as i64),
            current: None,
        }
    }

    pub fn success(&mut self, message: impl Into<String>) -> &Notice {
        let message = message.into();
        info!(notice = %message, "Success");
        self.show(NoticeLevel::Success, message, Utc::now())
    }

    pub fn error(&mut self, message: impl Into<String>) -> &Notice {
        let message = message.into();
        error!(notice = %message, "Error");
        self.show(NoticeLevel::Error, message, Utc::now())
    }

    /// The notice still on screen at `now`, if any.
    pub fn current(&self, now: DateTime<Utc>) -> Option<&Notice> {
        self.current.as_ref().filter(|n| !n.is_expired(now))
    }

    fn show(&mut self, level: NoticeLevel, message: String, now: DateTime<Utc>) -> &Notice {
        self.current.insert(Notice {
            level,
            message,
            shown_at: now,
            dismiss_at: now + self.dismiss_after,
        })
    }
}
