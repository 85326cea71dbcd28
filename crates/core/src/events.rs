use std::collections::VecDeque;

use tracing::{error, info, warn};

use crate::identity::DerivedId;

/// 使用者通知的嚴重程度。 / Severity of a user-facing notice.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// 要呈現給使用者的訊息。 / Message the host should surface to the user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

/// 主機需要處理的通知。 / Notifications the host consumes after each operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// Content of the document changed; a re-read returns the new text.
    ContentChanged(DerivedId),
    Deleted(DerivedId),
    /// The forest changed and views should refresh.
    TreeChanged,
    Notice(Notice),
}

/// FIFO of pending events.
#[derive(Debug, Default)]
pub struct EventQueue {
    events: VecDeque<Event>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: Event) {
        self.events.push_back(event);
    }

    /// Queues a notice and mirrors it to the log.
    pub fn notify(&mut self, level: NoticeLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            NoticeLevel::Info => info!(%message, "notice"),
            NoticeLevel::Warning => warn!(%message, "notice"),
            NoticeLevel::Error => error!(%message, "notice"),
        }
        self.events
            .push_back(Event::Notice(Notice { level, message }));
    }

    pub fn drain(&mut self) -> Vec<Event> {
        self.events.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
