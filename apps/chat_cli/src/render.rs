//! Terminal formatting of messages and timestamps.

use std::collections::HashSet;

use chrono::{DateTime, Datelike, Utc};
use shared::{domain::MessageId, protocol::ChatMessage};

/// "just now", "5m ago", "3h ago", or the clock time once a day has passed.
pub fn relative_time(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now.signed_duration_since(at).num_seconds();
    if elapsed < 60 {
        return "just now".to_string();
    }
    let minutes = elapsed / 60;
    if minutes < 60 {
        return format!("{minutes}m ago");
    }
    let hours = minutes / 60;
    if hours < 24 {
        return format!("{hours}h ago");
    }
    at.format("%-I:%M %p").to_string()
}

pub fn day_label(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let day = at.date_naive();
    if day == now.date_naive() {
        return "Today".to_string();
    }
    if day.succ_opt() == Some(now.date_naive()) {
        return "Yesterday".to_string();
    }
    if at.year() == now.year() {
        at.format("%b %-d").to_string()
    } else {
        at.format("%b %-d, %Y").to_string()
    }
}

pub fn message_line(message: &ChatMessage, now: DateTime<Utc>) -> String {
    format!(
        "[{}] {}: {}",
        relative_time(message.created_at, now),
        message.sender_display_name,
        message.content
    )
}

/// Tracks which messages of the current view are already on screen, so a
/// send reply and its feed echo print once.
#[derive(Debug, Default)]
pub struct Transcript {
    printed: HashSet<MessageId>,
}

impl Transcript {
    pub fn reset(&mut self) {
        self.printed.clear();
    }

    /// Renders the whole displayed list with day headers and starts a new
    /// view.
    pub fn render_all(&mut self, messages: &[ChatMessage], now: DateTime<Utc>) -> Vec<String> {
        self.reset();
        let mut lines = Vec::new();
        let mut last_day = None;
        for message in messages {
            let day = day_label(message.created_at, now);
            if last_day.as_ref() != Some(&day) {
                lines.push(format!("-- {day} --"));
                last_day = Some(day);
            }
            lines.push(message_line(message, now));
            self.printed.insert(message.id);
        }
        lines
    }

    pub fn render_one(
        &mut self,
        messages: &[ChatMessage],
        message_id: MessageId,
        now: DateTime<Utc>,
    ) -> Option<String> {
        if self.printed.contains(&message_id) {
            return None;
        }
        let message = messages.iter().find(|message| message.id == message_id)?;
        self.printed.insert(message_id);
        Some(message_line(message, now))
    }
}
