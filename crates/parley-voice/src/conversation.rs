//! Conversation state: the bounded turn history sent to the chat service and the
//! append-only event log rendered to the user.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }
}

/// One utterance in the conversation. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Turn {
    role: Role,
    text: String,
}

impl Turn {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self::new(Role::Model, text)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Identity of an appended turn. Replies are ordered right after the turn they answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TurnId(u64);

#[derive(Debug, Clone)]
struct Entry {
    anchor: u64,
    turn: Turn,
}

/// Sliding window of the most recent turns.
///
/// The window never exceeds `capacity`; overflow drops the oldest entries first.
/// A reply recorded with [`push_reply`](Self::push_reply) lands right after the turn it
/// answers, so a slow reply keeps the order in which its request was sent.
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    entries: VecDeque<Entry>,
    capacity: usize,
    next_id: u64,
    // Turns with ids below this were forgotten by `clear()`.
    cleared_before: u64,
}

impl ConversationHistory {
    /// Create an empty history. A zero capacity is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity + 1),
            capacity,
            next_id: 0,
            cleared_before: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append a turn at the end of the window.
    pub fn push(&mut self, turn: Turn) -> TurnId {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push_back(Entry { anchor: id, turn });
        self.truncate();
        TurnId(id)
    }

    /// Append a user turn.
    pub fn push_user(&mut self, text: impl Into<String>) -> TurnId {
        self.push(Turn::user(text))
    }

    /// Record the model's reply to `answers`, placed after every entry sent before it.
    ///
    /// Returns false, leaving the history untouched, when `answers` was forgotten by
    /// [`clear`](Self::clear).
    pub fn push_reply(&mut self, answers: TurnId, text: impl Into<String>) -> bool {
        if answers.0 < self.cleared_before {
            return false;
        }
        let position = self
            .entries
            .iter()
            .rposition(|entry| entry.anchor <= answers.0)
            .map(|i| i + 1)
            .unwrap_or(0);
        self.entries.insert(
            position,
            Entry {
                anchor: answers.0,
                turn: Turn::model(text),
            },
        );
        self.truncate();
        true
    }

    pub fn turns(&self) -> impl Iterator<Item = &Turn> {
        self.entries.iter().map(|entry| &entry.turn)
    }

    /// Owned copy of the current window, oldest first.
    pub fn snapshot(&self) -> Vec<Turn> {
        self.turns().cloned().collect()
    }

    /// Forget every turn. Late replies to forgotten turns are dropped.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.cleared_before = self.next_id;
    }

    fn truncate(&mut self) {
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }
}

/// Origin of an event-log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Sender {
    User,
    Bot,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Normal,
    Error,
    System,
}

/// A rendered line of the transcript. Never mutated after it is appended.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventLogEntry {
    pub sender: Sender,
    pub text: String,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
}

impl EventLogEntry {
    pub fn new(sender: Sender, text: impl Into<String>, severity: Severity) -> Self {
        Self {
            sender,
            text: text.into(),
            severity,
            timestamp: Utc::now(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Sender::User, text, Severity::Normal)
    }

    pub fn bot(text: impl Into<String>) -> Self {
        Self::new(Sender::Bot, text, Severity::Normal)
    }

    pub fn bot_error(text: impl Into<String>) -> Self {
        Self::new(Sender::Bot, text, Severity::Error)
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Sender::System, text, Severity::System)
    }

    pub fn system_error(text: impl Into<String>) -> Self {
        Self::new(Sender::System, text, Severity::Error)
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// Append-only transcript.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    entries: Vec<EventLogEntry>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, entry: EventLogEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[EventLogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(history: &ConversationHistory) -> Vec<String> {
        history.turns().map(|t| t.text().to_string()).collect()
    }

    #[test]
    fn keeps_last_twenty_in_order() {
        let mut history = ConversationHistory::new(20);
        for i in 0..27 {
            if i % 2 == 0 {
                history.push_user(format!("t{i}"));
            } else {
                history.push(Turn::model(format!("t{i}")));
            }
        }
        let expected: Vec<String> = (7..27).map(|i| format!("t{i}")).collect();
        assert_eq!(history.len(), 20);
        assert_eq!(texts(&history), expected);
    }

    #[test]
    fn under_capacity_keeps_everything() {
        let mut history = ConversationHistory::new(20);
        let id = history.push_user("Hello");
        history.push_reply(id, "Hi there");
        assert_eq!(
            history.snapshot(),
            vec![Turn::user("Hello"), Turn::model("Hi there")]
        );
    }

    #[test]
    fn late_reply_follows_its_request() {
        let mut history = ConversationHistory::new(20);
        let first = history.push_user("first");
        let second = history.push_user("second");
        history.push_reply(second, "reply to second");
        history.push_reply(first, "reply to first");
        assert_eq!(
            texts(&history),
            vec!["first", "reply to first", "second", "reply to second"]
        );
    }

    #[test]
    fn reply_to_evicted_turn_is_oldest() {
        let mut history = ConversationHistory::new(2);
        let first = history.push_user("a");
        history.push_user("b");
        history.push_user("c");
        history.push_reply(first, "late");
        assert_eq!(texts(&history), vec!["b", "c"]);
    }

    #[test]
    fn reply_to_cleared_turn_is_dropped() {
        let mut history = ConversationHistory::new(20);
        let old = history.push_user("before clear");
        history.clear();
        let fresh = history.push_user("fresh");
        assert!(!history.push_reply(old, "stale reply"));
        assert!(history.push_reply(fresh, "reply to fresh"));
        assert_eq!(texts(&history), vec!["fresh", "reply to fresh"]);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let mut history = ConversationHistory::new(0);
        history.push_user("x");
        history.push_user("y");
        assert_eq!(history.capacity(), 1);
        assert_eq!(texts(&history), vec!["y"]);
    }

    #[test]
    fn event_log_appends_in_order() {
        let mut log = EventLog::new();
        log.append(EventLogEntry::user("hi"));
        log.append(EventLogEntry::bot_error("down"));
        assert_eq!(log.len(), 2);
        assert_eq!(log.entries()[0].sender, Sender::User);
        assert!(log.entries()[1].is_error());
    }

    #[test]
    fn role_wire_names() {
        assert_eq!(Role::Model.as_str(), "model");
        assert_eq!(serde_json::to_string(&Role::User).unwrap(), "\"user\"");
    }
}
