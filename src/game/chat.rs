//! Lobby/game chat with bounded history.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

/// A chat line.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatEntry {
    /// Sender's nickname.
    pub nickname: String,
    /// Trimmed message text.
    pub message: String,
    /// When the server accepted it.
    pub sent_at: DateTime<Utc>,
}

/// Chat history. Oldest entries are evicted once `cap` is reached.
#[derive(Debug)]
pub struct ChatLog {
    entries: VecDeque<ChatEntry>,
    cap: usize,
}

impl ChatLog {
    /// Create an empty log holding at most `cap` entries.
    pub fn new(cap: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(cap.min(128)),
            cap,
        }
    }

    /// Append a message. Blank messages are ignored and yield `None`.
    pub fn post(&mut self, nickname: &str, text: &str) -> Option<ChatEntry> {
        let message = text.trim();
        if message.is_empty() || self.cap == 0 {
            return None;
        }

        let entry = ChatEntry {
            nickname: nickname.to_string(),
            message: message.to_string(),
            sent_at: Utc::now(),
        };

        while self.entries.len() >= self.cap {
            self.entries.pop_front();
        }
        self.entries.push_back(entry.clone());
        Some(entry)
    }

    /// History, oldest first.
    pub fn history(&self) -> Vec<ChatEntry> {
        self.entries.iter().cloned().collect()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the history is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop all history.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_post_trims_and_ignores_blank() {
        let mut log = ChatLog::new(10);
        assert!(log.post("ann", "   ").is_none());

        let entry = log.post("ann", "  hi there \n").unwrap();
        assert_eq!(entry.message, "hi there");
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_history_is_capped() {
        let mut log = ChatLog::new(100);
        for i in 0..105 {
            log.post("bob", &format!("msg {}", i));
        }

        let history = log.history();
        assert_eq!(history.len(), 100);
        assert_eq!(history[0].message, "msg 5");
        assert_eq!(history[99].message, "msg 104");
    }

    #[test]
    fn test_wire_shape() {
        let mut log = ChatLog::new(4);
        let entry = log.post("cy", "gg").unwrap();
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["nickname"], "cy");
        assert_eq!(value["message"], "gg");
        assert!(value.get("sentAt").is_some());
    }
}
