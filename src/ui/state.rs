use std::collections::HashSet;

use crate::common::Message;

/// What changed between two snapshots, as far as the terminal cares.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SnapshotDiff {
    pub added: Vec<Message>,
    pub removed: usize,
}

/// Local state of the terminal front end.
pub struct AppState {
    pub messages: Vec<Message>,
    /// Text of the last message that failed to send, kept for `/retry`.
    pub input_text: String,
    /// Set while the user is being asked to confirm a clear.
    pub confirming_clear: bool,
    seen: HashSet<String>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            input_text: String::new(),
            confirming_clear: false,
            seen: HashSet::new(),
        }
    }

    /// Replace the visible log with `snapshot` and report the difference.
    pub fn apply_snapshot(&mut self, snapshot: Vec<Message>) -> SnapshotDiff {
        let next: HashSet<String> = snapshot.iter().map(|msg| msg.id.clone()).collect();
        let removed = self.seen.difference(&next).count();
        let added = snapshot
            .iter()
            .filter(|msg| !self.seen.contains(&msg.id))
            .cloned()
            .collect();

        self.seen = next;
        self.messages = snapshot;
        SnapshotDiff { added, removed }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

/// One terminal line for `message`, from the point of view of `own_id`.
pub fn render_message(message: &Message, own_id: &str) -> String {
    let time = message
        .created_at_utc()
        .map(|at| at.with_timezone(&chrono::Local).format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "--:--:--".to_string());

    if message.is_summary {
        return format!("[{time}] ✨ {}: {}", message.author_display_name, message.text);
    }

    let speaker = if message.author_id == own_id {
        "You"
    } else {
        message.author_display_name.as_str()
    };
    format!("[{time}] {speaker} ({}): {}", message.author_color, message.text)
}
