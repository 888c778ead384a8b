use chrono::{DateTime, Utc};

/// How often an event repeats after its first occurrence
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recurrence {
    Once,
    Weekly,
    Biweekly,
    Monthly,
}

impl Recurrence {
    pub fn is_recurring(self) -> bool {
        self != Recurrence::Once
    }
}

/// A stored event with its reminder metadata
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Event {
    /// Store-assigned identifier, stable for the event's lifetime
    pub id: String,
    /// User that created the event; only they may remove it
    pub author_id: u64,
    pub title: String,
    /// Short blurb, kept under ~256 chars by convention
    pub description: String,
    /// Message body posted alongside each reminder
    pub content: String,
    /// Destination channel, passed through to the notification sink unmodified
    pub channel: u64,
    pub start_time: DateTime<Utc>,
    pub recurrence: Recurrence,
    /// Human-readable rendering of `start_time`, frozen at creation
    pub str_time: String,
}

/// Event data as accepted from the command surface, before the store
/// assigns an id
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct NewEvent {
    pub author_id: u64,
    pub title: String,
    pub description: String,
    pub content: String,
    pub channel: u64,
    pub start_time: DateTime<Utc>,
    pub recurrence: Recurrence,
    pub str_time: String,
}

impl NewEvent {
    /// Attach a store-assigned id
    pub fn into_event(self, id: String) -> Event {
        Event {
            id,
            author_id: self.author_id,
            title: self.title,
            description: self.description,
            content: self.content,
            channel: self.channel,
            start_time: self.start_time,
            recurrence: self.recurrence,
            str_time: self.str_time,
        }
    }
}
