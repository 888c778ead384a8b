mod actor;
mod memory;
pub mod models;

pub use actor::{RedisEventStore, RedisStoreHandle};
pub use memory::MemoryEventStore;
pub use models::{Event, NewEvent, Recurrence};

use crate::error::{BotResult, Error};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Durable collection of events with ownership-checked mutation.
///
/// The backend only has to provide three access patterns: point lookup
/// by id and author, ascending scan by start time, and an unfiltered
/// scan. Everything else in the crate is built on those.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Assign a fresh id and persist. Rejects events whose start time is
    /// not strictly in the future.
    async fn add(&self, new_event: NewEvent) -> BotResult<Event>;

    /// All stored events, ascending by start time
    async fn list_upcoming(&self) -> BotResult<Vec<Event>>;

    /// Unfiltered scan, in storage order
    async fn all(&self) -> BotResult<Vec<Event>>;

    /// Ownership-scoped point lookup. A missing id and a wrong owner are
    /// indistinguishable to the caller.
    async fn find(&self, id: &str, author_id: u64) -> BotResult<Event>;

    /// Delete the event if `author_id` owns it, returning the removed
    /// record. Same error contract as `find`.
    async fn remove(&self, id: &str, author_id: u64) -> BotResult<Event>;

    /// Persist mutated fields (recurrence advancement). A concurrent
    /// remove wins: updating an id that is no longer stored is a no-op,
    /// never a resurrection.
    async fn update(&self, event: Event) -> BotResult<()>;

    /// Release backend resources; default is a no-op
    async fn shutdown(&self) -> BotResult<()> {
        Ok(())
    }
}

/// Shared acceptance check: the store never admits an event that has
/// already started
pub(crate) fn check_future_start(start_time: DateTime<Utc>, now: DateTime<Utc>) -> BotResult<()> {
    if start_time <= now {
        return Err(Error::DateInPast);
    }
    Ok(())
}
