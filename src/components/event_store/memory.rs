use super::models::{Event, NewEvent};
use super::{check_future_start, EventStore};
use crate::error::{BotResult, Error};
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Event store kept entirely in process memory. Used by tests and by
/// the `memory` store backend for running without Redis; nothing
/// survives a restart.
#[derive(Debug, Default)]
pub struct MemoryEventStore {
    events: RwLock<Vec<Event>>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with pre-existing events, bypassing the future-start
    /// check. Lets restart-recovery tests start from a populated store.
    pub async fn seed(&self, events: Vec<Event>) {
        let mut guard = self.events.write().await;
        guard.extend(events);
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn add(&self, new_event: NewEvent) -> BotResult<Event> {
        check_future_start(new_event.start_time, Utc::now())?;

        let event = new_event.into_event(Uuid::new_v4().to_string());
        let mut events = self.events.write().await;
        events.push(event.clone());

        Ok(event)
    }

    async fn list_upcoming(&self) -> BotResult<Vec<Event>> {
        let events = self.events.read().await;
        let mut listed = events.clone();
        listed.sort_by_key(|e| e.start_time);
        Ok(listed)
    }

    async fn all(&self) -> BotResult<Vec<Event>> {
        Ok(self.events.read().await.clone())
    }

    async fn find(&self, id: &str, author_id: u64) -> BotResult<Event> {
        let events = self.events.read().await;
        events
            .iter()
            .find(|e| e.id == id && e.author_id == author_id)
            .cloned()
            .ok_or(Error::NotFoundOrNotOwner)
    }

    async fn remove(&self, id: &str, author_id: u64) -> BotResult<Event> {
        let mut events = self.events.write().await;
        let position = events
            .iter()
            .position(|e| e.id == id && e.author_id == author_id)
            .ok_or(Error::NotFoundOrNotOwner)?;

        Ok(events.remove(position))
    }

    async fn update(&self, event: Event) -> BotResult<()> {
        let mut events = self.events.write().await;

        // A concurrently removed event stays removed
        if let Some(slot) = events.iter_mut().find(|e| e.id == event.id) {
            *slot = event;
        }

        Ok(())
    }
}
