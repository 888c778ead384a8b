use crate::components::event_store::models::{Event, NewEvent, Recurrence};
use crate::components::event_store::EventStore;
use crate::components::scheduler::SchedulerHandle;
use crate::components::sessions::DraftRegistry;
use crate::error::BotResult;
use crate::utils::time::{format_event_time, Clock, DateTimeResolver};
use std::sync::Arc;

/// Validated input for a one-shot event creation
#[derive(Debug, Clone)]
pub struct CreateEventParams {
    pub author_id: u64,
    pub title: String,
    pub description: String,
    pub channel: u64,
    pub date_text: String,
    pub time_text: String,
    pub recurrence: Recurrence,
}

/// Facade the command surface talks to. Composes the resolver, the
/// store and the scheduler handle so callers never have to sequence
/// them by hand; the scheduler is only notified after the store
/// operation has durably completed.
pub struct EventService {
    store: Arc<dyn EventStore>,
    scheduler: SchedulerHandle,
    resolver: DateTimeResolver,
    clock: Arc<dyn Clock>,
}

impl EventService {
    pub fn new(
        store: Arc<dyn EventStore>,
        scheduler: SchedulerHandle,
        resolver: DateTimeResolver,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            scheduler,
            resolver,
            clock,
        }
    }

    /// Create an event from already-collected fields and start tracking
    /// its reminders
    pub async fn create_event(&self, params: CreateEventParams) -> BotResult<Event> {
        let now = self.clock.now();
        let start_time = self
            .resolver
            .resolve(&params.date_text, &params.time_text, now)?;

        let new_event = NewEvent {
            author_id: params.author_id,
            content: format!("**{}**\n{}", params.title, params.description),
            title: params.title,
            description: params.description,
            channel: params.channel,
            start_time,
            recurrence: params.recurrence,
            str_time: format_event_time(start_time, self.resolver.timezone()),
        };

        self.store_and_track(new_event).await
    }

    /// Finish a wizard draft session and create the event it described
    pub async fn create_from_draft(
        &self,
        registry: &DraftRegistry,
        token: &str,
    ) -> BotResult<Event> {
        let now = self.clock.now();
        let new_event = registry.complete(token, &self.resolver, now).await?;
        self.store_and_track(new_event).await
    }

    async fn store_and_track(&self, new_event: NewEvent) -> BotResult<Event> {
        let event = self.store.add(new_event).await?;
        self.scheduler.event_added(event.clone()).await?;
        Ok(event)
    }

    /// Remove an event. Only the author succeeds; pending reminders are
    /// cancelled once the store removal has gone through.
    pub async fn remove_event(&self, id: &str, author_id: u64) -> BotResult<Event> {
        let event = self.store.remove(id, author_id).await?;
        self.scheduler.event_removed(&event.id).await?;
        Ok(event)
    }

    /// All stored events, soonest first
    pub async fn list_upcoming(&self) -> BotResult<Vec<Event>> {
        self.store.list_upcoming().await
    }

    /// The next event to start, if any
    pub async fn next_event(&self) -> BotResult<Option<Event>> {
        let events = self.store.list_upcoming().await?;
        Ok(events.into_iter().next())
    }
}
