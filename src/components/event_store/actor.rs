use super::models::{Event, NewEvent};
use super::{check_future_start, EventStore};
use crate::error::{component_error, BotResult, Error};
use async_trait::async_trait;
use chrono::Utc;
use redis::{aio::MultiplexedConnection, AsyncCommands, Client as RedisClient};
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

// Redis key constants
pub mod keys {
    pub const EVENTS: &str = "agendabot_events";
}

/// The event store actor backed by Redis. All commands are processed by
/// one loop, so mutations of the stored collection never interleave.
pub struct RedisEventStore {
    client: RedisClient,
    command_rx: mpsc::Receiver<StoreCommand>,
}

/// Commands that can be sent to the event store actor
pub enum StoreCommand {
    Add(NewEvent, mpsc::Sender<BotResult<Event>>),
    ListUpcoming(mpsc::Sender<BotResult<Vec<Event>>>),
    All(mpsc::Sender<BotResult<Vec<Event>>>),
    Find(String, u64, mpsc::Sender<BotResult<Event>>),
    Remove(String, u64, mpsc::Sender<BotResult<Event>>),
    Update(Event, mpsc::Sender<BotResult<()>>),
    Shutdown,
}

/// Handle for communicating with the event store actor
#[derive(Clone)]
pub struct RedisStoreHandle {
    command_tx: mpsc::Sender<StoreCommand>,
}

#[async_trait]
impl EventStore for RedisStoreHandle {
    async fn add(&self, new_event: NewEvent) -> BotResult<Event> {
        let (response_tx, mut response_rx) = mpsc::channel(1);
        self.command_tx
            .send(StoreCommand::Add(new_event, response_tx))
            .await
            .map_err(|e| component_error(&format!("Store mailbox error: {}", e)))?;

        response_rx
            .recv()
            .await
            .ok_or_else(|| component_error("Store response channel closed"))?
    }

    async fn list_upcoming(&self) -> BotResult<Vec<Event>> {
        let (response_tx, mut response_rx) = mpsc::channel(1);
        self.command_tx
            .send(StoreCommand::ListUpcoming(response_tx))
            .await
            .map_err(|e| component_error(&format!("Store mailbox error: {}", e)))?;

        response_rx
            .recv()
            .await
            .ok_or_else(|| component_error("Store response channel closed"))?
    }

    async fn all(&self) -> BotResult<Vec<Event>> {
        let (response_tx, mut response_rx) = mpsc::channel(1);
        self.command_tx
            .send(StoreCommand::All(response_tx))
            .await
            .map_err(|e| component_error(&format!("Store mailbox error: {}", e)))?;

        response_rx
            .recv()
            .await
            .ok_or_else(|| component_error("Store response channel closed"))?
    }

    async fn find(&self, id: &str, author_id: u64) -> BotResult<Event> {
        let (response_tx, mut response_rx) = mpsc::channel(1);
        self.command_tx
            .send(StoreCommand::Find(id.to_string(), author_id, response_tx))
            .await
            .map_err(|e| component_error(&format!("Store mailbox error: {}", e)))?;

        response_rx
            .recv()
            .await
            .ok_or_else(|| component_error("Store response channel closed"))?
    }

    async fn remove(&self, id: &str, author_id: u64) -> BotResult<Event> {
        let (response_tx, mut response_rx) = mpsc::channel(1);
        self.command_tx
            .send(StoreCommand::Remove(id.to_string(), author_id, response_tx))
            .await
            .map_err(|e| component_error(&format!("Store mailbox error: {}", e)))?;

        response_rx
            .recv()
            .await
            .ok_or_else(|| component_error("Store response channel closed"))?
    }

    async fn update(&self, event: Event) -> BotResult<()> {
        let (response_tx, mut response_rx) = mpsc::channel(1);
        self.command_tx
            .send(StoreCommand::Update(event, response_tx))
            .await
            .map_err(|e| component_error(&format!("Store mailbox error: {}", e)))?;

        response_rx
            .recv()
            .await
            .ok_or_else(|| component_error("Store response channel closed"))?
    }

    async fn shutdown(&self) -> BotResult<()> {
        let _ = self.command_tx.send(StoreCommand::Shutdown).await;
        Ok(())
    }
}

impl RedisEventStore {
    /// Create a new actor and return its handle
    pub fn new(redis_url: &str) -> BotResult<(Self, RedisStoreHandle)> {
        let (command_tx, command_rx) = mpsc::channel(32);

        let client = RedisClient::open(redis_url)?;

        let actor = Self { client, command_rx };
        let handle = RedisStoreHandle { command_tx };

        Ok((actor, handle))
    }

    /// Start the actor's processing loop
    pub async fn run(&mut self) {
        info!("Event store actor started");

        while let Some(cmd) = self.command_rx.recv().await {
            match cmd {
                StoreCommand::Add(new_event, response_tx) => {
                    let result = self.add_event(new_event).await;
                    let _ = response_tx.send(result).await;
                }
                StoreCommand::ListUpcoming(response_tx) => {
                    let result = self.list_by_time().await;
                    let _ = response_tx.send(result).await;
                }
                StoreCommand::All(response_tx) => {
                    let result = self.load_events().await;
                    let _ = response_tx.send(result).await;
                }
                StoreCommand::Find(id, author_id, response_tx) => {
                    let result = self.find_event(&id, author_id).await;
                    let _ = response_tx.send(result).await;
                }
                StoreCommand::Remove(id, author_id, response_tx) => {
                    let result = self.remove_event(&id, author_id).await;
                    let _ = response_tx.send(result).await;
                }
                StoreCommand::Update(event, response_tx) => {
                    let result = self.update_event(event).await;
                    let _ = response_tx.send(result).await;
                }
                StoreCommand::Shutdown => {
                    info!("Event store actor shutting down");
                    break;
                }
            }
        }

        info!("Event store actor shut down");
    }

    /// Get a redis connection
    async fn get_redis_connection(&self) -> BotResult<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| Error::Persistence(format!("Failed to connect to Redis: {}", e)))
    }

    /// Load the full event collection
    async fn load_events(&self) -> BotResult<Vec<Event>> {
        let mut redis_conn = self.get_redis_connection().await?;

        let exists: bool = redis_conn.exists(keys::EVENTS).await?;
        if !exists {
            return Ok(Vec::new());
        }

        let events_json: String = redis_conn.get(keys::EVENTS).await?;
        let events: Vec<Event> = serde_json::from_str(&events_json)?;

        Ok(events)
    }

    /// Persist the full event collection
    async fn save_events(&self, events: &[Event]) -> BotResult<()> {
        let mut redis_conn = self.get_redis_connection().await?;

        let events_json = serde_json::to_string(events)?;
        () = redis_conn.set(keys::EVENTS, events_json).await?;

        Ok(())
    }

    async fn add_event(&self, new_event: NewEvent) -> BotResult<Event> {
        check_future_start(new_event.start_time, Utc::now())?;

        let mut events = self.load_events().await?;
        let event = new_event.into_event(Uuid::new_v4().to_string());
        events.push(event.clone());
        self.save_events(&events).await?;

        Ok(event)
    }

    async fn list_by_time(&self) -> BotResult<Vec<Event>> {
        let mut events = self.load_events().await?;
        events.sort_by_key(|e| e.start_time);
        Ok(events)
    }

    async fn find_event(&self, id: &str, author_id: u64) -> BotResult<Event> {
        let events = self.load_events().await?;
        events
            .into_iter()
            .find(|e| e.id == id && e.author_id == author_id)
            .ok_or(Error::NotFoundOrNotOwner)
    }

    async fn remove_event(&self, id: &str, author_id: u64) -> BotResult<Event> {
        let mut events = self.load_events().await?;

        let position = events
            .iter()
            .position(|e| e.id == id && e.author_id == author_id)
            .ok_or(Error::NotFoundOrNotOwner)?;

        let removed = events.remove(position);
        self.save_events(&events).await?;

        Ok(removed)
    }

    async fn update_event(&self, event: Event) -> BotResult<()> {
        let mut events = self.load_events().await?;

        // A concurrently removed event stays removed
        if let Some(slot) = events.iter_mut().find(|e| e.id == event.id) {
            *slot = event;
            self.save_events(&events).await?;
        }

        Ok(())
    }
}
