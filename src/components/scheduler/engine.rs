use super::schedule::{advance_to_future, fire_instants, FireKind, ReminderRule};
use super::sink::NotificationSink;
use crate::components::event_store::models::Event;
use crate::components::event_store::EventStore;
use crate::error::{component_error, BotResult};
use crate::utils::time::{format_event_time, Clock};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// Commands that can be sent to the scheduler engine
pub enum SchedulerCommand {
    /// A fully persisted event entered the store
    EventAdded(Event),
    /// An event left the store; pending instants must not fire
    EventRemoved(String),
    Shutdown,
}

/// Handle for communicating with the scheduler engine
#[derive(Clone)]
pub struct SchedulerHandle {
    command_tx: mpsc::Sender<SchedulerCommand>,
}

impl SchedulerHandle {
    /// Tell the engine to start tracking a newly stored event.
    /// Post this only after the store operation durably completed.
    pub async fn event_added(&self, event: Event) -> BotResult<()> {
        self.command_tx
            .send(SchedulerCommand::EventAdded(event))
            .await
            .map_err(|e| component_error(&format!("Scheduler mailbox error: {}", e)))
    }

    /// Cancel every pending, not-yet-fired instant of an event
    pub async fn event_removed(&self, id: &str) -> BotResult<()> {
        self.command_tx
            .send(SchedulerCommand::EventRemoved(id.to_string()))
            .await
            .map_err(|e| component_error(&format!("Scheduler mailbox error: {}", e)))
    }

    /// Shutdown the engine
    pub async fn shutdown(&self) -> BotResult<()> {
        let _ = self.command_tx.send(SchedulerCommand::Shutdown).await;
        Ok(())
    }
}

/// One queued instant. Ordered by fire time, then configured rule order,
/// with the occurrence entry sorting after any reminder due at the same
/// instant.
#[derive(Debug, Clone, PartialEq, Eq)]
struct QueuedFire {
    fire_at: DateTime<Utc>,
    rule_order: usize,
    event_id: String,
    kind: FireKind,
}

impl Ord for QueuedFire {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.fire_at, self.rule_order, &self.event_id).cmp(&(
            other.fire_at,
            other.rule_order,
            &other.event_id,
        ))
    }
}

impl PartialOrd for QueuedFire {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

fn rule_order(kind: FireKind) -> usize {
    match kind {
        FireKind::Reminder(idx) => idx,
        FireKind::Occurrence => usize::MAX,
    }
}

/// The dispatch loop: keeps a priority queue of fire instants for every
/// tracked event, sleeps until the earliest one is due or a mutation
/// command arrives, and fires each instant at most once.
///
/// The queue is owned exclusively by this actor; the request path talks
/// to it only through the command channel, so dispatch decisions are
/// never raced.
pub struct SchedulerEngine {
    store: Arc<dyn EventStore>,
    sink: Arc<dyn NotificationSink>,
    rules: Vec<ReminderRule>,
    tz: Tz,
    clock: Arc<dyn Clock>,
    queue: BinaryHeap<Reverse<QueuedFire>>,
    tracked: HashMap<String, Event>,
    command_rx: mpsc::Receiver<SchedulerCommand>,
}

impl SchedulerEngine {
    /// Create a new engine and return its handle
    pub fn new(
        store: Arc<dyn EventStore>,
        sink: Arc<dyn NotificationSink>,
        rules: Vec<ReminderRule>,
        tz: Tz,
        clock: Arc<dyn Clock>,
    ) -> (Self, SchedulerHandle) {
        let (command_tx, command_rx) = mpsc::channel(32);

        let engine = Self {
            store,
            sink,
            rules,
            tz,
            clock,
            queue: BinaryHeap::new(),
            tracked: HashMap::new(),
            command_rx,
        };

        let handle = SchedulerHandle { command_tx };

        (engine, handle)
    }

    /// Start the engine's processing loop
    pub async fn run(&mut self) {
        info!("Reminder scheduler started");

        if let Err(e) = self.bootstrap().await {
            error!("Failed to load pending events from store: {:?}", e);
        }

        loop {
            let cmd = match self.next_wait() {
                Some(wait) => {
                    tokio::select! {
                        _ = sleep(wait) => {
                            self.dispatch_due().await;
                            continue;
                        }
                        cmd = self.command_rx.recv() => cmd,
                    }
                }
                // Nothing queued: just park on the mailbox
                None => self.command_rx.recv().await,
            };

            match cmd {
                Some(SchedulerCommand::EventAdded(event)) => self.admit(event).await,
                Some(SchedulerCommand::EventRemoved(id)) => {
                    if self.tracked.remove(&id).is_some() {
                        info!(event_id = %id, "Event removed, pending reminders cancelled");
                    }
                    // Queue entries for the id are dropped lazily on pop
                }
                Some(SchedulerCommand::Shutdown) | None => break,
            }
        }

        info!("Reminder scheduler shut down");
    }

    /// Load every stored event and queue its still-future instants
    async fn bootstrap(&mut self) -> BotResult<()> {
        let events = self.store.list_upcoming().await?;
        let count = events.len();

        for event in events {
            self.admit(event).await;
        }

        info!(
            "Loaded {} stored events, {} still pending",
            count,
            self.tracked.len()
        );
        Ok(())
    }

    /// Start tracking an event, normalizing a start time that already
    /// passed: recurring events advance to their next occurrence, one-off
    /// events are expired from the store without firing anything.
    ///
    /// An id that is already tracked is ignored: an `EventAdded` for an
    /// event the bootstrap snapshot already picked up must not queue its
    /// instants a second time.
    async fn admit(&mut self, mut event: Event) {
        if self.tracked.contains_key(&event.id) {
            return;
        }

        let now = self.clock.now();

        if event.start_time <= now {
            if event.recurrence.is_recurring() {
                event = self.advance_event(event, now).await;
            } else {
                info!(event_id = %event.id, "One-off event passed while offline, expiring");
                self.expire(&event).await;
                return;
            }
        }

        self.insert_instants(event);
    }

    /// Queue the fire instants of one occurrence, skip-past applied
    fn insert_instants(&mut self, event: Event) {
        let now = self.clock.now();
        for entry in fire_instants(&event, &self.rules, now) {
            self.queue.push(Reverse(QueuedFire {
                fire_at: entry.fire_at,
                rule_order: rule_order(entry.kind),
                event_id: event.id.clone(),
                kind: entry.kind,
            }));
        }
        self.tracked.insert(event.id.clone(), event);
    }

    /// Time until the earliest queued instant, if any
    fn next_wait(&self) -> Option<std::time::Duration> {
        let Reverse(next) = self.queue.peek()?;
        let now = self.clock.now();
        Some(
            (next.fire_at - now)
                .to_std()
                .unwrap_or(std::time::Duration::ZERO),
        )
    }

    /// Pop and dispatch every instant that is due. Entries are removed
    /// from the queue before dispatch, so no instant ever fires twice;
    /// entries whose event is no longer tracked were cancelled by a
    /// remove and are dropped silently.
    async fn dispatch_due(&mut self) {
        loop {
            let due = match self.queue.peek() {
                Some(Reverse(entry)) => entry.fire_at <= self.clock.now(),
                None => false,
            };
            if !due {
                break;
            }

            let Some(Reverse(entry)) = self.queue.pop() else {
                break;
            };
            let Some(event) = self.tracked.get(&entry.event_id).cloned() else {
                continue;
            };

            match entry.kind {
                FireKind::Reminder(idx) => {
                    let Some(rule) = self.rules.get(idx) else {
                        continue;
                    };
                    if let Err(e) = self
                        .sink
                        .deliver(&rule.message, &event.content, event.channel)
                        .await
                    {
                        // Fire-and-forget: a late retry for a passed
                        // reminder window has no value
                        error!(event_id = %event.id, "Failed to deliver reminder: {:?}", e);
                    }
                }
                FireKind::Occurrence => self.occurrence_passed(event).await,
            }
        }
    }

    /// The event's start time has passed: expire one-off events, roll
    /// recurring ones forward and queue the next occurrence
    async fn occurrence_passed(&mut self, event: Event) {
        let now = self.clock.now();

        if event.recurrence.is_recurring() {
            let advanced = self.advance_event(event, now).await;
            self.insert_instants(advanced);
        } else {
            self.expire(&event).await;
        }
    }

    /// Advance a recurring event past `now` and persist the new start
    /// time. A failed update is not fatal: the advanced event stays
    /// tracked in memory and persistence is retried at the next
    /// occurrence pass.
    async fn advance_event(&mut self, mut event: Event, now: DateTime<Utc>) -> Event {
        event.start_time = advance_to_future(event.start_time, event.recurrence, now);
        event.str_time = format_event_time(event.start_time, self.tz);

        if let Err(e) = self.store.update(event.clone()).await {
            warn!(
                event_id = %event.id,
                "Failed to persist advanced start time, will retry: {:?}", e
            );
        } else {
            info!(event_id = %event.id, next = %event.str_time, "Recurring event advanced");
        }

        event
    }

    /// Drop a finished one-off event from tracking and from the store
    async fn expire(&mut self, event: &Event) {
        self.tracked.remove(&event.id);
        match self.store.remove(&event.id, event.author_id).await {
            Ok(_) => info!(event_id = %event.id, "One-off event finished and removed"),
            // Already gone (e.g. removed by its owner mid-dispatch)
            Err(e) => warn!(event_id = %event.id, "Could not expire event: {:?}", e),
        }
    }
}
