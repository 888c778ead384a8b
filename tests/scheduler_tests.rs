use agendabot::components::event_store::models::{Event, NewEvent, Recurrence};
use agendabot::components::event_store::{EventStore, MemoryEventStore};
use agendabot::components::scheduler::{default_rules, NotificationSink, SchedulerEngine};
use agendabot::error::{persistence_error, BotResult};
use agendabot::utils::time::Clock;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Clock that follows tokio's (pausable) test time from a fixed base
#[derive(Clone, Copy)]
struct TestClock {
    base: DateTime<Utc>,
    started: Instant,
}

impl TestClock {
    fn new(base: DateTime<Utc>) -> Self {
        Self {
            base,
            started: Instant::now(),
        }
    }
}

impl Clock for TestClock {
    fn now(&self) -> DateTime<Utc> {
        self.base + Duration::from_std(self.started.elapsed()).unwrap_or_else(|_| Duration::zero())
    }
}

/// Sink that records every delivery
#[derive(Clone, Default)]
struct RecordingSink {
    deliveries: Arc<Mutex<Vec<(String, String, u64)>>>,
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn deliver(&self, message: &str, content: &str, channel: u64) -> BotResult<()> {
        let mut deliveries = self.deliveries.lock().await;
        deliveries.push((message.to_string(), content.to_string(), channel));
        Ok(())
    }
}

impl RecordingSink {
    async fn snapshot(&self) -> Vec<(String, String, u64)> {
        self.deliveries.lock().await.clone()
    }
}

/// Sink whose deliveries always fail, counting the attempts
#[derive(Clone, Default)]
struct FailingSink {
    attempts: Arc<Mutex<u32>>,
}

#[async_trait]
impl NotificationSink for FailingSink {
    async fn deliver(&self, _message: &str, _content: &str, _channel: u64) -> BotResult<()> {
        let mut attempts = self.attempts.lock().await;
        *attempts += 1;
        Err(agendabot::error::delivery_error("channel unreachable"))
    }
}

/// Store whose first `update` calls fail, counting every attempt
struct FlakyUpdateStore {
    inner: MemoryEventStore,
    failures_left: Mutex<u32>,
    update_attempts: Mutex<u32>,
}

impl FlakyUpdateStore {
    fn new(failures: u32) -> Self {
        Self {
            inner: MemoryEventStore::new(),
            failures_left: Mutex::new(failures),
            update_attempts: Mutex::new(0),
        }
    }
}

#[async_trait]
impl EventStore for FlakyUpdateStore {
    async fn add(&self, new_event: NewEvent) -> BotResult<Event> {
        self.inner.add(new_event).await
    }

    async fn list_upcoming(&self) -> BotResult<Vec<Event>> {
        self.inner.list_upcoming().await
    }

    async fn all(&self) -> BotResult<Vec<Event>> {
        self.inner.all().await
    }

    async fn find(&self, id: &str, author_id: u64) -> BotResult<Event> {
        self.inner.find(id, author_id).await
    }

    async fn remove(&self, id: &str, author_id: u64) -> BotResult<Event> {
        self.inner.remove(id, author_id).await
    }

    async fn update(&self, event: Event) -> BotResult<()> {
        *self.update_attempts.lock().await += 1;
        let mut failures_left = self.failures_left.lock().await;
        if *failures_left > 0 {
            *failures_left -= 1;
            return Err(persistence_error("store unreachable"));
        }
        self.inner.update(event).await
    }
}

fn new_event(start_time: DateTime<Utc>, recurrence: Recurrence) -> NewEvent {
    NewEvent {
        author_id: 7,
        title: "Rust night".to_string(),
        description: "Bring your lifetimes".to_string(),
        content: "**Rust night**\nBring your lifetimes".to_string(),
        channel: 555,
        start_time,
        recurrence,
        str_time: start_time.format("%Y-%m-%d | %H:%M | %z").to_string(),
    }
}

fn stored_event(id: &str, start_time: DateTime<Utc>, recurrence: Recurrence) -> Event {
    new_event(start_time, recurrence).into_event(id.to_string())
}

fn spawn_engine(
    store: Arc<dyn EventStore>,
    sink: Arc<dyn NotificationSink>,
    clock: TestClock,
) -> agendabot::components::scheduler::SchedulerHandle {
    let (mut engine, handle) =
        SchedulerEngine::new(store, sink, default_rules(), chrono_tz::UTC, Arc::new(clock));
    tokio::spawn(async move {
        engine.run().await;
    });
    handle
}

#[tokio::test(start_paused = true)]
async fn test_full_reminder_sequence_fires_in_order() {
    let clock = TestClock::new(Utc::now());
    let store = Arc::new(MemoryEventStore::new());
    let sink = RecordingSink::default();
    let handle = spawn_engine(store.clone(), Arc::new(sink.clone()), clock);

    // Start in 25 hours: all three default rules apply
    let event = store
        .add(new_event(clock.now() + Duration::hours(25), Recurrence::Once))
        .await
        .unwrap();
    handle.event_added(event.clone()).await.unwrap();

    // Fast-forward past the occurrence
    tokio::time::sleep(StdDuration::from_secs(25 * 3600 + 60)).await;

    let rules = default_rules();
    let deliveries = sink.snapshot().await;
    let messages: Vec<_> = deliveries.iter().map(|(m, _, _)| m.as_str()).collect();
    assert_eq!(
        messages,
        vec![
            rules[0].message.as_str(),
            rules[1].message.as_str(),
            rules[2].message.as_str(),
        ]
    );
    for (_, content, channel) in &deliveries {
        assert_eq!(content, &event.content);
        assert_eq!(*channel, 555);
    }

    // One-off event is gone once its occurrence passed
    assert!(store.all().await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_near_event_skips_already_passed_lead_times() {
    let clock = TestClock::new(Utc::now());
    let store = Arc::new(MemoryEventStore::new());
    let sink = RecordingSink::default();
    let handle = spawn_engine(store.clone(), Arc::new(sink.clone()), clock);

    // Start in 25 minutes: only the 10-minute rule is still ahead
    let event = store
        .add(new_event(clock.now() + Duration::minutes(25), Recurrence::Once))
        .await
        .unwrap();
    handle.event_added(event).await.unwrap();

    tokio::time::sleep(StdDuration::from_secs(26 * 60)).await;

    let deliveries = sink.snapshot().await;
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].0, default_rules()[2].message);
}

#[tokio::test(start_paused = true)]
async fn test_remove_cancels_pending_reminders() {
    let clock = TestClock::new(Utc::now());
    let store = Arc::new(MemoryEventStore::new());
    let sink = RecordingSink::default();
    let handle = spawn_engine(store.clone(), Arc::new(sink.clone()), clock);

    let event = store
        .add(new_event(clock.now() + Duration::hours(2), Recurrence::Once))
        .await
        .unwrap();
    handle.event_added(event.clone()).await.unwrap();

    // Half an hour in, nothing has fired yet; the owner removes the event
    tokio::time::sleep(StdDuration::from_secs(30 * 60)).await;
    store.remove(&event.id, event.author_id).await.unwrap();
    handle.event_removed(&event.id).await.unwrap();

    tokio::time::sleep(StdDuration::from_secs(3 * 3600)).await;

    assert!(sink.snapshot().await.is_empty());
    assert!(store.all().await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_restart_recovery_fires_only_future_instants() {
    let clock = TestClock::new(Utc::now());
    let store = Arc::new(MemoryEventStore::new());
    let sink = RecordingSink::default();

    // Stored before "the restart": 1-day and 1-hour instants already
    // passed, the 10-minute one is still 20 minutes ahead
    store
        .seed(vec![stored_event(
            "survivor",
            clock.now() + Duration::minutes(30),
            Recurrence::Once,
        )])
        .await;

    let _handle = spawn_engine(store.clone(), Arc::new(sink.clone()), clock);

    tokio::time::sleep(StdDuration::from_secs(31 * 60)).await;

    // No stale burst: exactly the one still-future reminder fired
    let deliveries = sink.snapshot().await;
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].0, default_rules()[2].message);

    // And the finished one-off event was expired from the store
    assert!(store.all().await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_recurring_event_advances_instead_of_expiring() {
    let clock = TestClock::new(Utc::now());
    let store = Arc::new(MemoryEventStore::new());
    let sink = RecordingSink::default();

    // Weekly event whose occurrence passed while the process was down
    let missed_start = clock.now() - Duration::days(1);
    store
        .seed(vec![stored_event("weekly", missed_start, Recurrence::Weekly)])
        .await;

    let _handle = spawn_engine(store.clone(), Arc::new(sink.clone()), clock);

    // Bootstrap advances the start time to the next occurrence and persists it
    tokio::time::sleep(StdDuration::from_secs(60)).await;
    let stored = store.all().await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].start_time, missed_start + Duration::days(7));
    assert!(sink.snapshot().await.is_empty());

    // Ride through the whole next occurrence
    tokio::time::sleep(StdDuration::from_secs(6 * 24 * 3600 + 60)).await;

    let rules = default_rules();
    let messages: Vec<_> = sink
        .snapshot()
        .await
        .iter()
        .map(|(m, _, _)| m.clone())
        .collect();
    assert_eq!(
        messages,
        vec![
            rules[0].message.clone(),
            rules[1].message.clone(),
            rules[2].message.clone(),
        ]
    );

    // Still stored, rolled forward another week
    let stored = store.all().await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].start_time, missed_start + Duration::days(14));
}

#[tokio::test(start_paused = true)]
async fn test_delivery_failures_do_not_block_later_dispatches() {
    let clock = TestClock::new(Utc::now());
    let store = Arc::new(MemoryEventStore::new());
    let sink = FailingSink::default();
    let handle = spawn_engine(store.clone(), Arc::new(sink.clone()), clock);

    // Two hours out: the 1-hour and 10-minute rules apply
    let event = store
        .add(new_event(clock.now() + Duration::hours(2), Recurrence::Once))
        .await
        .unwrap();
    handle.event_added(event).await.unwrap();

    tokio::time::sleep(StdDuration::from_secs(2 * 3600 + 60)).await;

    // Both instants were attempted exactly once, never retried
    assert_eq!(*sink.attempts.lock().await, 2);
    // The event still expired normally
    assert!(store.all().await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_at_most_once_under_add_remove_churn() {
    let clock = TestClock::new(Utc::now());
    let store = Arc::new(MemoryEventStore::new());
    let sink = RecordingSink::default();
    let handle = spawn_engine(store.clone(), Arc::new(sink.clone()), clock);

    // One event that stays, one that is removed right before its reminder
    let keeper = store
        .add(new_event(clock.now() + Duration::minutes(40), Recurrence::Once))
        .await
        .unwrap();
    let doomed = store
        .add(new_event(clock.now() + Duration::minutes(45), Recurrence::Once))
        .await
        .unwrap();
    handle.event_added(keeper.clone()).await.unwrap();
    handle.event_added(doomed.clone()).await.unwrap();

    tokio::time::sleep(StdDuration::from_secs(29 * 60)).await;
    store.remove(&doomed.id, doomed.author_id).await.unwrap();
    handle.event_removed(&doomed.id).await.unwrap();

    tokio::time::sleep(StdDuration::from_secs(60 * 60)).await;

    // Only the keeper's 10-minute reminder fired, exactly once
    let deliveries = sink.snapshot().await;
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].1, keeper.content);
}

#[tokio::test(start_paused = true)]
async fn test_add_racing_bootstrap_does_not_duplicate_reminders() {
    let clock = TestClock::new(Utc::now());
    let store = Arc::new(MemoryEventStore::new());
    let sink = RecordingSink::default();

    // The add was persisted before the engine started, so the bootstrap
    // snapshot already contains the event
    store
        .seed(vec![stored_event(
            "raced",
            clock.now() + Duration::minutes(25),
            Recurrence::Once,
        )])
        .await;
    let handle = spawn_engine(store.clone(), Arc::new(sink.clone()), clock);

    // ...and the add notification for the same event is drained afterwards
    let raced = store.find("raced", 7).await.unwrap();
    handle.event_added(raced).await.unwrap();

    tokio::time::sleep(StdDuration::from_secs(26 * 60)).await;

    // The 10-minute reminder fired once, not once per admission
    let deliveries = sink.snapshot().await;
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].0, default_rules()[2].message);
}

#[tokio::test(start_paused = true)]
async fn test_failed_advance_persistence_is_retried_next_occurrence() {
    let clock = TestClock::new(Utc::now());
    let store = Arc::new(FlakyUpdateStore::new(1));
    let sink = RecordingSink::default();

    // Weekly event whose occurrence passed while the process was down;
    // the bootstrap advance hits the one flaky update
    let missed_start = clock.now() - Duration::days(1);
    store
        .inner
        .seed(vec![stored_event("weekly", missed_start, Recurrence::Weekly)])
        .await;

    let _handle = spawn_engine(store.clone(), Arc::new(sink.clone()), clock);

    // The failed update left the stored record behind, but the advanced
    // event stays tracked in memory
    tokio::time::sleep(StdDuration::from_secs(60)).await;
    assert_eq!(*store.update_attempts.lock().await, 1);
    assert_eq!(store.all().await.unwrap()[0].start_time, missed_start);

    // Reminders for the in-memory occurrence still fire, and the next
    // occurrence pass re-attempts persistence and succeeds
    tokio::time::sleep(StdDuration::from_secs(6 * 24 * 3600 + 60)).await;

    assert_eq!(sink.snapshot().await.len(), 3);
    assert_eq!(*store.update_attempts.lock().await, 2);
    let stored = store.all().await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].start_time, missed_start + Duration::days(14));
}
