use crate::components::event_store::models::{NewEvent, Recurrence};
use crate::components::event_store::EventStore;
use crate::components::scheduler::NotificationSink;
use crate::config::Config;
use crate::error::{session_error, BotResult};
use crate::utils::time::{format_event_time, DateTimeResolver};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

/// Partially collected event data for one in-progress creation dialogue
#[derive(Debug, Clone)]
pub struct EventDraft {
    pub author_id: u64,
    pub title: Option<String>,
    pub description: Option<String>,
    pub channel: Option<u64>,
    pub recurrence: Option<Recurrence>,
    pub date_text: Option<String>,
    pub time_text: Option<String>,
    last_touched: DateTime<Utc>,
}

impl EventDraft {
    fn new(author_id: u64, now: DateTime<Utc>) -> Self {
        Self {
            author_id,
            title: None,
            description: None,
            channel: None,
            recurrence: None,
            date_text: None,
            time_text: None,
            last_touched: now,
        }
    }
}

/// In-progress event creations, keyed by a per-request session token.
///
/// Each dialogue gets its own draft, so concurrent creations by
/// different users never clobber each other. Abandoned drafts are purged
/// after a TTL instead of lingering forever.
pub struct DraftRegistry {
    drafts: RwLock<HashMap<String, EventDraft>>,
    ttl: Duration,
}

impl DraftRegistry {
    pub fn new(ttl_minutes: i64) -> Self {
        Self {
            drafts: RwLock::new(HashMap::new()),
            ttl: Duration::minutes(ttl_minutes),
        }
    }

    /// Open a new draft session and return its token
    pub async fn begin(&self, author_id: u64, now: DateTime<Utc>) -> String {
        let token = Uuid::new_v4().to_string();
        let mut drafts = self.drafts.write().await;
        drafts.insert(token.clone(), EventDraft::new(author_id, now));
        token
    }

    async fn with_draft<F>(&self, token: &str, now: DateTime<Utc>, f: F) -> BotResult<()>
    where
        F: FnOnce(&mut EventDraft),
    {
        let mut drafts = self.drafts.write().await;
        let draft = drafts
            .get_mut(token)
            .ok_or_else(|| session_error("Unknown or expired draft session"))?;
        f(draft);
        draft.last_touched = now;
        Ok(())
    }

    pub async fn set_title(&self, token: &str, title: &str, now: DateTime<Utc>) -> BotResult<()> {
        self.with_draft(token, now, |d| d.title = Some(title.to_string()))
            .await
    }

    pub async fn set_description(
        &self,
        token: &str,
        description: &str,
        now: DateTime<Utc>,
    ) -> BotResult<()> {
        self.with_draft(token, now, |d| d.description = Some(description.to_string()))
            .await
    }

    pub async fn set_channel(&self, token: &str, channel: u64, now: DateTime<Utc>) -> BotResult<()> {
        self.with_draft(token, now, |d| d.channel = Some(channel)).await
    }

    pub async fn set_recurrence(
        &self,
        token: &str,
        recurrence: Recurrence,
        now: DateTime<Utc>,
    ) -> BotResult<()> {
        self.with_draft(token, now, |d| d.recurrence = Some(recurrence))
            .await
    }

    pub async fn set_schedule(
        &self,
        token: &str,
        date_text: &str,
        time_text: &str,
        now: DateTime<Utc>,
    ) -> BotResult<()> {
        self.with_draft(token, now, |d| {
            d.date_text = Some(date_text.to_string());
            d.time_text = Some(time_text.to_string());
        })
        .await
    }

    /// Drop a draft without creating anything
    pub async fn cancel(&self, token: &str) -> BotResult<()> {
        let mut drafts = self.drafts.write().await;
        drafts
            .remove(token)
            .map(|_| ())
            .ok_or_else(|| session_error("Unknown or expired draft session"))
    }

    /// Validate a finished draft into a `NewEvent` and close the session.
    /// The draft is kept when validation fails, so the dialogue can
    /// re-prompt for the offending field.
    pub async fn complete(
        &self,
        token: &str,
        resolver: &DateTimeResolver,
        now: DateTime<Utc>,
    ) -> BotResult<NewEvent> {
        let mut drafts = self.drafts.write().await;
        let draft = drafts
            .get(token)
            .ok_or_else(|| session_error("Unknown or expired draft session"))?;

        let new_event = build_new_event(draft, resolver, now)?;
        drafts.remove(token);

        Ok(new_event)
    }

    /// Drop every draft idle for longer than the TTL; returns how many
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut drafts = self.drafts.write().await;
        let before = drafts.len();
        drafts.retain(|_, d| now - d.last_touched <= self.ttl);
        before - drafts.len()
    }

    pub async fn active_count(&self) -> usize {
        self.drafts.read().await.len()
    }
}

fn build_new_event(
    draft: &EventDraft,
    resolver: &DateTimeResolver,
    now: DateTime<Utc>,
) -> BotResult<NewEvent> {
    let title = require(&draft.title, "title")?;
    let description = require(&draft.description, "description")?;
    let channel = draft
        .channel
        .ok_or_else(|| session_error("Draft is missing: channel"))?;
    let recurrence = draft
        .recurrence
        .ok_or_else(|| session_error("Draft is missing: recurrence"))?;
    let date_text = require(&draft.date_text, "date")?;
    let time_text = require(&draft.time_text, "time")?;

    let start_time = resolver.resolve(&date_text, &time_text, now)?;

    Ok(NewEvent {
        author_id: draft.author_id,
        content: format!("**{}**\n{}", title, description),
        title,
        description,
        channel,
        start_time,
        recurrence,
        str_time: format_event_time(start_time, resolver.timezone()),
    })
}

fn require(field: &Option<String>, name: &str) -> BotResult<String> {
    field
        .clone()
        .ok_or_else(|| session_error(&format!("Draft is missing: {}", name)))
}

/// Component wrapper that runs the periodic purge of abandoned drafts
#[derive(Default)]
pub struct DraftSessions {
    registry: RwLock<Option<Arc<DraftRegistry>>>,
    purge_task: RwLock<Option<JoinHandle<()>>>,
}

impl DraftSessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the registry if the component has been initialized
    pub async fn get_registry(&self) -> Option<Arc<DraftRegistry>> {
        let registry_lock = self.registry.read().await;
        registry_lock.clone()
    }
}

#[async_trait]
impl super::Component for DraftSessions {
    fn name(&self) -> &'static str {
        "draft_sessions"
    }

    async fn init(
        &self,
        config: Arc<RwLock<Config>>,
        _store: Arc<dyn EventStore>,
        _sink: Arc<dyn NotificationSink>,
    ) -> BotResult<()> {
        let ttl_minutes = {
            let config_read = config.read().await;
            config_read.draft_ttl_minutes
        };

        let registry = Arc::new(DraftRegistry::new(ttl_minutes));
        *self.registry.write().await = Some(Arc::clone(&registry));

        let purge_registry = Arc::clone(&registry);
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
            loop {
                interval.tick().await;
                let purged = purge_registry.purge_expired(Utc::now()).await;
                if purged > 0 {
                    debug!("Purged {} abandoned event drafts", purged);
                }
            }
        });
        *self.purge_task.write().await = Some(task);

        info!("Draft sessions ready (TTL {} minutes)", ttl_minutes);
        Ok(())
    }

    async fn shutdown(&self) -> BotResult<()> {
        let mut task_lock = self.purge_task.write().await;
        if let Some(task) = task_lock.take() {
            task.abort();
        }
        Ok(())
    }
}
