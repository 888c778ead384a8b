mod engine;
pub mod schedule;
mod sink;

pub use engine::{SchedulerEngine, SchedulerHandle};
pub use schedule::{default_rules, ReminderRule};
pub use sink::{LogSink, NotificationSink, WebhookSink};

use crate::components::event_store::EventStore;
use crate::config::Config;
use crate::error::BotResult;
use crate::utils::time::SystemClock;
use async_trait::async_trait;
use lazy_static::lazy_static;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

lazy_static! {
    static ref SCHEDULER_INSTANCES: AtomicU32 = AtomicU32::new(0);
}

/// Reminder scheduler component: owns the engine task and hands out the
/// command handle the request path uses to notify it of mutations
#[derive(Default)]
pub struct ReminderScheduler {
    handle: RwLock<Option<SchedulerHandle>>,
}

impl ReminderScheduler {
    pub fn new() -> Self {
        Self {
            handle: RwLock::new(None),
        }
    }

    /// Get the handle if the component has been initialized
    pub async fn get_handle(&self) -> Option<SchedulerHandle> {
        let handle_lock = self.handle.read().await;
        handle_lock.clone()
    }
}

#[async_trait]
impl super::Component for ReminderScheduler {
    fn name(&self) -> &'static str {
        "reminder_scheduler"
    }

    async fn init(
        &self,
        config: Arc<RwLock<Config>>,
        store: Arc<dyn EventStore>,
        sink: Arc<dyn NotificationSink>,
    ) -> BotResult<()> {
        let instance_count = SCHEDULER_INSTANCES.fetch_add(1, Ordering::SeqCst) + 1;
        if instance_count > 1 {
            warn!(
                "Multiple reminder scheduler instances detected! Instance count: {}",
                instance_count
            );
        }

        let (rules, tz) = {
            let config_read = config.read().await;
            (config_read.reminder_rules.clone(), config_read.tz()?)
        };
        info!(
            "Starting reminder scheduler with {} rules in {}",
            rules.len(),
            tz
        );

        let (mut engine, handle) =
            SchedulerEngine::new(store, sink, rules, tz, Arc::new(SystemClock));

        tokio::spawn(async move {
            engine.run().await;
        });

        *self.handle.write().await = Some(handle);

        Ok(())
    }

    async fn shutdown(&self) -> BotResult<()> {
        let handle_lock = self.handle.read().await;
        if let Some(handle) = &*handle_lock {
            handle.shutdown().await?;
        }
        Ok(())
    }
}
