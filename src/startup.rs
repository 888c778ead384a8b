use crate::components::event_store::{EventStore, MemoryEventStore, RedisEventStore};
use crate::components::scheduler::{LogSink, NotificationSink, ReminderScheduler, WebhookSink};
use crate::components::sessions::DraftSessions;
use crate::components::ComponentManager;
use crate::config::Config;
use crate::error::Error;
use crate::shutdown;
use std::sync::Arc;
use tokio::sync::{oneshot, RwLock};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Initialize logging with environment-based configuration
pub fn init_logging() -> miette::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| Error::Config(format!("Failed to set up logging: {}", e)))?;

    Ok(())
}

/// Load and initialize the application config
pub async fn load_config() -> miette::Result<Arc<RwLock<Config>>> {
    match Config::load() {
        Ok(config) => Ok(Arc::new(RwLock::new(config))),
        Err(e) => {
            error!("Failed to load configuration: {:?}", e);
            Err(e.into())
        }
    }
}

/// Wire up the store backend, the notification sink and the components,
/// then park until a shutdown signal arrives
pub async fn run(config: Arc<RwLock<Config>>) -> miette::Result<()> {
    let (store_backend, redis_url, webhook_url) = {
        let config_read = config.read().await;
        (
            config_read.store_backend.clone(),
            config_read.redis_url.clone(),
            config_read.notify_webhook_url.clone(),
        )
    };

    // Durable event store
    let store: Arc<dyn EventStore> = match store_backend.as_str() {
        "memory" => {
            info!("Using in-memory event store; events will not survive a restart");
            Arc::new(MemoryEventStore::new())
        }
        "redis" => {
            let (mut store_actor, store_handle) = RedisEventStore::new(&redis_url)?;

            // Spawn event store actor task
            tokio::spawn(async move {
                store_actor.run().await;
            });

            Arc::new(store_handle)
        }
        other => {
            return Err(Error::Config(format!("Unknown store backend: {}", other)).into());
        }
    };

    // Notification sink
    let sink: Arc<dyn NotificationSink> = match webhook_url {
        Some(url) => Arc::new(WebhookSink::new(&url)?),
        None => {
            info!("NOTIFY_WEBHOOK_URL not set, notifications go to the log");
            Arc::new(LogSink)
        }
    };

    // Initialize component manager
    let mut component_manager = ComponentManager::new(Arc::clone(&config));

    // Register the reminder scheduler component
    component_manager.register(ReminderScheduler::new());

    // Register the draft sessions component
    component_manager.register(DraftSessions::new());

    let component_manager = Arc::new(component_manager);
    component_manager
        .init_all(Arc::clone(&store), Arc::clone(&sink))
        .await?;

    // Create shutdown channel
    let (shutdown_send, shutdown_recv) = oneshot::channel();

    // Spawn signal handler task
    let shutdown_components = Arc::clone(&component_manager);
    let shutdown_store = Arc::clone(&store);
    tokio::spawn(async move {
        shutdown::handle_signals(shutdown_send, shutdown_components, shutdown_store).await;
    });

    info!("agendabot is running");

    // Wait for the shutdown signal
    let _ = shutdown_recv.await;
    info!("Received shutdown signal, exiting");

    Ok(())
}
