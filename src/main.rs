use tracing::info;

#[tokio::main]
async fn main() -> miette::Result<()> {
    // Initialize logging
    agendabot::startup::init_logging()?;

    info!("Starting agendabot");

    // Load configuration
    let config = agendabot::startup::load_config().await?;

    // Run until a shutdown signal arrives
    agendabot::startup::run(config).await
}
