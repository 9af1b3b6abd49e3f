use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::info;

use gemba_cmms::{
    HttpWorkOrderSystem, InMemoryWorkOrderSystem, SyncAdapter, WorkOrderError, WorkOrderSystem,
};
use gemba_core::config::{AppConfig, ConfigError};
use gemba_db::repositories::{
    SqlContactRepository, SqlGrantRepository, SqlTicketNumberRepository, SqlTicketRepository,
    SqlWorkOrderLinkRepository, TicketRepository, WorkOrderLinkRepository,
};
use gemba_db::{connect_with_settings, migrations, DbPool};
use gemba_engine::{ApprovalRegistry, RecipientResolver, WorkflowOrchestrator};
use gemba_notify::{
    DeliveryError, HttpNotifier, NoopNotifier, NotificationDispatcher, Notifier, TaskQueue,
};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub orchestrator: Arc<WorkflowOrchestrator>,
    pub tickets: Arc<dyn TicketRepository>,
    pub links: Arc<dyn WorkOrderLinkRepository>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("notifier setup failed: {0}")]
    Notifier(#[source] DeliveryError),
    #[error("work-order bridge setup failed: {0}")]
    WorkOrders(#[source] WorkOrderError),
}

/// Wires the full workflow stack against the configured database: SQL
/// repositories, the approval registry, recipient resolution, outbound
/// channels, the work-order bridge, and the orchestrator on top.
pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "bootstrap.start", "starting application bootstrap");

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(event_name = "bootstrap.database_connected", "database connection established");

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(event_name = "bootstrap.migrations_applied", "database migrations applied");

    let tickets: Arc<dyn TicketRepository> = Arc::new(SqlTicketRepository::new(db_pool.clone()));
    let links: Arc<dyn WorkOrderLinkRepository> =
        Arc::new(SqlWorkOrderLinkRepository::new(db_pool.clone()));
    let numbers = Arc::new(SqlTicketNumberRepository::new(db_pool.clone()));
    let grants = Arc::new(SqlGrantRepository::new(db_pool.clone()));
    let contacts = Arc::new(SqlContactRepository::new(db_pool.clone()));

    let registry = Arc::new(ApprovalRegistry::new(grants));
    let resolver = Arc::new(RecipientResolver::new(registry.clone(), contacts));

    let webhooks_configured = config.notifier.email_webhook_url.is_some()
        || config.notifier.chat_webhook_url.is_some();
    let notifier: Arc<dyn Notifier> = if webhooks_configured {
        Arc::new(HttpNotifier::from_config(&config.notifier).map_err(BootstrapError::Notifier)?)
    } else {
        Arc::new(NoopNotifier)
    };
    info!(
        event_name = "bootstrap.notifier_selected",
        mode = if webhooks_configured { "http" } else { "noop" },
        "outbound notification mode initialized"
    );
    let dispatcher = Arc::new(NotificationDispatcher::new(
        notifier,
        Duration::from_millis(config.notifier.chat_min_interval_ms),
    ));

    let work_orders: Arc<dyn WorkOrderSystem> = if config.cmms.enabled {
        Arc::new(HttpWorkOrderSystem::from_config(&config.cmms).map_err(BootstrapError::WorkOrders)?)
    } else {
        Arc::new(InMemoryWorkOrderSystem::default())
    };
    info!(
        event_name = "bootstrap.work_order_mode",
        mode = if config.cmms.enabled { "http" } else { "in_memory" },
        "work-order bridge initialized"
    );
    let sync = Arc::new(SyncAdapter::new(work_orders, links.clone()));

    let queue = Arc::new(TaskQueue::default());
    let orchestrator = Arc::new(WorkflowOrchestrator::new(
        tickets.clone(),
        numbers,
        registry,
        resolver,
        dispatcher,
        sync,
        queue,
    ));

    Ok(Application { config, db_pool, orchestrator, tickets, links })
}
