//! Picnest - A lightweight self-hosted photo album for two

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use picnest::{
    api::{self, AppState},
    config::Config,
    db::{
        self,
        repositories::{
            AccountRepository, SqlxAccountRepository, SqlxCollectionRepository,
            SqlxCommentRepository, SqlxPartnershipRepository, SqlxPhotoRepository,
            SqlxSessionRepository,
        },
    },
    models::{Account, AccountKind},
    scheduler::Scheduler,
    services::{
        password::hash_password, AccountService, CollectionService, CommentService,
        DemoCleanupService, EphemeralAccountService, PartnershipService, PhotoService,
        SessionService, TemporalContentService,
    },
    storage::FsBlobStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "picnest=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Picnest photo album...");

    // Load configuration
    let config = Config::load_with_env(Path::new("config.yml"))?;
    tracing::info!("Configuration loaded");

    // Initialize database
    let pool = db::create_pool(&config.database).await?;
    tracing::info!("Database connected: {:?}", config.database.driver);

    // Run migrations
    db::migrations::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed");

    // Blob storage
    let blobs = FsBlobStore::shared(config.storage.path.clone());

    // Create repositories
    let accounts = SqlxAccountRepository::boxed(pool.clone());
    let sessions = SqlxSessionRepository::boxed(pool.clone());
    let collections = SqlxCollectionRepository::boxed(pool.clone());
    let photos = SqlxPhotoRepository::boxed(pool.clone());
    let comments = SqlxCommentRepository::boxed(pool.clone());
    let partnerships = SqlxPartnershipRepository::boxed(pool.clone());

    // Seed the permanent demo account on first start
    seed_demo_account(&accounts, &config).await?;

    // Background task owner with explicit shutdown
    let scheduler = Arc::new(Scheduler::new());

    // Session lifecycle core
    let temporal = Arc::new(TemporalContentService::new(
        collections.clone(),
        photos.clone(),
        blobs.clone(),
    ));
    let demo_cleanup = Arc::new(DemoCleanupService::new(
        accounts.clone(),
        sessions.clone(),
        collections.clone(),
        photos.clone(),
        blobs.clone(),
        config.demo.protected_collection_ids.clone(),
    ));
    let ephemeral_service = Arc::new(EphemeralAccountService::new(
        accounts.clone(),
        sessions.clone(),
        collections.clone(),
        photos.clone(),
        blobs.clone(),
        scheduler.clone(),
        config.session.clone(),
        config.demo.protected_collection_ids.clone(),
    ));
    let session_service = Arc::new(SessionService::new(
        sessions.clone(),
        accounts.clone(),
        temporal.clone(),
        demo_cleanup.clone(),
        ephemeral_service.clone(),
        config.session.clone(),
    ));

    // Content services
    let account_service = Arc::new(AccountService::new(
        accounts.clone(),
        session_service.clone(),
    ));
    let collection_service = Arc::new(CollectionService::new(
        collections.clone(),
        photos.clone(),
        partnerships.clone(),
        temporal.clone(),
        blobs.clone(),
    ));
    let photo_service = Arc::new(PhotoService::new(
        photos.clone(),
        collections.clone(),
        partnerships.clone(),
        temporal.clone(),
        blobs.clone(),
        config.storage.clone(),
    ));
    let comment_service = Arc::new(CommentService::new(
        comments,
        photos.clone(),
        collections.clone(),
        partnerships.clone(),
    ));
    let partnership_service = Arc::new(PartnershipService::new(partnerships, accounts.clone()));

    // Startup pass: reclaim whatever expired while the process was down
    temporal.clean_expired_temporary_content().await;
    session_service.clean_expired_sessions().await;
    ephemeral_service.cleanup_expired_guest_accounts().await;

    // Periodic sweep: temporary content first (blob keys are still there),
    // then sessions, then the guest safety net
    {
        let temporal = temporal.clone();
        let session_service = session_service.clone();
        let ephemeral_service = ephemeral_service.clone();
        scheduler.spawn_interval(
            "expiry-sweep",
            Duration::from_secs(config.session.sweep_interval_secs),
            move || {
                let temporal = temporal.clone();
                let session_service = session_service.clone();
                let ephemeral_service = ephemeral_service.clone();
                async move {
                    temporal.clean_expired_temporary_content().await;
                    session_service.clean_expired_sessions().await;
                    ephemeral_service.cleanup_expired_guest_accounts().await;
                }
            },
        );
    }
    tracing::info!(
        "Expiry sweep scheduled every {}s",
        config.session.sweep_interval_secs
    );

    // Build application state and router
    let state = AppState {
        account_service,
        session_service,
        collection_service,
        photo_service,
        comment_service,
        partnership_service,
        demo_cleanup,
        ephemeral_service,
        storage_cfg: Arc::new(config.storage.clone()),
    };
    let app = api::build_router(state, &config.server.cors_origin);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.shutdown();
    pool.close().await;
    tracing::info!("Picnest stopped");

    Ok(())
}

/// Create the permanent demo account if it does not exist yet
async fn seed_demo_account(accounts: &Arc<dyn AccountRepository>, config: &Config) -> Result<()> {
    if accounts.get_by_handle(&config.demo.handle).await?.is_some() {
        return Ok(());
    }

    tracing::info!("Creating demo account '{}'", config.demo.handle);
    let password_hash = hash_password(&config.demo.password)?;
    accounts
        .create(&Account::new(
            config.demo.handle.clone(),
            password_hash,
            "Demo".to_string(),
            AccountKind::Demo,
        ))
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}
