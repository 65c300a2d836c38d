use std::{process, sync::Arc};

use penwell::{
    application::{
        context::AppContext,
        error::{AppError, ErrorReport},
        repos::DocumentStore,
        transaction::TransactionPolicy,
    },
    cache::{CacheConfig, CacheError, CacheService, SystemClock},
    config::{self, Command, InvalidateArgs},
    infra::{db::PostgresDocumentStore, error::InfraError, telemetry},
};
use tokio::time::MissedTickBehavior;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    let report = ErrorReport::from_error("penwell::main", error);
    if dispatcher::has_been_set() {
        error!(source = report.source, error = %report.render(), "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(source = report.source, error = %report.render(), "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    telemetry::init(&settings.logging)?;

    match cli_args.command {
        Command::Migrate => run_migrate(&settings).await,
        Command::Cleanup => run_cleanup(&settings).await,
        Command::Maintain(_) => run_maintain(&settings).await,
        Command::Invalidate(args) => run_invalidate(&settings, args).await,
        Command::BackfillSlugs => run_backfill_slugs(&settings).await,
    }
}

async fn run_migrate(settings: &config::Settings) -> Result<(), AppError> {
    let pool = connect(settings).await?;
    PostgresDocumentStore::run_migrations(&pool).await?;
    info!(target = "penwell::migrate", "migrations applied");
    Ok(())
}

async fn run_cleanup(settings: &config::Settings) -> Result<(), AppError> {
    let cache = build_cache(settings).await?;
    let report = cache
        .try_cleanup()
        .await
        .map_err(|err| AppError::unexpected(format!("cache cleanup failed: {err}")))?;
    info!(
        target = "penwell::cleanup",
        persistent_expired = report.persistent_expired,
        failed = report.failed,
        "cleanup completed"
    );
    Ok(())
}

async fn run_maintain(settings: &config::Settings) -> Result<(), AppError> {
    let cache = build_cache(settings).await?;
    let cadence = settings.maintenance.cadence;
    info!(
        target = "penwell::maintain",
        cadence_seconds = cadence.as_secs(),
        "starting cache maintenance loop"
    );

    let mut interval = tokio::time::interval(cadence);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let report = cache.cleanup().await;
                if report.failed > 0 {
                    warn!(
                        target = "penwell::maintain",
                        failed = report.failed,
                        "some expired entries could not be removed"
                    );
                }
            }
            signal = tokio::signal::ctrl_c() => {
                if let Err(err) = signal {
                    warn!(
                        target = "penwell::maintain",
                        error = %err,
                        "failed to listen for ctrl-c"
                    );
                }
                info!(target = "penwell::maintain", "maintenance loop stopped");
                return Ok(());
            }
        }
    }
}

async fn run_invalidate(
    settings: &config::Settings,
    args: InvalidateArgs,
) -> Result<(), AppError> {
    let cache = build_cache(settings).await?;
    let failed =
        |err: CacheError| AppError::unexpected(format!("cache invalidation failed: {err}"));

    if args.all {
        let report = cache.try_clear_all().await.map_err(failed)?;
        info!(
            target = "penwell::invalidate",
            removed = report.persistent_removed,
            failed = report.failed,
            "cleared entire cache"
        );
        return Ok(());
    }

    for key in &args.keys {
        cache.try_delete(key).await.map_err(failed)?;
        info!(target = "penwell::invalidate", key = %key, "deleted cache key");
    }

    if !args.tags.is_empty() {
        let report = cache.try_clear_by_tags(&args.tags).await.map_err(failed)?;
        info!(
            target = "penwell::invalidate",
            tags = ?args.tags,
            removed = report.persistent_removed,
            failed = report.failed,
            failed_tags = report.failed_tags,
            "cleared tagged entries"
        );
    }
    Ok(())
}

async fn run_backfill_slugs(settings: &config::Settings) -> Result<(), AppError> {
    let store = build_store(settings).await?;
    let ctx = AppContext::new(
        store,
        Arc::new(SystemClock),
        shared_cache_config(settings),
        TransactionPolicy::from(&settings.transactions),
    );
    let updated = ctx.posts.backfill_slugs().await?;
    info!(target = "penwell::backfill", updated, "slug backfill finished");
    Ok(())
}

async fn connect(settings: &config::Settings) -> Result<sqlx::PgPool, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or(InfraError::MissingDatabaseUrl)?;

    let max_connections = settings.database.max_connections.get();
    let pool = PostgresDocumentStore::connect(database_url, max_connections).await?;
    Ok(pool)
}

async fn build_store(settings: &config::Settings) -> Result<Arc<dyn DocumentStore>, AppError> {
    let pool = connect(settings).await?;
    Ok(Arc::new(PostgresDocumentStore::new(pool)))
}

// Maintenance only touches the shared tier.
fn shared_cache_config(settings: &config::Settings) -> CacheConfig {
    CacheConfig {
        enable_memory_tier: false,
        ..CacheConfig::from(&settings.cache)
    }
}

async fn build_cache(settings: &config::Settings) -> Result<CacheService, AppError> {
    let store = build_store(settings).await?;
    Ok(CacheService::new(
        shared_cache_config(settings),
        store,
        Arc::new(SystemClock),
    ))
}
