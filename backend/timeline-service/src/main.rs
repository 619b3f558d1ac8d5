use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use anyhow::{Context, Result};
use prometheus::{Encoder, TextEncoder};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use timeline_cache::{CacheMetrics, InMemoryKvStore, KvStore, RedisKvStore};
use timeline_service::jobs::{start_reconciler, TimelineReconciler};
use timeline_service::services::{run_fanout_worker, FanoutQueue};
use timeline_service::{
    db, Config, FanoutMode, PostgresStore, Repositories, TimelineCaches, TimelineService,
};

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = terminate.recv() => {},
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler, waiting for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "timeline_service=info,timeline_cache=info".into());
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn health(
    store: web::Data<PostgresStore>,
    kv: web::Data<Arc<dyn KvStore>>,
) -> impl Responder {
    if let Err(e) = store.health_check().await {
        return HttpResponse::ServiceUnavailable().body(format!("database unavailable: {e}"));
    }
    // the engine keeps serving from the database when the cache is down
    if let Err(e) = kv.ping().await {
        warn!(error = %e, "Cache store health check failed");
        return HttpResponse::Ok().body("DEGRADED");
    }
    HttpResponse::Ok().body("OK")
}

async fn metrics_handler() -> impl Responder {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(err.to_string());
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    info!("Starting timeline-service");

    let config = Config::from_env().context("Failed to load configuration")?;
    info!(
        env = %config.app.env,
        http_port = config.app.http_port,
        fanout_mode = ?config.fanout.mode,
        cache_enabled = config.cache.enabled,
        "Configuration loaded"
    );

    let pool = db::create_pool(&config.database)
        .await
        .context("Failed to connect to database")?;
    db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;

    let kv: Arc<dyn KvStore> = if config.cache.enabled {
        let redis = RedisKvStore::connect(&config.cache.redis_url)
            .await
            .context("Failed to connect to Redis")?;
        info!("Redis connection established");
        Arc::new(redis)
    } else {
        info!("Cache disabled, reads go straight to the database");
        Arc::new(InMemoryKvStore::new())
    };

    if let Err(e) = CacheMetrics::register(prometheus::default_registry()) {
        warn!(error = %e, "Failed to register cache metrics");
    }

    let store = PostgresStore::new(pool.clone());
    let repos = Repositories::postgres(store.clone());
    let caches = TimelineCaches::new(kv.clone(), &config.cache);
    let mut service = TimelineService::new(
        repos.clone(),
        caches.clone(),
        &config.fanout,
        &config.timeline,
    );

    let mut tasks = JoinSet::new();

    if config.fanout.mode == FanoutMode::Queued {
        let (queue, receiver) = FanoutQueue::channel(config.fanout.queue_capacity);
        service = service.with_fanout_queue(queue);
        let propagator = service.propagator();
        tasks.spawn(async move {
            run_fanout_worker(receiver, propagator).await;
        });
        info!(
            capacity = config.fanout.queue_capacity,
            "Queued fan-out worker started"
        );
    }

    if config.reconcile.enabled {
        let reconciler = TimelineReconciler::new(
            repos,
            caches,
            config.fanout.backfill_limit,
            config.reconcile.batch_size,
        );
        let interval = Duration::from_secs(config.reconcile.interval_secs);
        tasks.spawn(async move {
            start_reconciler(reconciler, interval).await;
        });
    }

    let store = web::Data::new(store);
    let kv = web::Data::new(kv);
    let bind_addr = format!("{}:{}", config.app.host, config.app.http_port);
    info!(addr = %bind_addr, "Starting HTTP server for /health and /metrics");

    let server = HttpServer::new(move || {
        App::new()
            .app_data(store.clone())
            .app_data(kv.clone())
            .route("/health", web::get().to(health))
            .route("/metrics", web::get().to(metrics_handler))
    })
    .bind(&bind_addr)
    .with_context(|| format!("Failed to bind HTTP server to {bind_addr}"))?
    .disable_signals()
    .run();
    let handle = server.handle();

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                error!(error = %e, "HTTP server failed");
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
            handle.stop(true).await;
        }
    }

    tasks.shutdown().await;
    pool.close().await;
    info!("timeline-service stopped");
    Ok(())
}
