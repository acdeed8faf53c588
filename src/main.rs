use anyhow::Result;
use pulsewatch::*;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    let app_config = config::AppConfig::load()?;

    let history_repo = Arc::new(history_repo::HistoryRepo::connect(&app_config.database.path).await?);
    history_repo.init().await?;

    // Registries are filled by the plugin host at startup; the engine only
    // consumes them. An empty registry degrades queries, never fails them.
    let strategies = Arc::new(registry::StrategyRegistry::default());
    let collectors = Arc::new(registry::CollectorRegistry::default());

    backfill::run_backfill(history_repo.clone(), &app_config.retention.defaults).await?;

    let retention_handle = retention_worker::spawn(
        history_repo.clone(),
        retention_worker::RetentionWorkerConfig {
            schedule: app_config.retention.schedule.clone(),
            tick_interval_secs: app_config.retention.tick_interval_secs,
            default_policy: app_config.retention.defaults,
        },
    );

    let query_engine = Arc::new(query::QueryEngine::new(
        history_repo.clone(),
        strategies,
        collectors,
    ));

    let app = routes::app(query_engine);
    let addr = format!("{}:{}", app_config.server.host, app_config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{}", addr);

    let in_container = std::path::Path::new("/.dockerenv").exists()
        || std::env::var("CONTAINER").as_deref() == Ok("1");

    if in_container {
        // In Docker: run server until error or SIGTERM (no signal handler; avoids immediate exit)
        axum::serve(listener, app).await?;
    } else {
        tokio::select! {
            result = axum::serve(listener, app) => {
                result?;
            }
            _ = async {
                #[cfg(unix)]
                {
                    let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                        Ok(s) => s,
                        Err(_) => {
                            let _ = tokio::signal::ctrl_c().await;
                            return;
                        }
                    };
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {}
                        _ = sigterm.recv() => {}
                    }
                }
                #[cfg(not(unix))]
                {
                    tokio::signal::ctrl_c().await
                }
            } => {
                tracing::info!("Received shutdown signal");
                retention_handle.abort();
            }
        }
    }

    Ok(())
}
