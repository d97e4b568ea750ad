mod error;
mod extractor;
mod fetcher;
mod handlers;
mod metadata;
mod models;
mod service;
mod state;
mod transformer;

use anyhow::Context as _;
use std::sync::Arc;
use tera::Tera;
use tokio_cron_scheduler::{Job, JobScheduler};
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::fetcher::HttpPacketSource;
use crate::metadata::MetadataTable;
use crate::service::TelemetryService;
use crate::state::{AppState, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("meshstatus=info,tower_http=info")),
        )
        .init();

    let config = Config::from_env()?;

    let metadata = match &config.metadata_path {
        Some(path) => MetadataTable::load(path)
            .with_context(|| format!("loading repeater metadata from {}", path))?,
        None => MetadataTable::builtin(),
    };
    if metadata.is_empty() {
        warn!("Repeater metadata table is empty, all repeaters will show placeholders");
    } else {
        info!("Repeater metadata loaded for {} repeaters", metadata.len());
    }

    let source = HttpPacketSource::new(&config.telemetry)?;
    let service = TelemetryService::new(
        config.telemetry.clone(),
        Arc::new(source),
        Arc::new(metadata),
    );

    let tera = Tera::new("templates/**/*.html").context("parsing templates")?;
    let state = Arc::new(AppState::new(tera, service));

    info!("Fetching initial data...");
    if state.service.get_data().await.is_none() {
        warn!("Initial fetch failed, serving without data until the next refresh");
    }

    let scheduler = JobScheduler::new().await.context("creating scheduler")?;
    let job_state = Arc::clone(&state);
    let refresh = Job::new_async(config.refresh_cron.as_str(), move |_id, _scheduler| {
        let state = Arc::clone(&job_state);
        Box::pin(async move {
            if state.service.fetch_and_transform().await.is_err() {
                warn!("Scheduled refresh failed, keeping previous data");
            }
        })
    })
    .with_context(|| format!("invalid REFRESH_CRON {:?}", config.refresh_cron))?;
    scheduler.add(refresh).await.context("scheduling refresh")?;
    scheduler.start().await.context("starting scheduler")?;
    info!("Refresh scheduled at {:?}", config.refresh_cron);

    let app = handlers::router(state)
        .nest_service("/static", ServeDir::new("static"))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .with_context(|| format!("binding {}", config.bind_address))?;
    info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
