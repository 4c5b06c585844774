mod config;
mod db;
mod errors;
mod extraction;
mod ingestion;
mod llm_client;
mod models;
mod notify;
mod reports;
mod routes;
mod scheduler;
mod scoring;
mod state;
mod storage;
mod store;
#[cfg(test)]
mod testing;
mod webhook;

use anyhow::Result;
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use chrono::Utc;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::db::{create_pool, SchemaContract};
use crate::ingestion::{ImapMailbox, IngestionEngine};
use crate::llm_client::{CompletionModel, LlmClient};
use crate::notify::{DecisionNotifier, HttpMailer, LogMailer, Mailer};
use crate::reports::ReportGenerator;
use crate::routes::build_router;
use crate::scheduler::{spawn_periodic, DeadlineSweep, ReportSweep};
use crate::scoring::ScoringAdapter;
use crate::state::AppState;
use crate::storage::{BlobStore, S3BlobStore};
use crate::store::{PgStore, Store};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting pipeline v{}", env!("CARGO_PKG_VERSION"));

    // PostgreSQL, with the optional-column contract resolved once
    let pool = create_pool(&config.database_url).await?;
    let schema = SchemaContract::resolve(&pool).await?;
    let store: Arc<dyn Store> = Arc::new(PgStore::new(pool, schema));

    // S3 / MinIO
    let s3 = build_s3_client(&config).await;
    let blobs: Arc<dyn BlobStore> = Arc::new(S3BlobStore::new(
        s3,
        config.s3_bucket.clone(),
        config.blob_base_url(),
    ));
    info!("S3 client initialized");

    let model: Option<Arc<dyn CompletionModel>> = match &config.anthropic_api_key {
        Some(key) => {
            info!("LLM client initialized (model: {})", llm_client::MODEL);
            Some(Arc::new(LlmClient::new(key.clone())))
        }
        None => {
            warn!("ANTHROPIC_API_KEY not set; scoring and report analysis use fallbacks");
            None
        }
    };

    let mailer: Arc<dyn Mailer> = match &config.mail {
        Some(mail) => Arc::new(HttpMailer::new(
            mail.api_url.clone(),
            mail.api_key.clone(),
            mail.from.clone(),
        )),
        None => {
            warn!("MAIL_API_URL/MAIL_API_KEY/MAIL_FROM not set; outbound email is logged and dropped");
            Arc::new(LogMailer::new())
        }
    };

    let notifier = Arc::new(DecisionNotifier::new(
        store.clone(),
        mailer.clone(),
        config.hr_fallback_email.clone(),
    ));
    let reports = Arc::new(ReportGenerator::new(
        store.clone(),
        blobs.clone(),
        mailer,
        model.clone(),
        config.hr_fallback_email.clone(),
    ));

    // Background sweeps
    match &config.imap {
        Some(settings) => {
            let engine = Arc::new(IngestionEngine::new(
                Arc::new(ImapMailbox::new(settings.clone())),
                store.clone(),
                blobs,
                ScoringAdapter::new(model),
                notifier,
            ));
            spawn_periodic("mailbox", config.mailbox_poll, move || {
                let engine = engine.clone();
                async move {
                    if let Err(e) = engine.poll().await {
                        warn!("Mailbox poll failed, retrying next tick: {e}");
                    }
                }
            });
        }
        None => warn!("IMAP_HOST/IMAP_USER/IMAP_PASSWORD not set; mailbox ingestion disabled"),
    }

    let deadlines = Arc::new(DeadlineSweep::new(store.clone()));
    spawn_periodic("deadline", config.deadline_sweep, move || {
        let deadlines = deadlines.clone();
        async move {
            deadlines.run(Utc::now()).await;
        }
    });

    let report_sweep = Arc::new(ReportSweep::new(
        store.clone(),
        reports.clone(),
        config.report_batch_size,
        config.report_concurrency,
    ));
    spawn_periodic("report", config.report_sweep, move || {
        let report_sweep = report_sweep.clone();
        async move {
            report_sweep.run(Utc::now()).await;
        }
    });

    let state = AppState { store, reports };
    let app = build_router(state).layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Constructs an S3 client configured for MinIO (local) or AWS (production).
async fn build_s3_client(config: &Config) -> aws_sdk_s3::Client {
    let credentials = Credentials::new(
        &config.aws_access_key_id,
        &config.aws_secret_access_key,
        None,
        None,
        "pipeline-static",
    );

    let s3_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(credentials)
        .endpoint_url(&config.s3_endpoint)
        .load()
        .await;

    let s3_config = aws_sdk_s3::config::Builder::from(&s3_config)
        .force_path_style(true)
        .build();
    aws_sdk_s3::Client::from_conf(s3_config)
}
