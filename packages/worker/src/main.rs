//! `triage-worker` binary entry point: connects to Postgres, wires the
//! external collaborators, and runs either the claim-dispatch-complete
//! loop or a one-shot enqueue (spec.md section 4.2, 6).

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use openai_client::OpenAIClient;
use sqlx::postgres::PgPoolOptions;
use tokio_cron_scheduler::{Job as CronJob, JobScheduler};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use triage_core::JobPayload;
use uuid::Uuid;

use triage_worker::config::Config;
use triage_worker::external::{Collaborators, HttpNotifier, HttpTimelineFetcher, OpenAiEmbeddingProvider, OpenAiLlmClassifier};
use triage_worker::store::{run_migrations, PgStore};
use triage_worker::worker::Worker;

#[derive(Parser)]
#[command(name = "triage-worker")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the claim-dispatch-complete loop plus the cron-driven enqueue
    /// ticks. This is the default when no subcommand is given.
    Run,
    /// Apply pending migrations and exit.
    Migrate,
    /// Enqueue a single `fetch-subscriptions` sweep over all due
    /// subscriptions, then exit. Useful for manual/CI triggering
    /// without waiting on the cron schedule.
    EnqueueFetch,
    /// Enqueue a single `classify-tweets` sweep, then exit.
    EnqueueClassify,
    /// Enqueue a `report-profile` job for one profile id, then exit.
    EnqueueReport {
        profile_id: Uuid,
        #[arg(long, default_value_t = true)]
        notify: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,triage_core=debug,triage_worker=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().context("failed to load configuration")?;

    tracing::info!("connecting to database");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("failed to connect to database")?;

    tracing::info!("running migrations");
    run_migrations(&pool).await.context("failed to run migrations")?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Migrate => {
            tracing::info!("migrations complete, exiting");
            Ok(())
        }
        Command::EnqueueFetch => {
            let store = Arc::new(PgStore::new(pool));
            let worker = build_worker(store, config)?;
            worker.enqueue(JobPayload::FetchSubscriptions { subscription_ids: None }).await;
            Ok(())
        }
        Command::EnqueueClassify => {
            let store = Arc::new(PgStore::new(pool));
            let worker = build_worker(store, config)?;
            worker.enqueue(JobPayload::ClassifyTweets).await;
            Ok(())
        }
        Command::EnqueueReport { profile_id, notify } => {
            let store = Arc::new(PgStore::new(pool));
            let worker = build_worker(store, config)?;
            worker
                .enqueue(JobPayload::ReportProfile { profile_id, notify, window_end: Utc::now() })
                .await;
            Ok(())
        }
        Command::Run => run(pool, config).await,
    }
}

fn build_worker(pg: Arc<PgStore>, config: Config) -> Result<Worker> {
    let client = OpenAIClient::new(config.openai_api_key.clone());
    let retry_backoff = config
        .pipeline
        .llm_retry_backoff
        .to_std()
        .unwrap_or(std::time::Duration::from_millis(1500));
    let collaborators = Collaborators {
        fetcher: Arc::new(HttpTimelineFetcher::new(config.timeline_service_url.clone())),
        embedder: Arc::new(OpenAiEmbeddingProvider::new(
            client.clone(),
            config.embedding_model.clone(),
            config.embedding_dimensions,
        )),
        classifier: Arc::new(OpenAiLlmClassifier::new(
            client,
            config.chat_model.clone(),
            config.pipeline.llm_max_attempts,
            retry_backoff,
            config.pipeline.content_risk_patterns.clone(),
        )),
        notifier: Arc::new(HttpNotifier::new()),
    };
    Ok(Worker::new(pg, collaborators, config))
}

/// The long-running process: claim-dispatch-complete loop, a background
/// stale-job sweep, and cron ticks that enqueue the recurring sweeps
/// (SPEC_FULL.md section 10.5 - cron expressions are handed to the
/// scheduler opaquely, never parsed by this crate itself).
async fn run(pool: sqlx::PgPool, config: Config) -> Result<()> {
    let pg = Arc::new(PgStore::new(pool));
    let fetch_cron = config.fetch_cron_schedule.clone();
    let classify_cron = config.classify_cron_schedule.clone();
    let report_cron = config.report_cron_schedule.clone();
    let worker = Arc::new(build_worker(pg, config)?);

    let scheduler = JobScheduler::new().await.context("failed to start cron scheduler")?;

    let fetch_worker = worker.clone();
    scheduler
        .add(CronJob::new_async(fetch_cron.as_str(), move |_uuid, _lock| {
            let worker = fetch_worker.clone();
            Box::pin(async move { worker.enqueue(JobPayload::FetchSubscriptions { subscription_ids: None }).await })
        })?)
        .await
        .context("failed to schedule fetch-subscriptions cron tick")?;

    let classify_worker = worker.clone();
    scheduler
        .add(CronJob::new_async(classify_cron.as_str(), move |_uuid, _lock| {
            let worker = classify_worker.clone();
            Box::pin(async move { worker.enqueue(JobPayload::ClassifyTweets).await })
        })?)
        .await
        .context("failed to schedule classify-tweets cron tick")?;

    let report_worker = worker.clone();
    scheduler
        .add(CronJob::new_async(report_cron.as_str(), move |_uuid, _lock| {
            let worker = report_worker.clone();
            Box::pin(async move { worker.enqueue_due_reports().await })
        })?)
        .await
        .context("failed to schedule report-profile cron tick")?;

    scheduler.start().await.context("failed to start cron scheduler")?;

    tracing::info!("worker started, entering claim-dispatch-complete loop");

    let sweep_worker = worker.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(3600));
        loop {
            interval.tick().await;
            sweep_worker.sweep_stale().await;
        }
    });

    loop {
        if !worker.tick().await {
            tokio::time::sleep(worker.idle_sleep()).await;
        }
    }
}
