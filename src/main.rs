//! CLI entry point for the downloader tool.

use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use civitai_dl_core::api::{ApiClient, ApiError, HttpExecutor, QueryParameters};
use civitai_dl_core::db::Database;
use civitai_dl_core::download::{DownloadConfig, DownloadEngine};
use civitai_dl_core::fetch_queue::{FetchQueueConfig, FetchQueueError, FetchQueueStage};
use civitai_dl_core::filter::FilterConfig;
use civitai_dl_core::store::StateStore;
use civitai_dl_core::user_agent;
use civitai_dl_core::Config;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

mod cli;

use cli::{Args, Command};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");

    let mut config = match &args.config {
        Some(path) => Config::from_file(Path::new(path))
            .await
            .with_context(|| format!("failed to load config from {path}"))?,
        None => Config::default(),
    };
    apply_overrides(&mut config, &args);

    let db = Database::new(Path::new(&config.database_path))
        .await
        .context("failed to open state store database")?;
    let store = StateStore::new(db);

    if let Some(Command::Delete { version_id }) = args.command {
        store.delete(version_id).await.context("failed to delete entry")?;
        info!(version_id, "entry removed");
        return Ok(ExitCode::SUCCESS);
    }

    let cancellation = CancellationToken::new();
    let api_key = non_empty(&config.api_key);

    let executor = HttpExecutor::new(
        reqwest::Client::new(),
        api_key.clone(),
        user_agent::browser_user_agent().to_string(),
        config.max_retries,
        Duration::from_millis(config.initial_retry_delay_ms),
        cancellation.clone(),
    );
    let api = ApiClient::new(executor);

    let fetch_config = FetchQueueConfig {
        target_version_id: config.download.model_version_id,
        target_model_id: config.download.model_id,
        all_versions: config.download.all_versions,
        user_total_limit: Some(config.download.limit as usize),
        max_pages: config.download.max_pages,
        api_delay_ms: config.api_delay_ms,
        save_path: config.save_path.clone(),
        save_version_images: config.download.save_version_images,
        save_model_images: config.download.save_model_images,
        filter: FilterConfig {
            primary_only: config.download.primary_only,
            pruned: config.download.pruned,
            fp16: config.download.fp16,
            ignore_file_name_strings: config.download.ignore_file_name_strings.clone(),
            ignore_base_models: config.download.ignore_base_models.clone(),
        },
    };

    let query = QueryParameters {
        sort: config.download.sort.clone(),
        period: config.download.period.clone(),
        limit: config.download.limit,
        nsfw: config.download.nsfw.clone(),
        types: config.download.model_types.clone(),
        base_models: config.download.base_models.clone(),
        usernames: config.download.usernames.clone(),
        query: config.download.query.clone(),
        tag: config.download.tag.clone(),
        primary_file_only: config.download.primary_only,
        cursor: None,
        page: 1,
    };

    info!("discovery starting");
    let fetch_stage = FetchQueueStage::new(&api, &store, fetch_config).with_cancellation(cancellation.clone());
    let result = match fetch_stage.run(&query).await {
        Ok(result) => result,
        Err(FetchQueueError::Api(ApiError::Unauthorized { .. })) => {
            error!("the API rejected our credentials; aborting run");
            return Ok(ExitCode::FAILURE);
        }
        Err(error) => {
            return Err(error).context("fetch-queue stage failed");
        }
    };

    info!(
        downloads = result.downloads.len(),
        total_size_kb = result.total_size_kb,
        "discovery complete"
    );

    if config.download.download_meta_only || result.downloads.is_empty() {
        info!("nothing to download");
        return Ok(ExitCode::SUCCESS);
    }

    let download_config = DownloadConfig {
        concurrency: config.download.concurrency,
        api_key,
        max_attempts: config.max_retries,
        initial_retry_delay: Duration::from_millis(config.initial_retry_delay_ms),
        transfer_timeout: civitai_dl_core::download::DEFAULT_TRANSFER_TIMEOUT,
        save_model_info: config.download.save_model_info,
        save_version_images: config.download.save_version_images,
        save_model_images: config.download.save_model_images,
    };

    let engine = DownloadEngine::new(
        download_config,
        user_agent::browser_user_agent().to_string(),
        cancellation,
    )
    .context("invalid download configuration")?;

    let stats = engine.run(result.downloads, &store).await;

    info!(
        completed = stats.completed(),
        failed = stats.failed(),
        total = stats.total(),
        "run complete"
    );

    store.close().await;

    Ok(ExitCode::SUCCESS)
}

fn apply_overrides(config: &mut Config, args: &Args) {
    if let Some(concurrency) = args.concurrency {
        config.download.concurrency = usize::from(concurrency);
    }
    if let Some(save_path) = &args.save_path {
        config.save_path = save_path.clone();
    }
    if let Some(database_path) = &args.database_path {
        config.database_path = database_path.clone();
    }
    if let Some(query) = &args.query {
        config.download.query = query.clone();
    }
    if let Some(limit) = args.limit {
        config.download.limit = limit;
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}
