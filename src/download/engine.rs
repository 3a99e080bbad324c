//! Downloader: a bounded worker pool that turns [`PotentialDownload`]s into
//! on-disk files and [`DatabaseEntry`] updates.
//!
//! Workers pull from a fixed work list (not a persistent queue — the
//! Fetch-Queue Stage already resolved exactly what needs downloading for
//! this run) and run with `Concurrency` permits held via a semaphore, the
//! same owned-permit-plus-spawn pattern the API Client's executor would use
//! for a batch of requests.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::fetch_queue::PotentialDownload;
use crate::model::ModelImage;
use crate::path_builder;
use crate::store::{DatabaseEntry, StateStore, Status};

use super::client::{TransferClient, DEFAULT_TRANSFER_TIMEOUT};
use super::error::DownloadError;

/// Concurrency bounds mirroring the teacher's sanity-checked range for a
/// semaphore permit count: at least one worker, never an unbounded fan-out.
pub const DEFAULT_CONCURRENCY: usize = 10;
const MIN_CONCURRENCY: usize = 1;
const MAX_CONCURRENCY: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid concurrency {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}")]
    InvalidConcurrency { value: usize },
}

/// What the Downloader needs beyond the per-file transfer parameters: where
/// to write auxiliary artifacts and whether to bother.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    pub concurrency: usize,
    pub api_key: Option<String>,
    pub max_attempts: u32,
    pub initial_retry_delay: Duration,
    pub transfer_timeout: Duration,
    pub save_model_info: bool,
    pub save_version_images: bool,
    pub save_model_images: bool,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            api_key: None,
            max_attempts: 3,
            initial_retry_delay: Duration::from_secs(1),
            transfer_timeout: DEFAULT_TRANSFER_TIMEOUT,
            save_model_info: false,
            save_version_images: false,
            save_model_images: false,
        }
    }
}

/// Atomic run counters, reported once all workers finish.
#[derive(Debug, Default)]
pub struct DownloadStats {
    completed: AtomicUsize,
    failed: AtomicUsize,
}

impl DownloadStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn increment_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    fn increment_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.completed() + self.failed()
    }
}

/// Runs a bounded pool of transfer workers over a resolved work list.
pub struct DownloadEngine {
    semaphore: Arc<Semaphore>,
    transfer: Arc<TransferClient>,
    config: DownloadConfig,
    cancellation: CancellationToken,
}

impl DownloadEngine {
    pub fn new(
        config: DownloadConfig,
        user_agent: String,
        cancellation: CancellationToken,
    ) -> Result<Self, EngineError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&config.concurrency) {
            return Err(EngineError::InvalidConcurrency { value: config.concurrency });
        }

        let transfer = TransferClient::new(
            reqwest::Client::new(),
            config.api_key.clone(),
            user_agent,
            config.max_attempts,
            config.initial_retry_delay,
            config.transfer_timeout,
            cancellation.clone(),
        );

        Ok(Self {
            semaphore: Arc::new(Semaphore::new(config.concurrency)),
            transfer: Arc::new(transfer),
            config,
            cancellation,
        })
    }

    /// Downloads every item in `downloads`, writing each outcome to `store`
    /// as it lands. Items still queued when cancellation fires are skipped
    /// (left at whatever state the store already has for them).
    #[instrument(skip(self, downloads, store), fields(count = downloads.len()))]
    pub async fn run(&self, downloads: Vec<PotentialDownload>, store: &StateStore) -> DownloadStats {
        let stats = Arc::new(DownloadStats::new());
        let mut handles = Vec::with_capacity(downloads.len());

        for download in downloads {
            if self.cancellation.is_cancelled() {
                break;
            }

            let permit = match Arc::clone(&self.semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(_closed) => break,
            };

            let transfer = Arc::clone(&self.transfer);
            let store = store.clone();
            let stats = Arc::clone(&stats);
            let config = self.config.clone();

            handles.push(tokio::spawn(async move {
                let _permit = permit;
                process_one(&transfer, &store, &download, &config, &stats).await;
            }));
        }

        for handle in handles {
            if let Err(error) = handle.await {
                warn!(error = %error, "download task panicked");
            }
        }

        match Arc::try_unwrap(stats) {
            Ok(stats) => stats,
            Err(shared) => DownloadStats {
                completed: AtomicUsize::new(shared.completed()),
                failed: AtomicUsize::new(shared.failed()),
            },
        }
    }
}

async fn process_one(
    transfer: &TransferClient,
    store: &StateStore,
    download: &PotentialDownload,
    config: &DownloadConfig,
    stats: &DownloadStats,
) {
    let final_path = PathBuf::from(&download.target_filepath);
    let part_path = PathBuf::from(format!("{}.part", download.target_filepath));

    match transfer.fetch_to_part(&download.file.download_url, &part_path).await {
        Ok(digests) => {
            let expected = download.file.hashes.blake3.as_deref().unwrap_or("");
            if !digests.matches_blake3(expected) {
                let _ = tokio::fs::remove_file(&part_path).await;
                let details = format!("hash mismatch (expected {expected}, got {})", digests.blake3);
                warn!(version_id = download.model_version_id, %details, "hash mismatch, file not accepted");
                store_error(store, download, &details).await;
                stats.increment_failed();
                return;
            }

            if let Err(error) = tokio::fs::rename(&part_path, &final_path).await {
                let details = format!("could not move completed download into place: {error}");
                warn!(version_id = download.model_version_id, %details);
                let _ = tokio::fs::remove_file(&part_path).await;
                store_error(store, download, &details).await;
                stats.increment_failed();
                return;
            }

            let entry = downloaded_entry(download, &final_path);
            if let Err(error) = store.put(&entry).await {
                warn!(version_id = download.model_version_id, error = %error, "file downloaded but state store update failed");
                stats.increment_failed();
                return;
            }

            save_auxiliary(transfer, download, config, &final_path).await;

            info!(version_id = download.model_version_id, path = %final_path.display(), "download completed");
            stats.increment_completed();
        }
        Err(error) => {
            let _ = tokio::fs::remove_file(&part_path).await;
            if matches!(error, DownloadError::Cancelled { .. }) {
                return;
            }
            warn!(version_id = download.model_version_id, error = %error, "download failed");
            store_error(store, download, &error.to_string()).await;
            stats.increment_failed();
        }
    }
}

async fn store_error(store: &StateStore, download: &PotentialDownload, details: &str) {
    let entry = error_entry(download, details);
    if let Err(error) = store.put(&entry).await {
        warn!(version_id = download.model_version_id, error = %error, "failed to record download error in state store");
    }
}

fn downloaded_entry(download: &PotentialDownload, final_path: &Path) -> DatabaseEntry {
    DatabaseEntry {
        status: Status::Downloaded,
        error_details: None,
        ..base_entry(download, final_path)
    }
}

fn error_entry(download: &PotentialDownload, details: &str) -> DatabaseEntry {
    let final_path = PathBuf::from(&download.target_filepath);
    DatabaseEntry {
        status: Status::Error,
        error_details: Some(details.to_string()),
        ..base_entry(download, &final_path)
    }
}

fn base_entry(download: &PotentialDownload, final_path: &Path) -> DatabaseEntry {
    DatabaseEntry {
        version_id: download.model_version_id,
        model_id: download.model_id,
        model_name: download.model_name.clone(),
        model_type: download.model_type,
        creator: download.creator.clone(),
        base_model: download.base_model.clone(),
        version_name: download.version_name.clone(),
        files: vec![download.file.clone()],
        images: download.original_images.clone(),
        stats: download.version.stats.clone(),
        folder: final_path
            .parent()
            .map(|parent| parent.to_string_lossy().to_string())
            .unwrap_or_default(),
        filename: final_path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default(),
        status: Status::Pending,
        error_details: None,
        updated_at: String::new(),
    }
}

/// Writes `modelInfo.json` and preview images alongside the downloaded
/// file. Best-effort: every failure here is logged and swallowed, never
/// demoting a Downloaded entry back to Error, per the component contract.
async fn save_auxiliary(
    transfer: &TransferClient,
    download: &PotentialDownload,
    config: &DownloadConfig,
    final_path: &Path,
) {
    let Some(parent) = final_path.parent() else { return };

    if config.save_model_info {
        if let Err(error) = write_model_info(download, parent).await {
            warn!(version_id = download.model_version_id, error = %error, "failed to write modelInfo.json");
        }
    }

    if config.save_version_images {
        save_images(transfer, &download.original_images, &parent.join("images/version")).await;
    }

    if config.save_model_images {
        save_images(transfer, &download.model_images, &parent.join("images/model")).await;
    }
}

#[derive(Serialize)]
struct ModelInfoRecord<'a> {
    model_id: u64,
    model_name: &'a str,
    model_type: &'a str,
    creator: &'a str,
    version_id: u64,
    version_name: &'a str,
    base_model: &'a str,
}

async fn write_model_info(download: &PotentialDownload, dir: &Path) -> std::io::Result<()> {
    let record = ModelInfoRecord {
        model_id: download.model_id,
        model_name: &download.model_name,
        model_type: download.model_type.as_str(),
        creator: &download.creator.username,
        version_id: download.model_version_id,
        version_name: &download.version_name,
        base_model: &download.base_model,
    };
    let body = serde_json::to_vec_pretty(&record).unwrap_or_default();
    tokio::fs::create_dir_all(dir).await?;
    tokio::fs::write(dir.join("modelInfo.json"), body).await
}

async fn save_images(transfer: &TransferClient, images: &[ModelImage], dir: &Path) {
    if images.is_empty() {
        return;
    }
    if let Err(error) = tokio::fs::create_dir_all(dir).await {
        warn!(dir = %dir.display(), error = %error, "failed to create image directory");
        return;
    }

    for image in images {
        let extension = guess_extension(&image.url);
        let filename = format!("{}.{extension}", path_builder::slug(&image.id.to_string()));
        match transfer.fetch_bytes(&image.url).await {
            Ok(bytes) => {
                if let Err(error) = tokio::fs::write(dir.join(&filename), bytes).await {
                    warn!(image_id = image.id, error = %error, "failed to write preview image");
                }
            }
            Err(error) => {
                warn!(image_id = image.id, error = %error, "failed to fetch preview image");
            }
        }
    }
}

fn guess_extension(url: &str) -> &str {
    url.rsplit('/')
        .next()
        .and_then(|segment| segment.rsplit_once('.'))
        .map(|(_, extension)| extension)
        .filter(|extension| extension.len() <= 4 && extension.chars().all(char::is_alphanumeric))
        .unwrap_or("jpg")
}
