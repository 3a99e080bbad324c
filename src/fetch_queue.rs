//! Fetch-Queue Stage: orchestrates paginated discovery, consults the State
//! Store, and produces the stream of [`PotentialDownload`]s the Downloader
//! consumes.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn};

use crate::api::{ApiClient, ApiError, ImageQueryParameters, QueryParameters};
use crate::filter::{self, FilterConfig};
use crate::model::{Creator, File, Model, ModelImage, ModelType, ModelVersion};
use crate::path_builder::{self, PathBuilderError};
use crate::store::{DatabaseEntry, Status, StateStore, StoreError};

/// Configuration the Fetch-Queue Stage consults, independent of the query
/// parameters sent to the server.
#[derive(Debug, Clone)]
pub struct FetchQueueConfig {
    pub target_version_id: Option<u64>,
    pub target_model_id: Option<u64>,
    pub all_versions: bool,
    pub user_total_limit: Option<usize>,
    pub max_pages: Option<u32>,
    pub api_delay_ms: u64,
    pub save_path: String,
    pub save_version_images: bool,
    pub save_model_images: bool,
    pub filter: FilterConfig,
}

impl Default for FetchQueueConfig {
    fn default() -> Self {
        Self {
            target_version_id: None,
            target_model_id: None,
            all_versions: false,
            user_total_limit: None,
            max_pages: None,
            api_delay_ms: 250,
            save_path: "downloads".to_string(),
            save_version_images: false,
            save_model_images: false,
            filter: FilterConfig::default(),
        }
    }
}

/// A single file selected for download, with everything the Downloader
/// needs to fetch, verify, and place it on disk.
#[derive(Debug, Clone)]
pub struct PotentialDownload {
    pub model_id: u64,
    pub model_name: String,
    pub model_type: ModelType,
    pub creator: Creator,
    pub version: ModelVersion,
    pub model_version_id: u64,
    pub file: File,
    pub original_images: Vec<ModelImage>,
    pub model_images: Vec<ModelImage>,
    pub base_model: String,
    pub slug: String,
    pub version_name: String,
    pub target_filepath: String,
    pub final_base_filename: String,
}

/// The outcome of a fetch-queue run: the discovered downloads plus their
/// aggregate size.
#[derive(Debug, Clone, Default)]
pub struct FetchQueueResult {
    pub downloads: Vec<PotentialDownload>,
    pub total_size_kb: f64,
}

#[derive(Debug, thiserror::Error)]
pub enum FetchQueueError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    PathBuilder(#[from] PathBuilderError),
    #[error("fetch-queue run cancelled")]
    Cancelled,
}

/// Orchestrates model discovery against the API Client, filters candidate
/// files, and reconciles them against the State Store.
pub struct FetchQueueStage<'a> {
    api: &'a ApiClient,
    store: &'a StateStore,
    config: FetchQueueConfig,
    cancellation: CancellationToken,
}

impl<'a> FetchQueueStage<'a> {
    #[must_use]
    pub fn new(api: &'a ApiClient, store: &'a StateStore, config: FetchQueueConfig) -> Self {
        Self {
            api,
            store,
            config,
            cancellation: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// Runs the full discovery algorithm described in the module docs.
    #[instrument(skip(self, query))]
    pub async fn run(&self, query: &QueryParameters) -> Result<FetchQueueResult, FetchQueueError> {
        if let Some(version_id) = self.config.target_version_id {
            return self.run_direct_version(version_id).await;
        }
        if let Some(model_id) = self.config.target_model_id {
            return self.run_direct_model(model_id).await;
        }
        self.run_paginated_search(query).await
    }

    async fn run_direct_version(&self, version_id: u64) -> Result<FetchQueueResult, FetchQueueError> {
        let version = self.api.get_version(version_id).await?;
        let model = self.api.get_model(version.model_id).await?;
        let mut result = FetchQueueResult::default();
        self.process_version(&model, &version, &mut result).await?;
        Ok(result)
    }

    async fn run_direct_model(&self, model_id: u64) -> Result<FetchQueueResult, FetchQueueError> {
        let model = self.api.get_model(model_id).await?;
        let mut result = FetchQueueResult::default();

        let versions = select_versions(&model, self.config.all_versions);
        for version in versions {
            self.process_version(&model, version, &mut result).await?;
        }
        Ok(result)
    }

    async fn run_paginated_search(
        &self,
        query: &QueryParameters,
    ) -> Result<FetchQueueResult, FetchQueueError> {
        let mut result = FetchQueueResult::default();
        let mut page = query.page.max(1);
        let mut pages_seen: u32 = 0;
        let mut cursor = query.cursor.clone();

        loop {
            if self.cancellation.is_cancelled() {
                return Err(FetchQueueError::Cancelled);
            }

            let mut page_query = query.clone();
            page_query.page = page;
            page_query.cursor = cursor.clone();

            let page_result = self.api.list_models(&page_query).await?;
            pages_seen += 1;

            if page_result.items.is_empty() {
                break;
            }

            for model in &page_result.items {
                let versions = select_versions(model, self.config.all_versions);
                for version in versions {
                    self.process_version(model, version, &mut result).await?;
                    if let Some(limit) = self.config.user_total_limit {
                        if result.downloads.len() >= limit {
                            return Ok(result);
                        }
                    }
                }
            }

            let reached_max_pages = self
                .config
                .max_pages
                .is_some_and(|max_pages| pages_seen >= max_pages);
            if reached_max_pages || page_result.next_cursor.is_none() {
                break;
            }
            cursor = page_result.next_cursor;

            if self.config.api_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.api_delay_ms)).await;
            }

            page += 1;
        }

        Ok(result)
    }

    async fn process_version(
        &self,
        model: &Model,
        version: &ModelVersion,
        result: &mut FetchQueueResult,
    ) -> Result<(), FetchQueueError> {
        let mut model_images: Option<Vec<ModelImage>> = None;

        for file in &version.files {
            if !filter::is_admissible(file, model.model_type, &version.base_model, &self.config.filter) {
                continue;
            }

            if self.reconcile_with_store(model, version, file).await? {
                let target_filepath = build_target_path(&self.config.save_path, model, version, file)?;
                let final_base_filename = format!("{}_{}", version.id, path_builder::slug(&file.name));

                if self.config.save_model_images && model_images.is_none() {
                    model_images = Some(self.fetch_model_images(model.id).await?);
                }

                result.downloads.push(PotentialDownload {
                    model_id: model.id,
                    model_name: model.name.clone(),
                    model_type: model.model_type,
                    creator: model.creator.clone(),
                    version: ModelVersion {
                        files: Vec::new(),
                        images: Vec::new(),
                        ..version.clone()
                    },
                    model_version_id: version.id,
                    file: file.clone(),
                    original_images: version.images.clone(),
                    model_images: model_images.clone().unwrap_or_default(),
                    base_model: version.base_model.clone(),
                    slug: path_builder::slug(&model.name),
                    version_name: version.name.clone(),
                    target_filepath,
                    final_base_filename,
                });
                result.total_size_kb += file.size_kb;
            }
        }
        Ok(())
    }

    /// Fetches model-level preview images via a dedicated `images` lookup
    /// (the server has no "images" field on the model payload itself).
    /// Only called when `SaveModelImages` is set, and once per model within
    /// a `process_version` call rather than cached across the whole run.
    async fn fetch_model_images(&self, model_id: u64) -> Result<Vec<ModelImage>, FetchQueueError> {
        let params = ImageQueryParameters {
            limit: 100,
            model_id: Some(model_id),
            ..ImageQueryParameters::default()
        };
        let page = self.api.list_images(&params).await?;
        Ok(page.items)
    }

    /// Returns `true` if `file` should be enqueued, applying the four State
    /// Store interaction branches from the module docs. Creates or
    /// overwrites the Pending entry as a side effect where the branch calls
    /// for it.
    async fn reconcile_with_store(
        &self,
        model: &Model,
        version: &ModelVersion,
        file: &File,
    ) -> Result<bool, FetchQueueError> {
        let existing = self.store.get(version.id).await?;

        let Some(existing) = existing else {
            self.store
                .put(&pending_entry(model, version, file))
                .await?;
            return Ok(true);
        };

        let matches_existing_file = existing
            .files
            .iter()
            .any(|existing_file| existing_file.id == file.id && existing_file.hashes.crc32 == file.hashes.crc32);

        if matches_existing_file && existing.status == Status::Downloaded {
            return Ok(self.config.save_version_images || self.config.save_model_images);
        }

        if matches_existing_file {
            // Pending or Error: leave the stored state untouched, just enqueue.
            return Ok(true);
        }

        // File id or CRC32 no longer matches what we have on record: the
        // version was updated upstream, re-enqueue as Pending.
        warn!(version_id = version.id, file_id = file.id, "stored file no longer matches upstream, re-enqueuing");
        self.store.put(&pending_entry(model, version, file)).await?;
        Ok(true)
    }
}

fn pending_entry(model: &Model, version: &ModelVersion, file: &File) -> DatabaseEntry {
    DatabaseEntry {
        version_id: version.id,
        model_id: model.id,
        model_name: model.name.clone(),
        model_type: model.model_type,
        creator: model.creator.clone(),
        base_model: version.base_model.clone(),
        version_name: version.name.clone(),
        files: vec![file.clone()],
        images: version.images.clone(),
        stats: version.stats.clone(),
        folder: String::new(),
        filename: String::new(),
        status: Status::Pending,
        error_details: None,
        updated_at: String::new(),
    }
}

/// `allVersions=false` takes the first (newest) version only; `true`
/// iterates all versions, in server order.
fn select_versions(model: &Model, all_versions: bool) -> &[ModelVersion] {
    if all_versions || model.versions.len() <= 1 {
        &model.versions
    } else {
        &model.versions[..1]
    }
}

fn build_target_path(
    save_path: &str,
    model: &Model,
    version: &ModelVersion,
    file: &File,
) -> Result<String, PathBuilderError> {
    let mut data = BTreeMap::new();
    let version_id_str = version.id.to_string();
    data.insert("modelType", model.model_type.as_str());
    data.insert("modelName", model.name.as_str());
    data.insert("versionId", version_id_str.as_str());

    let subdir = path_builder::build_path("{modelType}/{modelName}/{versionId}", &data)?;
    Ok(format!(
        "{save_path}/{subdir}/{}_{}",
        version.id,
        path_builder::slug(&file.name)
    ))
}
