//! State Store: the single owner of on-disk persistence for known model
//! versions and pagination bookmarks.
//!
//! Backed by the schema in `migrations/0001_init.sql`: one `entries` row per
//! version joined to `stats` (1:1), `files` and `images` (1:N, cascading on
//! delete). Writes serialize through a single `sqlx::Transaction`; the pool
//! itself provides shared-read/exclusive-write locking via SQLite's WAL mode.

mod entry;
mod error;

pub use entry::{version_key, DatabaseEntry, Status};
pub use error::{DbErrorKind, StoreError};

use sqlx::sqlite::SqlitePool;
use sqlx::{FromRow, Row};
use tracing::instrument;

use crate::db::Database;
use crate::model::{Creator, File, FileHashes, FileMetadata, ModelImage, ModelType, VersionStats};

/// Returned by [`StateStore::fold`] for each persisted item, in the order
/// the store guarantees: all entries by ascending `versionId`, then all
/// pagination bookmarks.
#[derive(Debug, Clone)]
pub enum FoldItem {
    Entry(DatabaseEntry),
    PageBookmark { query_hash: String, page: u32 },
}

/// The default page bookmark when a query hash has never been seen.
pub const DEFAULT_PAGE: u32 = 1;

#[derive(Debug, FromRow)]
struct EntryRow {
    version_id: i64,
    model_id: i64,
    model_name: String,
    model_type: String,
    creator_username: String,
    creator_image: Option<String>,
    base_model: String,
    version_name: String,
    folder: String,
    filename: String,
    status: String,
    error_details: Option<String>,
    updated_at: String,
}

#[derive(Debug, FromRow)]
struct StatsRow {
    download_count: i64,
    rating_count: i64,
    rating: f64,
}

#[derive(Debug, FromRow)]
struct FileRow {
    file_id: i64,
    name: String,
    size_kb: f64,
    kind: Option<String>,
    is_primary: i64,
    download_url: String,
    hash_auto_v2: Option<String>,
    hash_sha256: Option<String>,
    hash_crc32: Option<String>,
    hash_blake3: Option<String>,
    meta_fp: Option<String>,
    meta_size: Option<String>,
    meta_format: Option<String>,
}

#[derive(Debug, FromRow)]
struct ImageRow {
    image_id: i64,
    url: String,
    blurhash: Option<String>,
    width: Option<i64>,
    height: Option<i64>,
    nsfw: i64,
    nsfw_level_json: Option<String>,
}

/// Persistent key/value facade over the normalized schema.
#[derive(Debug, Clone)]
pub struct StateStore {
    db: Database,
}

impl StateStore {
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn pool(&self) -> &SqlitePool {
        self.db.pool()
    }

    /// Upserts `entry`, fully replacing its child `files`/`images` rows
    /// inside a single transaction. On failure the prior state is preserved.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ConstraintViolation`] if `entry.status` is not
    /// one of `Pending`/`Downloaded`/`Error`, or any database error is hit.
    #[instrument(skip(self, entry), fields(version_id = entry.version_id))]
    pub async fn put(&self, entry: &DatabaseEntry) -> Result<(), StoreError> {
        let mut tx = self.pool().begin().await?;

        sqlx::query(
            "INSERT INTO entries (version_id, model_id, model_name, model_type, creator_username, creator_image, base_model, version_name, folder, filename, status, error_details)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT(version_id) DO UPDATE SET
                model_id = excluded.model_id,
                model_name = excluded.model_name,
                model_type = excluded.model_type,
                creator_username = excluded.creator_username,
                creator_image = excluded.creator_image,
                base_model = excluded.base_model,
                version_name = excluded.version_name,
                folder = excluded.folder,
                filename = excluded.filename,
                status = excluded.status,
                error_details = excluded.error_details",
        )
        .bind(i64::try_from(entry.version_id).unwrap_or(i64::MAX))
        .bind(i64::try_from(entry.model_id).unwrap_or(i64::MAX))
        .bind(&entry.model_name)
        .bind(entry.model_type.as_str())
        .bind(&entry.creator.username)
        .bind(&entry.creator.image)
        .bind(&entry.base_model)
        .bind(&entry.version_name)
        .bind(&entry.folder)
        .bind(&entry.filename)
        .bind(entry.status.as_str())
        .bind(&entry.error_details)
        .execute(&mut *tx)
        .await?;

        let version_id = i64::try_from(entry.version_id).unwrap_or(i64::MAX);

        sqlx::query(
            "INSERT INTO stats (version_id, download_count, rating_count, rating)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(version_id) DO UPDATE SET
                download_count = excluded.download_count,
                rating_count = excluded.rating_count,
                rating = excluded.rating",
        )
        .bind(version_id)
        .bind(entry.stats.download_count)
        .bind(entry.stats.rating_count)
        .bind(entry.stats.rating)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM files WHERE version_id = ?1")
            .bind(version_id)
            .execute(&mut *tx)
            .await?;

        for file in &entry.files {
            sqlx::query(
                "INSERT INTO files (version_id, file_id, name, size_kb, kind, is_primary, download_url, hash_auto_v2, hash_sha256, hash_crc32, hash_blake3, meta_fp, meta_size, meta_format)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            )
            .bind(version_id)
            .bind(i64::try_from(file.id).unwrap_or(i64::MAX))
            .bind(&file.name)
            .bind(file.size_kb)
            .bind(&file.kind)
            .bind(i64::from(file.primary))
            .bind(&file.download_url)
            .bind(&file.hashes.auto_v2)
            .bind(&file.hashes.sha256)
            .bind(&file.hashes.crc32)
            .bind(&file.hashes.blake3)
            .bind(&file.metadata.fp)
            .bind(&file.metadata.size)
            .bind(&file.metadata.format)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("DELETE FROM images WHERE version_id = ?1")
            .bind(version_id)
            .execute(&mut *tx)
            .await?;

        for image in &entry.images {
            let nsfw_level_json = image
                .nsfw_level
                .as_ref()
                .map(serde_json::to_string)
                .transpose()
                .map_err(StoreError::Serialize)?;

            sqlx::query(
                "INSERT INTO images (version_id, image_id, url, blurhash, width, height, nsfw, nsfw_level_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )
            .bind(version_id)
            .bind(i64::try_from(image.id).unwrap_or(i64::MAX))
            .bind(&image.url)
            .bind(&image.blurhash)
            .bind(image.width.map(i64::from))
            .bind(image.height.map(i64::from))
            .bind(i64::from(image.nsfw))
            .bind(nsfw_level_json)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Reconstructs the `DatabaseEntry` for `version_id`, joining the parent
    /// row, stats, files, and images. Returns `None` if absent.
    #[instrument(skip(self))]
    pub async fn get(&self, version_id: u64) -> Result<Option<DatabaseEntry>, StoreError> {
        let id = i64::try_from(version_id).unwrap_or(i64::MAX);

        let Some(entry_row) =
            sqlx::query_as::<_, EntryRow>("SELECT * FROM entries WHERE version_id = ?1")
                .bind(id)
                .fetch_optional(self.pool())
                .await?
        else {
            return Ok(None);
        };

        let stats_row =
            sqlx::query_as::<_, StatsRow>("SELECT * FROM stats WHERE version_id = ?1")
                .bind(id)
                .fetch_optional(self.pool())
                .await?
                .unwrap_or(StatsRow {
                    download_count: 0,
                    rating_count: 0,
                    rating: 0.0,
                });

        let file_rows = sqlx::query_as::<_, FileRow>(
            "SELECT file_id, name, size_kb, kind, is_primary, download_url, hash_auto_v2, hash_sha256, hash_crc32, hash_blake3, meta_fp, meta_size, meta_format
             FROM files WHERE version_id = ?1 ORDER BY id ASC",
        )
        .bind(id)
        .fetch_all(self.pool())
        .await?;

        let image_rows = sqlx::query_as::<_, ImageRow>(
            "SELECT image_id, url, blurhash, width, height, nsfw, nsfw_level_json
             FROM images WHERE version_id = ?1 ORDER BY id ASC",
        )
        .bind(id)
        .fetch_all(self.pool())
        .await?;

        Ok(Some(reconstruct(entry_row, stats_row, file_rows, image_rows)?))
    }

    /// Existence check without reconstructing the full entry.
    #[instrument(skip(self))]
    pub async fn has(&self, version_id: u64) -> Result<bool, StoreError> {
        let id = i64::try_from(version_id).unwrap_or(i64::MAX);
        let row = sqlx::query("SELECT 1 FROM entries WHERE version_id = ?1")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(row.is_some())
    }

    /// Cascades deletion of `version_id` and its child rows.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the key does not exist.
    #[instrument(skip(self))]
    pub async fn delete(&self, version_id: u64) -> Result<(), StoreError> {
        let id = i64::try_from(version_id).unwrap_or(i64::MAX);
        let result = sqlx::query("DELETE FROM entries WHERE version_id = ?1")
            .bind(id)
            .execute(self.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(version_key(version_id)));
        }
        Ok(())
    }

    /// Streams every entry (ascending `versionId`) then every pagination
    /// bookmark to `callback`. A callback error aborts iteration.
    #[instrument(skip(self, callback))]
    pub async fn fold<F>(&self, mut callback: F) -> Result<(), StoreError>
    where
        F: FnMut(FoldItem) -> Result<(), StoreError>,
    {
        let entry_rows =
            sqlx::query_as::<_, EntryRow>("SELECT * FROM entries ORDER BY version_id ASC")
                .fetch_all(self.pool())
                .await?;

        for entry_row in entry_rows {
            let version_id = entry_row.version_id;
            let stats_row =
                sqlx::query_as::<_, StatsRow>("SELECT * FROM stats WHERE version_id = ?1")
                    .bind(version_id)
                    .fetch_optional(self.pool())
                    .await?
                    .unwrap_or(StatsRow {
                        download_count: 0,
                        rating_count: 0,
                        rating: 0.0,
                    });
            let file_rows = sqlx::query_as::<_, FileRow>(
                "SELECT file_id, name, size_kb, kind, is_primary, download_url, hash_auto_v2, hash_sha256, hash_crc32, hash_blake3, meta_fp, meta_size, meta_format
                 FROM files WHERE version_id = ?1 ORDER BY id ASC",
            )
            .bind(version_id)
            .fetch_all(self.pool())
            .await?;
            let image_rows = sqlx::query_as::<_, ImageRow>(
                "SELECT image_id, url, blurhash, width, height, nsfw, nsfw_level_json
                 FROM images WHERE version_id = ?1 ORDER BY id ASC",
            )
            .bind(version_id)
            .fetch_all(self.pool())
            .await?;

            let entry = reconstruct(entry_row, stats_row, file_rows, image_rows)?;
            callback(FoldItem::Entry(entry))?;
        }

        let bookmark_rows = sqlx::query("SELECT query_hash, page FROM page_state")
            .fetch_all(self.pool())
            .await?;

        for row in bookmark_rows {
            let query_hash: String = row.try_get("query_hash")?;
            let page: i64 = row.try_get("page")?;
            callback(FoldItem::PageBookmark {
                query_hash,
                page: u32::try_from(page).unwrap_or(u32::MAX),
            })?;
        }

        Ok(())
    }

    /// Returns the bookmarked page for `query_hash`, or [`DEFAULT_PAGE`] if
    /// never set. This is NOT the `NotFound` sentinel `get`/`delete` use.
    #[instrument(skip(self))]
    pub async fn get_page_state(&self, query_hash: &str) -> Result<u32, StoreError> {
        let row = sqlx::query("SELECT page FROM page_state WHERE query_hash = ?1")
            .bind(query_hash)
            .fetch_optional(self.pool())
            .await?;

        match row {
            Some(row) => {
                let page: i64 = row.try_get("page")?;
                Ok(u32::try_from(page).unwrap_or(u32::MAX))
            }
            None => Ok(DEFAULT_PAGE),
        }
    }

    /// Upserts the bookmark for `query_hash`.
    #[instrument(skip(self))]
    pub async fn set_page_state(&self, query_hash: &str, page: u32) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO page_state (query_hash, page) VALUES (?1, ?2)
             ON CONFLICT(query_hash) DO UPDATE SET page = excluded.page",
        )
        .bind(query_hash)
        .bind(i64::from(page))
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Removes the bookmark for `query_hash`; a no-op if absent.
    #[instrument(skip(self))]
    pub async fn delete_page_state(&self, query_hash: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM page_state WHERE query_hash = ?1")
            .bind(query_hash)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Gracefully closes the underlying connection pool.
    pub async fn close(self) {
        self.db.close().await;
    }
}

fn reconstruct(
    entry_row: EntryRow,
    stats_row: StatsRow,
    file_rows: Vec<FileRow>,
    image_rows: Vec<ImageRow>,
) -> Result<DatabaseEntry, StoreError> {
    let model_type: ModelType =
        serde_json::from_value(serde_json::Value::String(entry_row.model_type.clone()))
            .map_err(StoreError::Serialize)?;

    let status: Status = entry_row
        .status
        .parse()
        .map_err(StoreError::ConstraintViolation)?;

    let files = file_rows
        .into_iter()
        .map(|row| File {
            id: u64::try_from(row.file_id).unwrap_or_default(),
            name: row.name,
            size_kb: row.size_kb,
            kind: row.kind,
            primary: row.is_primary != 0,
            download_url: row.download_url,
            hashes: FileHashes {
                auto_v2: row.hash_auto_v2,
                sha256: row.hash_sha256,
                crc32: row.hash_crc32,
                blake3: row.hash_blake3,
            },
            metadata: FileMetadata {
                fp: row.meta_fp,
                size: row.meta_size,
                format: row.meta_format,
            },
        })
        .collect();

    let images = image_rows
        .into_iter()
        .map(|row| -> Result<ModelImage, StoreError> {
            let nsfw_level = row
                .nsfw_level_json
                .map(|json| serde_json::from_str(&json))
                .transpose()
                .map_err(StoreError::Serialize)?;

            Ok(ModelImage {
                id: u64::try_from(row.image_id).unwrap_or_default(),
                url: row.url,
                blurhash: row.blurhash,
                width: row.width.map(|value| u32::try_from(value).unwrap_or_default()),
                height: row.height.map(|value| u32::try_from(value).unwrap_or_default()),
                nsfw: row.nsfw != 0,
                nsfw_level,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(DatabaseEntry {
        version_id: u64::try_from(entry_row.version_id).unwrap_or_default(),
        model_id: u64::try_from(entry_row.model_id).unwrap_or_default(),
        model_name: entry_row.model_name,
        model_type,
        creator: Creator {
            username: entry_row.creator_username,
            image: entry_row.creator_image,
        },
        base_model: entry_row.base_model,
        version_name: entry_row.version_name,
        files,
        images,
        stats: VersionStats {
            download_count: stats_row.download_count,
            rating_count: stats_row.rating_count,
            rating: stats_row.rating,
        },
        folder: entry_row.folder,
        filename: entry_row.filename,
        status,
        error_details: entry_row.error_details,
        updated_at: entry_row.updated_at,
    })
}
