//! Downloader: streams files from the public API to disk, verifying each
//! transfer's BLAKE3 digest before it is accepted.
//!
//! # Example
//!
//! ```no_run
//! use civitai_dl_core::download::{DownloadConfig, DownloadEngine};
//! use civitai_dl_core::store::StateStore;
//! use civitai_dl_core::db::Database;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = StateStore::new(Database::new_in_memory().await?);
//! let engine = DownloadEngine::new(
//!     DownloadConfig::default(),
//!     "Mozilla/5.0".to_string(),
//!     CancellationToken::new(),
//! )?;
//! let stats = engine.run(Vec::new(), &store).await;
//! println!("completed: {}, failed: {}", stats.completed(), stats.failed());
//! # Ok(())
//! # }
//! ```

mod client;
mod engine;
mod error;

pub use client::{TransferClient, DEFAULT_TRANSFER_TIMEOUT};
pub use engine::{DownloadConfig, DownloadEngine, DownloadStats, EngineError, DEFAULT_CONCURRENCY};
pub use error::DownloadError;
