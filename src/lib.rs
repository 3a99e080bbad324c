//! Downloader Core Library
//!
//! A resumable, idempotent bulk downloader for a public model-hosting API.
//! Discovers models via the HTTP Executor/API Client, filters and
//! deduplicates candidate files against a SQLite-backed State Store, and
//! streams accepted files to disk with BLAKE3 verification.
//!
//! # Architecture
//!
//! - [`api`] - HTTP Executor and typed API Client
//! - [`config`] - configuration loaded from TOML
//! - [`db`] - SQLite connection and migrations
//! - [`download`] - streaming transfer client and worker-pool engine
//! - [`fetch_queue`] - discovery, filtering, and State Store reconciliation
//! - [`filter`] - pure file admissibility rules
//! - [`hash`] - streaming digest computation
//! - [`model`] - read-only API response types
//! - [`path_builder`] - template-driven on-disk path construction
//! - [`store`] - the persistent State Store
//! - [`user_agent`] - the shared User-Agent string

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod config;
pub mod db;
pub mod download;
pub mod fetch_queue;
pub mod filter;
pub mod hash;
pub mod model;
pub mod path_builder;
pub mod store;
pub mod user_agent;

pub use config::Config;
pub use db::Database;
pub use download::{DownloadConfig, DownloadEngine, DownloadStats, EngineError};
pub use fetch_queue::{FetchQueueConfig, FetchQueueError, FetchQueueResult, FetchQueueStage, PotentialDownload};
pub use store::{DatabaseEntry, StateStore, Status, StoreError};
