//! Clipframe - video keyframe search
//!
//! Loads precomputed CLIP keyframe embeddings, per-frame timing tables and
//! object detections into a vector database, and searches them by text or
//! image.
//!
//! # Overview
//!
//! A load run goes one way:
//! - `dataset` finds the videos and checks that every source is present
//! - `source` reads one video's embedding matrix, timing CSV and detections
//! - `joiner` aligns them into one record per keyframe
//! - `uploader` pushes the records to the store in bounded, retried batches
//!
//! `loader` drives the run and `search` is the independent read path.
//!
//! # Architecture
//!
//! - `config` - Configuration management
//! - `dataset` - Dataset layout, naming and scanning
//! - `source` - Source readers (`.npy`, `.csv`, detection `.json`)
//! - `joiner` - Record joiner and persisted payload shape
//! - `vector_store` - Vector database abstraction (Qdrant, in-memory)
//! - `uploader` - Batch uploader with retry and backoff
//! - `loader` - Load pipeline coordination
//! - `encoder` - Query encoding through an external CLIP service
//! - `search` - Query service (merge, rank, group, paginate)
//!
//! # Example
//!
//! ```rust,no_run
//! use clipframe::config::Settings;
//! use clipframe::loader::{LoadOptions, Loader};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let loader = Loader::new(settings)?;
//!
//!     let report = loader
//!         .run(&LoadOptions::default(), &CancellationToken::new())
//!         .await?;
//!     println!("Uploaded {} keyframes", report.records_uploaded);
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod dataset;
pub mod encoder;
pub mod error;
pub mod joiner;
pub mod loader;
pub mod search;
pub mod source;
pub mod uploader;
pub mod vector_store;

pub use error::{ClipframeError, Result};
