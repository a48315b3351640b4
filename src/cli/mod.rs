//! CLI module for Clipframe.

pub mod commands;
mod output;

pub use output::Output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Clipframe - video keyframe search
///
/// Loads precomputed CLIP keyframe embeddings, frame timings and object
/// detections into a vector database, and searches them by text or image.
#[derive(Parser, Debug)]
#[command(name = "clipframe")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "CLIPFRAME_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the videos in the dataset and what each one is missing
    Scan,

    /// Load keyframes into the vector database
    Load {
        /// Read and join everything but upload into an in-memory store
        #[arg(long)]
        dry_run: bool,

        /// Videos processed concurrently (default: ingest.workers)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Process only the first N complete videos
        #[arg(short, long)]
        limit: Option<usize>,

        /// Load only this video (repeatable)
        #[arg(long = "video")]
        videos: Vec<String>,

        /// Write the run report as JSON to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Search keyframes by text
    Search {
        /// One or more text queries; results are merged
        #[arg(required = true)]
        queries: Vec<String>,

        /// Only keyframes where this object was detected (repeatable, all must match)
        #[arg(short, long = "object")]
        objects: Vec<String>,

        /// Maximum number of results
        #[arg(short, long, default_value = "10")]
        limit: usize,

        /// Minimum similarity score (0.0-1.0)
        #[arg(short, long, default_value = "0.0")]
        min_score: f32,
    },

    /// Show collection statistics
    Info,

    /// Start the search API server
    Serve {
        /// Host to bind to (default: server.host)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to (default: server.port)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Write a configuration file with the current settings
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}
