//! Load command implementation.

use crate::cli::output::format_duration;
use crate::cli::Output;
use crate::config::Settings;
use crate::error::ClipframeError;
use crate::loader::{LoadOptions, Loader, RunReport};
use crate::vector_store::MemoryVectorStore;
use anyhow::Result;
use console::style;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Run the load command.
pub async fn run_load(
    options: LoadOptions,
    dry_run: bool,
    report_path: Option<PathBuf>,
    settings: Settings,
) -> Result<()> {
    let collection = settings.store.collection.clone();
    let loader = if dry_run {
        Output::info("Dry run: records are uploaded to an in-memory store");
        Loader::with_store(settings, Arc::new(MemoryVectorStore::new()))
    } else {
        Output::info(&format!(
            "Loading into '{}' at {}",
            collection, settings.store.url
        ));
        Loader::new(settings)?
    };

    let pb = Output::progress_bar(0, "videos");
    let loader = loader.with_progress(pb.clone());

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            Output::warning("Interrupted, finishing in-flight batches...");
            interrupt.cancel();
        }
    });

    let result = loader.run(&options, &cancel).await;
    pb.finish_and_clear();

    let (report, aborted) = match result {
        Ok(report) => (report, None),
        Err(ClipframeError::RunAborted { report, error }) => (*report, Some(*error)),
        Err(e) => {
            Output::error(&format!("Load aborted: {}", e));
            return Err(e.into());
        }
    };

    print_summary(&report, aborted.is_some());

    if let Some(path) = report_path {
        report.save(&path)?;
        Output::info(&format!("Report written to {}", path.display()));
    }

    match aborted {
        Some(e) => {
            Output::error(&format!("Load aborted: {}", e));
            Err(e.into())
        }
        None => Ok(()),
    }
}

fn print_summary(report: &RunReport, aborted: bool) {
    Output::header("Load summary");
    Output::kv("Collection", &report.collection);
    Output::kv("Videos found", &report.videos_found.to_string());
    Output::kv(
        "Videos loaded",
        &format!("{}/{}", report.videos_succeeded, report.videos_attempted),
    );
    Output::kv("Records uploaded", &report.records_uploaded.to_string());
    Output::kv("Records failed", &report.records_failed.to_string());
    if report.records_not_submitted > 0 {
        Output::kv(
            "Records not submitted",
            &report.records_not_submitted.to_string(),
        );
    }
    Output::kv("Elapsed", &format_duration(report.elapsed_secs));

    if !report.skipped.is_empty() {
        Output::header(&format!("Skipped videos ({})", report.skipped.len()));
        for skipped in &report.skipped {
            Output::list_item(&format!(
                "{}: {}",
                style(&skipped.video_id).bold(),
                skipped.reason
            ));
        }
    }

    if !report.failed_batches.is_empty() {
        Output::header(&format!("Failed batches ({})", report.failed_batches.len()));
        for batch in &report.failed_batches {
            Output::list_item(&format!(
                "{} batch {} ({} records): {}",
                batch.video_id, batch.batch, batch.records, batch.error
            ));
        }
    }

    println!();
    if aborted {
        return;
    }
    if report.cancelled {
        Output::warning("Run was cancelled before all videos were loaded.");
    } else if report.records_failed > 0 {
        Output::warning("Some batches could not be uploaded; re-run to retry them.");
    } else {
        Output::success("Done.");
    }
}
