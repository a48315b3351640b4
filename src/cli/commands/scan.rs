//! Scan command implementation.

use crate::cli::Output;
use crate::config::Settings;
use crate::dataset::{DatasetRoots, DatasetScanner};
use anyhow::Result;

/// Run the scan command.
pub fn run_scan(settings: &Settings) -> Result<()> {
    let roots = DatasetRoots::from_settings(settings);

    Output::header("Dataset");
    for (label, path) in roots.labeled() {
        Output::kv(label, &path.display().to_string());
    }

    let manifest = DatasetScanner::new(roots)
        .require_keyframes(settings.dataset.require_keyframes)
        .scan()?;

    println!();
    if manifest.is_empty() {
        Output::warning("No embedding files found.");
        return Ok(());
    }

    Output::success(&format!(
        "{} videos found, {} complete",
        manifest.len(),
        manifest.complete_count()
    ));

    let incomplete: Vec<_> = manifest.incomplete().collect();
    if !incomplete.is_empty() {
        Output::header(&format!("Incomplete videos ({})", incomplete.len()));
        for (video_id, missing) in incomplete {
            let missing: Vec<String> = missing.iter().map(|m| m.to_string()).collect();
            Output::list_item(&format!("{}: missing {}", video_id, missing.join(", ")));
        }
    }

    Ok(())
}
