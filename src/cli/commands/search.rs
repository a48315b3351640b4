//! Search command implementation.

use crate::cli::Output;
use crate::config::Settings;
use crate::search::{SearchOptions, SearchService, TextSearchRequest};
use anyhow::Result;
use console::style;

/// Run the search command.
pub async fn run_search(
    queries: &[String],
    objects: &[String],
    limit: usize,
    min_score: f32,
    settings: Settings,
) -> Result<()> {
    let service = SearchService::from_settings(&settings)?;
    let request = TextSearchRequest {
        query_texts: queries.to_vec(),
        options: SearchOptions {
            object_filters: objects.to_vec(),
            limit,
            score_threshold: min_score,
            ..Default::default()
        },
    };

    let spinner = Output::spinner("Searching...");
    let result = service.search_text(&request).await;
    spinner.finish_and_clear();

    let response = match result {
        Ok(response) => response,
        Err(e) => {
            Output::error(&format!("Search failed: {}", e));
            return Err(e.into());
        }
    };

    if response.results.is_empty() {
        Output::warning("No keyframes found matching your query.");
        return Ok(());
    }

    Output::success(&format!(
        "Found {} keyframes in {} videos ({:.0} ms)",
        response.total_results,
        response.grouped_by_video.len(),
        response.query_time_ms
    ));
    println!();

    for result in &response.results {
        let mut labels: Vec<String> = Vec::new();
        for object in &result.objects {
            if !labels.contains(&object.entity) {
                labels.push(object.entity.clone());
            }
        }
        Output::keyframe_result(
            result.rank,
            &result.original_id,
            result.pts_time,
            result.similarity_score,
            &labels,
        );
        println!("      {}", style(&result.jpg_path).dim());
    }

    Ok(())
}
