//! Info command implementation.

use crate::cli::Output;
use crate::config::Settings;
use crate::vector_store::{QdrantStore, VectorStore};
use anyhow::Result;

/// Run the info command.
pub async fn run_info(settings: &Settings) -> Result<()> {
    let store = QdrantStore::from_settings(&settings.store)?;

    Output::header("Vector store");
    Output::kv("URL", &settings.store.url);

    if let Err(e) = store.health().await {
        Output::error(&format!("Store is not reachable: {}", e));
        return Err(e.into());
    }
    Output::kv("Health", "ok");

    match store.collection_info(&settings.store.collection).await? {
        Some(info) => {
            Output::header(&format!("Collection '{}'", info.name));
            Output::kv("Status", &info.status);
            Output::kv("Points", &info.points_count.to_string());
            Output::kv(
                "Vector size",
                &info
                    .vector_size
                    .map_or_else(|| "unknown".to_string(), |s| s.to_string()),
            );
        }
        None => {
            Output::warning(&format!(
                "Collection '{}' does not exist yet. Run `clipframe load` to create it.",
                settings.store.collection
            ));
        }
    }

    Ok(())
}
