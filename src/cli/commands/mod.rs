//! CLI command implementations.

mod config;
mod info;
mod load;
mod scan;
mod search;
mod serve;

pub use config::run_config;
pub use info::run_info;
pub use load::run_load;
pub use scan::run_scan;
pub use search::run_search;
pub use serve::run_serve;
