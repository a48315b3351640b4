//! Configuration module for Clipframe.
//!
//! Handles loading and managing application settings.

mod settings;

pub use settings::{
    DatasetSettings, EncoderSettings, GeneralSettings, HnswSettings, IngestSettings,
    ServerSettings, Settings, StoreSettings,
};
