//! Configuration loading for the narrator.
//!
//! Settings are loaded from `conf/config.toml` if present. Missing or
//! invalid entries fall back to defaults so narration can still start.

mod defaults;
mod io;
mod models;
mod tables;

pub use io::{load_config, parse_config, serialize_config};
pub use models::{LexiconRule, LogLevel, NarrationConfig, ProviderKind, SegmentationLists};
