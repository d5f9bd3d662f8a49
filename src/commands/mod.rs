//! CLI command implementations for fpm-metrics-adapter.
//!
//! - `config`: Configuration file generation
//! - `scrape`: One-shot status scrape

pub mod config;
pub mod scrape;

// Re-export command functions
pub use config::command_config;
pub use scrape::command_scrape;
