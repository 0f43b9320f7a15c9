pub mod builder;
pub mod cache;
pub mod config;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod persistence;
pub mod search;
pub mod sqlite;

pub use builder::{CacheBuilder, ManifestBuilder, NoopBuilder};
pub use cache::CacheManager;
pub use config::CacheConfig;
