//! Command-line arguments and their resolution against the environment and
//! the optional config file.
//!
//! Priority: CLI flag > environment variable > config file > default.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use pkgcache_core::CacheConfig;

pub const CONFIG_ENV: &str = "PKGCACHE_CONFIG";
pub const DATABASE_ENV: &str = "PKGCACHE_DB";
pub const MANIFEST_ENV: &str = "PKGCACHE_MANIFEST";
const LOG_ENV: &str = "RUST_LOG";

/// Query and maintain the local package metadata cache.
#[derive(Parser, Debug)]
#[command(name = "pkgcache", version, about)]
pub struct CliArgs {
    /// Path to a JSON configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Path to the cache database.
    #[arg(short = 'd', long = "db")]
    pub database: Option<PathBuf>,

    /// JSON package manifest used to populate an empty cache.
    #[arg(short = 'm', long = "manifest")]
    pub manifest: Option<PathBuf>,

    /// Log filter (e.g. `debug`, `pkgcache_core=trace`).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    /// Print search results as JSON lines.
    #[arg(long = "json")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Search package names.
    SearchName {
        query: String,
        #[arg(long, default_value = "none")]
        filter: String,
    },
    /// Search package details.
    SearchDetails {
        query: String,
        #[arg(long, default_value = "none")]
        filter: String,
    },
    /// Wipe the cache and repopulate it from the manifest.
    Rebuild,
    /// Delete every cached package.
    Clear,
    /// Print the number of cached packages.
    Count,
}

impl CliArgs {
    /// `--config` flag > `PKGCACHE_CONFIG`.
    pub fn resolve_config_path(&self) -> Option<PathBuf> {
        self.config.clone().or_else(|| env_path(CONFIG_ENV))
    }

    /// `--db` flag > `PKGCACHE_DB` > config file value.
    pub fn resolve_database_path(&self, config: &CacheConfig) -> PathBuf {
        self.database
            .clone()
            .or_else(|| env_path(DATABASE_ENV))
            .unwrap_or_else(|| config.database_path.clone())
    }

    /// `--manifest` flag > `PKGCACHE_MANIFEST` > config file value.
    pub fn resolve_manifest_path(&self, config: &CacheConfig) -> Option<PathBuf> {
        self.manifest
            .clone()
            .or_else(|| env_path(MANIFEST_ENV))
            .or_else(|| config.manifest_path.clone())
    }

    /// `--log-level` flag > `RUST_LOG` > config file value. `None` lets the
    /// subscriber read `RUST_LOG` itself.
    pub fn resolve_log_filter(&self, config: &CacheConfig) -> Option<String> {
        if let Some(level) = &self.log_level {
            return Some(level.clone());
        }
        if std::env::var_os(LOG_ENV).is_some() {
            return None;
        }
        config.log_filter.clone()
    }
}

fn env_path(name: &str) -> Option<PathBuf> {
    std::env::var_os(name)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_search_with_default_filter() {
        let args = CliArgs::try_parse_from(["pkgcache", "search-name", "vim"]).unwrap();
        assert_eq!(
            args.command,
            Command::SearchName {
                query: "vim".to_string(),
                filter: "none".to_string(),
            }
        );
    }

    #[test]
    fn flags_win_over_config_values() {
        let args = CliArgs::try_parse_from([
            "pkgcache",
            "--db",
            "/tmp/flag.sqlite3",
            "--manifest",
            "/tmp/flag.json",
            "--log-level",
            "debug",
            "count",
        ])
        .unwrap();
        let config = CacheConfig {
            database_path: PathBuf::from("/tmp/config.sqlite3"),
            manifest_path: Some(PathBuf::from("/tmp/config.json")),
            log_filter: Some("warn".to_string()),
        };

        assert_eq!(
            args.resolve_database_path(&config),
            PathBuf::from("/tmp/flag.sqlite3")
        );
        assert_eq!(
            args.resolve_manifest_path(&config),
            Some(PathBuf::from("/tmp/flag.json"))
        );
        assert_eq!(args.resolve_log_filter(&config), Some("debug".to_string()));
    }

    #[test]
    fn multi_word_queries_are_a_single_argument() {
        let args =
            CliArgs::try_parse_from(["pkgcache", "search-details", "foo bar", "--filter", "gui"])
                .unwrap();
        assert_eq!(
            args.command,
            Command::SearchDetails {
                query: "foo bar".to_string(),
                filter: "gui".to_string(),
            }
        );
    }
}
