mod cli;

use std::process::ExitCode;

use clap::Parser;
use pkgcache_core::models::{CoreError, PackageHit, SearchDepth, SearchTask, TaskStatus};
use pkgcache_core::search::{ChannelSink, SearchEvent, SearchOutcome};
use pkgcache_core::{CacheBuilder, CacheConfig, CacheManager, ManifestBuilder, NoopBuilder};
use tracing::{info, warn};

use crate::cli::{CliArgs, Command};

#[tokio::main]
async fn main() -> ExitCode {
    let args = CliArgs::parse();

    let config = match args.resolve_config_path() {
        Some(path) => match CacheConfig::load(&path) {
            Ok(config) => config,
            Err(error) => {
                eprintln!("pkgcache: {error}");
                return ExitCode::FAILURE;
            }
        },
        None => CacheConfig::default(),
    };

    pkgcache_core::logging::init_tracing(args.resolve_log_filter(&config).as_deref());

    match run(&args, &config).await {
        Ok(code) => code,
        Err(error) => {
            eprintln!("pkgcache: {error}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &CliArgs, config: &CacheConfig) -> Result<ExitCode, CoreError> {
    let database_path = args.resolve_database_path(config);
    let builder: Box<dyn CacheBuilder> = match args.resolve_manifest_path(config) {
        Some(manifest) => Box::new(ManifestBuilder::new(manifest)),
        None => Box::new(NoopBuilder),
    };

    let cache = CacheManager::initialize(&database_path, builder.as_ref())?;
    info!(path = %database_path.display(), "package cache ready");

    match &args.command {
        Command::SearchName { query, filter } => {
            let task = SearchTask::new(query.as_str(), filter.as_str(), SearchDepth::NameOnly);
            search(&cache, task, args.json).await
        }
        Command::SearchDetails { query, filter } => {
            let task = SearchTask::new(query.as_str(), filter.as_str(), SearchDepth::Details);
            search(&cache, task, args.json).await
        }
        Command::Rebuild => {
            if args.resolve_manifest_path(config).is_none() {
                warn!("no manifest configured; rebuild will leave the cache empty");
            }
            let count = cache.rebuild(builder.as_ref())?;
            println!("{count}");
            Ok(ExitCode::SUCCESS)
        }
        Command::Clear => {
            let removed = cache.clear()?;
            println!("{removed}");
            Ok(ExitCode::SUCCESS)
        }
        Command::Count => {
            println!("{}", cache.package_count()?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn search(
    cache: &CacheManager,
    task: SearchTask,
    json: bool,
) -> Result<ExitCode, CoreError> {
    let (sink, mut receiver) = ChannelSink::new();
    let handle = cache.search(task, Box::new(sink))?;

    let mut outcome = SearchOutcome::Failure;
    while let Some(event) = receiver.recv().await {
        match event {
            SearchEvent::Package(hit) => print_hit(&hit, json),
            SearchEvent::Error(error) => eprintln!("pkgcache: {error}"),
            SearchEvent::Finished(finished) => outcome = finished,
            SearchEvent::Status(_) | SearchEvent::NoPercentageUpdates => {}
        }
    }

    let snapshot = handle.wait(None).await?;
    if outcome == SearchOutcome::Success && snapshot.status == TaskStatus::Completed {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

fn print_hit(hit: &PackageHit, json: bool) {
    if json {
        match serde_json::to_string(hit) {
            Ok(line) => println!("{line}"),
            Err(error) => eprintln!("pkgcache: failed to encode result: {error}"),
        }
    } else {
        println!("{}\t{}", hit.id, hit.summary);
    }
}
