use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info";

/// Installs a global `fmt` subscriber. `filter` wins over `RUST_LOG`; an
/// invalid directive falls back to `info`. Safe to call more than once.
pub fn init_tracing(filter: Option<&str>) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(resolve_filter(filter))
        .with_target(false)
        .try_init();
}

fn resolve_filter(filter: Option<&str>) -> EnvFilter {
    match filter {
        Some(directives) => EnvFilter::try_new(directives).ok(),
        None => EnvFilter::try_from_default_env().ok(),
    }
    .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_directive_is_used_verbatim() {
        assert_eq!(resolve_filter(Some("debug")).to_string(), "debug");
    }

    #[test]
    fn invalid_directive_falls_back_to_info() {
        assert_eq!(
            resolve_filter(Some("pkgcache_core=loudest")).to_string(),
            DEFAULT_FILTER
        );
    }

    #[test]
    fn repeated_initialization_does_not_panic() {
        init_tracing(Some("debug"));
        init_tracing(None);
    }
}
