use once_cell::sync::OnceCell;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

static INIT: OnceCell<()> = OnceCell::new();

const DEFAULT_FILTER: &str = "warn,appgen_core=info,appgen_harness=info";

fn parse_bool_env(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}

fn observability_enabled() -> bool {
    std::env::var("APPGEN_OBSERVABILITY")
        .ok()
        .map(|value| parse_bool_env(&value).unwrap_or(true))
        .unwrap_or(true)
}

fn resolve_env_filter() -> tracing_subscriber::EnvFilter {
    if let Ok(level) = std::env::var("APPGEN_LOG_LEVEL")
        && let Ok(filter) = tracing_subscriber::EnvFilter::try_new(level)
    {
        return filter;
    }
    tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_FILTER))
}

/// Initialize logging once per process.
///
/// Environment variables:
/// - `APPGEN_OBSERVABILITY`: optional enable/disable flag (default enabled).
/// - `APPGEN_LOG_LEVEL`: optional level/filter override (`info`, `appgen_core=debug`, ...).
/// - `APPGEN_JSON_LOG_PATH`: optional log file path. If set, logs are JSONL in that file;
///   otherwise they go to stderr in a compact console format.
/// - `RUST_LOG`: fallback filter. Without either, appgen crates log at `info`
///   and everything else at `warn`.
pub fn init_observability() {
    INIT.get_or_init(|| {
        if !observability_enabled() {
            return;
        }

        let env_filter = resolve_env_filter();
        if let Ok(path_raw) = std::env::var("APPGEN_JSON_LOG_PATH") {
            let path = std::path::PathBuf::from(path_raw);
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                let _ = std::fs::create_dir_all(parent);
            }
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            let file_name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("appgen.logs.jsonl");
            let writer = tracing_appender::rolling::never(dir, file_name);
            let json_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .with_writer(writer);
            let _ = tracing_subscriber::registry()
                .with(env_filter)
                .with(json_layer)
                .try_init();
        } else {
            let console_layer = tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(std::io::stderr);
            let _ = tracing_subscriber::registry()
                .with(env_filter)
                .with(console_layer)
                .try_init();
        }
    });
}
