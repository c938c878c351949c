use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const DEFAULT_FILTER: &str = "jdismantle=info,warn";

/// Install a stderr `fmt` subscriber filtered by `RUST_LOG`.
///
/// `verbose` raises the crate's own level to debug when `RUST_LOG` is unset.
pub fn init_logging(verbose: bool) {
    let default_filter = if verbose {
        "jdismantle=debug,warn"
    } else {
        DEFAULT_FILTER
    };
    let init_result = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
    // A subscriber may already be installed (tests, embedding applications).
    let _ = init_result;
}
