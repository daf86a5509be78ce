use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Filter used when `RUST_LOG` is unset.
///
/// Quiet apps only see failed exchanges. One step up shows each resolved
/// endpoint, cache creation and batch flush; two steps add per-call queueing
/// and cache hits.
fn default_directives(verbosity: u8) -> &'static str {
	match verbosity {
		0 => "warn",
		1 => "info,tether=debug",
		_ => "debug,tether=trace",
	}
}

/// Installs a stderr `tracing` subscriber. Returns false when one was
/// already installed.
///
/// `RUST_LOG` takes precedence over `verbosity`.
pub fn init_logging(verbosity: u8) -> bool {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives(verbosity)));

	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr.with_max_level(Level::TRACE))
		.with_target(true)
		.compact()
		.try_init()
		.is_ok()
}
