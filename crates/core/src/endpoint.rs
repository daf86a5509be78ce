//! Endpoint URL resolution.
//!
//! In the browser the endpoint is a same-origin relative path. On the server
//! there is no origin to be relative to, so the base URL comes from the
//! environment and must be present.

use tracing::debug;

use crate::config::{EnvSource, ProviderConfig};
use crate::context::RuntimeContext;
use crate::error::{Error, Result};

/// Path of the remote procedure endpoint, relative to the base URL.
pub const API_PATH: &str = "/api/trpc";

/// Environment variable read for the server-side base URL.
pub const DEFAULT_BASE_URL_ENV: &str = "APP_URL";

/// Base URL for `context`, exactly as configured.
///
/// Returns an empty string in the browser. On the server, `key` must name a
/// non-blank environment variable, otherwise [`Error::MissingConfig`].
pub fn resolve_base_url(context: RuntimeContext, env: &dyn EnvSource, key: &str) -> Result<String> {
	match context {
		RuntimeContext::Browser => Ok(String::new()),
		RuntimeContext::Server => {
			env.var(key)
				.filter(|v| !v.trim().is_empty())
				.ok_or_else(|| Error::MissingConfig { key: key.to_string() })
		}
	}
}

/// Full endpoint URL: the API path appended to the base URL as is.
pub fn resolve_endpoint(context: RuntimeContext, env: &dyn EnvSource, config: &ProviderConfig) -> Result<String> {
	let base = resolve_base_url(context, env, &config.base_url_env)?;
	let endpoint = format!("{base}{}", config.api_path);
	debug!(target: "tether.endpoint", %context, %endpoint, "resolved endpoint");
	Ok(endpoint)
}
