//! Where the provider is running.

use std::fmt;

/// Execution context of a provider.
///
/// Decides both the cache lifecycle and how the endpoint URL is formed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuntimeContext {
	/// Rendering on the server, one cache per request.
	Server,
	/// Running in the browser, one cache per session.
	Browser,
}

impl RuntimeContext {
	/// `Browser` when compiled for `wasm32`, `Server` otherwise.
	pub fn detect() -> Self {
		if cfg!(target_arch = "wasm32") {
			RuntimeContext::Browser
		} else {
			RuntimeContext::Server
		}
	}

	pub fn is_server(self) -> bool {
		self == RuntimeContext::Server
	}

	pub fn is_browser(self) -> bool {
		self == RuntimeContext::Browser
	}

	pub fn as_str(self) -> &'static str {
		match self {
			RuntimeContext::Server => "server",
			RuntimeContext::Browser => "browser",
		}
	}
}

impl fmt::Display for RuntimeContext {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
