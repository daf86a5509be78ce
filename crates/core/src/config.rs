//! Provider configuration and environment lookup.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tether_runtime::BatchLimits;

use crate::endpoint::{API_PATH, DEFAULT_BASE_URL_ENV};
use crate::error::{Error, Result};

/// Settings for a mounted provider.
///
/// Every field is optional in JSON; missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProviderConfig {
	/// Environment variable holding the server-side base URL.
	pub base_url_env: String,
	pub api_path: String,
	/// Origin used to resolve a relative endpoint when sending HTTP.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub origin: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub max_items: Option<usize>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub max_url_length: Option<usize>,
	#[serde(skip_serializing_if = "BTreeMap::is_empty")]
	pub headers: BTreeMap<String, String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub timeout_ms: Option<u64>,
}

impl Default for ProviderConfig {
	fn default() -> Self {
		Self {
			base_url_env: DEFAULT_BASE_URL_ENV.to_string(),
			api_path: API_PATH.to_string(),
			origin: None,
			max_items: None,
			max_url_length: None,
			headers: BTreeMap::new(),
			timeout_ms: None,
		}
	}
}

impl ProviderConfig {
	pub fn from_json(json: &str) -> Result<Self> {
		serde_json::from_str(json).map_err(Error::Config)
	}

	pub fn with_base_url_env(mut self, key: impl Into<String>) -> Self {
		self.base_url_env = key.into();
		self
	}

	pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
		self.origin = Some(origin.into());
		self
	}

	pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.insert(name.into(), value.into());
		self
	}

	pub fn with_max_items(mut self, max: usize) -> Self {
		self.max_items = Some(max);
		self
	}

	pub fn batch_limits(&self) -> BatchLimits {
		BatchLimits {
			max_items: self.max_items,
			max_url_length: self.max_url_length,
		}
	}

	pub fn timeout(&self) -> Option<Duration> {
		self.timeout_ms.map(Duration::from_millis)
	}
}

/// Source of environment variables.
pub trait EnvSource: Send + Sync {
	fn var(&self, key: &str) -> Option<String>;
}

/// Reads the process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
	fn var(&self, key: &str) -> Option<String> {
		std::env::var(key).ok()
	}
}

impl EnvSource for HashMap<String, String> {
	fn var(&self, key: &str) -> Option<String> {
		self.get(key).cloned()
	}
}
