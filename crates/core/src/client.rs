//! Remote client handle and its assembly.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tether_protocol::{RichJson, RichValue};
use tether_runtime::{HttpBatchLink, HttpBatchLinkOptions, HttpFetch, Link, Next, Operation, ReqwestFetch};
use tracing::debug;

use crate::config::ProviderConfig;
use crate::error::Result;

struct Inner {
	links: Vec<Arc<dyn Link>>,
	endpoint: Option<String>,
}

/// Cheap-clone handle that sends operations through a link chain.
#[derive(Clone)]
pub struct RemoteClient {
	inner: Arc<Inner>,
}

impl fmt::Debug for RemoteClient {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("RemoteClient")
			.field("endpoint", &self.inner.endpoint)
			.field("links", &self.inner.links.len())
			.finish()
	}
}

#[derive(Default)]
pub struct RemoteClientBuilder {
	links: Vec<Arc<dyn Link>>,
	endpoint: Option<String>,
}

impl RemoteClientBuilder {
	/// Appends a link. The last link added must terminate the chain.
	pub fn link(mut self, link: impl Link + 'static) -> Self {
		self.links.push(Arc::new(link));
		self
	}

	pub fn shared_link(mut self, link: Arc<dyn Link>) -> Self {
		self.links.push(link);
		self
	}

	/// Records the endpoint for diagnostics; links carry their own URL.
	pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
		self.endpoint = Some(endpoint.into());
		self
	}

	pub fn build(self) -> RemoteClient {
		RemoteClient {
			inner: Arc::new(Inner {
				links: self.links,
				endpoint: self.endpoint,
			}),
		}
	}
}

impl RemoteClient {
	pub fn builder() -> RemoteClientBuilder {
		RemoteClientBuilder::default()
	}

	pub fn endpoint(&self) -> Option<&str> {
		self.inner.endpoint.as_deref()
	}

	/// True when both handles share one link chain.
	pub fn ptr_eq(&self, other: &RemoteClient) -> bool {
		Arc::ptr_eq(&self.inner, &other.inner)
	}

	/// Sends `op` down the link chain.
	pub async fn call(&self, op: Operation) -> Result<RichValue> {
		Ok(Next::new(&self.inner.links).run(op).await?)
	}

	pub async fn query(&self, path: impl Into<String>, input: impl Into<RichValue>) -> Result<RichValue> {
		self.call(Operation::query(path, input.into())).await
	}

	pub async fn mutate(&self, path: impl Into<String>, input: impl Into<RichValue>) -> Result<RichValue> {
		self.call(Operation::mutation(path, input.into())).await
	}

	/// Subscriptions need a streaming link; over HTTP batch this fails.
	pub async fn subscribe(&self, path: impl Into<String>, input: impl Into<RichValue>) -> Result<RichValue> {
		self.call(Operation::subscription(path, input.into())).await
	}

	/// Query with plain serde input and output.
	pub async fn query_as<I, O>(&self, path: &str, input: &I) -> Result<O>
	where
		I: Serialize + ?Sized,
		O: DeserializeOwned,
	{
		let input = RichValue::from(serde_json::to_value(input)?);
		let output = self.query(path, input).await?;
		Ok(serde_json::from_value(output.to_plain_json())?)
	}

	/// Mutation with plain serde input and output.
	pub async fn mutate_as<I, O>(&self, path: &str, input: &I) -> Result<O>
	where
		I: Serialize + ?Sized,
		O: DeserializeOwned,
	{
		let input = RichValue::from(serde_json::to_value(input)?);
		let output = self.mutate(path, input).await?;
		Ok(serde_json::from_value(output.to_plain_json())?)
	}
}

/// Builds the client for `endpoint`: a single HTTP batch link with the
/// rich JSON transformer and a reqwest backend.
pub fn build_remote_client(endpoint: &str, config: &ProviderConfig) -> RemoteClient {
	let mut fetch = ReqwestFetch::new();
	if let Some(origin) = &config.origin {
		fetch = fetch.with_origin(origin.as_str());
	}
	if let Some(timeout) = config.timeout() {
		fetch = fetch.with_timeout(timeout);
	}
	build_remote_client_with_fetch(endpoint, config, Arc::new(fetch))
}

/// Like [`build_remote_client`] with a caller-supplied HTTP backend.
pub fn build_remote_client_with_fetch(endpoint: &str, config: &ProviderConfig, fetch: Arc<dyn HttpFetch>) -> RemoteClient {
	let options = HttpBatchLinkOptions::new(endpoint)
		.with_transformer(RichJson)
		.with_limits(config.batch_limits())
		.with_headers(config.headers.clone())
		.with_fetch(fetch);
	debug!(target: "tether.client", endpoint, limits = ?options.limits, "building remote client");

	RemoteClient::builder().endpoint(endpoint).link(HttpBatchLink::new(options)).build()
}
