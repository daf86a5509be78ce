//! HTTP backends for the batch link.
//!
//! [`HttpFetch`] is the seam between batching and the network. The default
//! backend, [`ReqwestFetch`], sends requests with `reqwest`; tests plug in a
//! recording backend instead.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use tracing::trace;
use url::Url;

use crate::error::{Error, Result};

/// Boxed future returned by [`HttpFetch::fetch`].
pub type FetchFuture<'a> = Pin<Box<dyn Future<Output = Result<HttpResponse>> + Send + 'a>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
	Get,
	Post,
}

impl HttpMethod {
	pub fn as_str(self) -> &'static str {
		match self {
			HttpMethod::Get => "GET",
			HttpMethod::Post => "POST",
		}
	}
}

/// Request produced by the batch link.
///
/// `url` may be relative (same-origin) when the endpoint was resolved in a
/// browser context.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
	pub method: HttpMethod,
	pub url: String,
	pub headers: Vec<(String, String)>,
	/// JSON body, for POST.
	pub body: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
	pub status: u16,
	pub body: String,
}

impl HttpResponse {
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}
}

/// Sends one HTTP exchange.
pub trait HttpFetch: Send + Sync {
	fn fetch(&self, request: HttpRequest) -> FetchFuture<'_>;
}

/// [`HttpFetch`] backed by a shared `reqwest::Client`.
#[derive(Debug, Clone, Default)]
pub struct ReqwestFetch {
	client: reqwest::Client,
	origin: Option<String>,
	timeout: Option<Duration>,
}

impl ReqwestFetch {
	pub fn new() -> Self {
		Self::default()
	}

	/// Uses an existing client (connection pool, proxies, TLS settings).
	pub fn with_client(client: reqwest::Client) -> Self {
		Self {
			client,
			origin: None,
			timeout: None,
		}
	}

	/// Origin that relative endpoints are resolved against.
	pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
		self.origin = Some(origin.into());
		self
	}

	/// Per-exchange timeout.
	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = Some(timeout);
		self
	}

	/// Turns a possibly relative endpoint into an absolute URL.
	pub fn resolve(&self, url: &str) -> Result<Url> {
		let invalid = |reason: String| Error::InvalidUrl {
			url: url.to_string(),
			reason,
		};

		match Url::parse(url) {
			Ok(absolute) => Ok(absolute),
			Err(url::ParseError::RelativeUrlWithoutBase) => {
				let origin = self
					.origin
					.as_deref()
					.ok_or_else(|| invalid("relative endpoint requires a configured origin".to_string()))?;
				let base = Url::parse(origin).map_err(|e| invalid(format!("origin '{origin}': {e}")))?;
				base.join(url).map_err(|e| invalid(e.to_string()))
			}
			Err(e) => Err(invalid(e.to_string())),
		}
	}
}

impl HttpFetch for ReqwestFetch {
	fn fetch(&self, request: HttpRequest) -> FetchFuture<'_> {
		Box::pin(async move {
			let url = self.resolve(&request.url)?;
			trace!(target: "tether.fetch", method = request.method.as_str(), %url, "sending");

			let mut builder = match request.method {
				HttpMethod::Get => self.client.get(url),
				HttpMethod::Post => self.client.post(url),
			};
			for (name, value) in &request.headers {
				builder = builder.header(name.as_str(), value.as_str());
			}
			if let Some(body) = request.body {
				builder = builder.header(CONTENT_TYPE, "application/json").body(body);
			}
			if let Some(timeout) = self.timeout {
				builder = builder.timeout(timeout);
			}

			let response = builder.send().await.map_err(|e| Error::Transport(e.to_string()))?;
			let status = response.status().as_u16();
			let body = response.text().await.map_err(|e| Error::Transport(e.to_string()))?;
			trace!(target: "tether.fetch", status, bytes = body.len(), "received");

			Ok(HttpResponse { status, body })
		})
	}
}
