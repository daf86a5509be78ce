//! Terminating link that coalesces calls into HTTP batch exchanges.
//!
//! Calls made in the same scheduler tick are queued and sent together:
//!
//! ```text
//! call ──► enqueue ──► [queue] ──(flush task)──► plan ──► exchange* ──► HTTP
//!   ▲                                                        │
//!   └──────────────────── oneshot per call ◄─────────────────┘
//! ```
//!
//! The first call into an empty queue spawns a flush task on the current
//! tokio runtime. The task yields once so that sibling calls polled in the
//! same tick can join, then drains the queue. Callers that went away before
//! the flush are dropped from the batch.

mod plan;

#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures_util::future::join_all;
use parking_lot::Mutex;
use serde_json::Value;
use tether_protocol::{ProcedureType, RichJson, RichValue, Transformer};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

pub use plan::BatchLimits;
use plan::{PlanEntry, build_request, parse_response};

use crate::error::{Error, Result};
use crate::fetch::{HttpFetch, HttpRequest, ReqwestFetch};
use crate::link::{Link, LinkFuture, Next};
use crate::operation::Operation;

type Reply = oneshot::Sender<Result<RichValue>>;

/// Settings for [`HttpBatchLink`].
#[derive(Clone)]
pub struct HttpBatchLinkOptions {
	/// Endpoint base, e.g. `http://localhost:3000/api/trpc` or `/api/trpc`.
	pub url: String,
	pub transformer: Arc<dyn Transformer>,
	pub limits: BatchLimits,
	/// Extra headers sent with every exchange.
	pub headers: Vec<(String, String)>,
	pub fetch: Arc<dyn HttpFetch>,
}

impl HttpBatchLinkOptions {
	/// Rich JSON bodies, unbounded batches, and a default reqwest backend.
	pub fn new(url: impl Into<String>) -> Self {
		Self {
			url: url.into(),
			transformer: Arc::new(RichJson),
			limits: BatchLimits::default(),
			headers: Vec::new(),
			fetch: Arc::new(ReqwestFetch::new()),
		}
	}

	pub fn with_transformer(mut self, transformer: impl Transformer + 'static) -> Self {
		self.transformer = Arc::new(transformer);
		self
	}

	pub fn with_limits(mut self, limits: BatchLimits) -> Self {
		self.limits = limits;
		self
	}

	pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.push((name.into(), value.into()));
		self
	}

	pub fn with_headers<I, K, V>(mut self, headers: I) -> Self
	where
		I: IntoIterator<Item = (K, V)>,
		K: Into<String>,
		V: Into<String>,
	{
		self.headers.extend(headers.into_iter().map(|(k, v)| (k.into(), v.into())));
		self
	}

	pub fn with_fetch(mut self, fetch: Arc<dyn HttpFetch>) -> Self {
		self.fetch = fetch;
		self
	}
}

struct PendingCall {
	op: Operation,
	reply: Reply,
}

#[derive(Default)]
struct Queue {
	pending: Vec<PendingCall>,
	flush_scheduled: bool,
}

struct Shared {
	options: HttpBatchLinkOptions,
	queue: Mutex<Queue>,
	exchanges: AtomicUsize,
}

/// Sends queries and mutations over HTTP, batching calls made together.
///
/// Subscriptions are rejected with [`Error::UnsupportedOperation`].
#[derive(Clone)]
pub struct HttpBatchLink {
	shared: Arc<Shared>,
}

impl HttpBatchLink {
	pub fn new(options: HttpBatchLinkOptions) -> Self {
		Self {
			shared: Arc::new(Shared {
				options,
				queue: Mutex::new(Queue::default()),
				exchanges: AtomicUsize::new(0),
			}),
		}
	}

	pub fn url(&self) -> &str {
		&self.shared.options.url
	}

	pub fn transformer(&self) -> &dyn Transformer {
		self.shared.options.transformer.as_ref()
	}

	/// Number of HTTP exchanges started so far.
	pub fn exchanges_sent(&self) -> usize {
		self.shared.exchanges.load(Ordering::SeqCst)
	}

	fn enqueue(&self, op: Operation) -> Result<oneshot::Receiver<Result<RichValue>>> {
		let handle = Handle::try_current().map_err(|_| Error::NoRuntime { path: op.path.clone() })?;
		let (reply, rx) = oneshot::channel();

		let schedule = {
			let mut queue = self.shared.queue.lock();
			trace!(target: "tether.batch", id = op.id, path = %op.path, queued = queue.pending.len() + 1, "enqueue");
			queue.pending.push(PendingCall { op, reply });
			!std::mem::replace(&mut queue.flush_scheduled, true)
		};

		if schedule {
			let shared = Arc::clone(&self.shared);
			handle.spawn(async move {
				tokio::task::yield_now().await;
				shared.flush().await;
			});
		}
		Ok(rx)
	}
}

impl Link for HttpBatchLink {
	fn call<'a>(&'a self, op: Operation, _next: Next<'a>) -> LinkFuture<'a> {
		Box::pin(async move {
			if op.kind == ProcedureType::Subscription {
				return Err(Error::UnsupportedOperation {
					kind: op.kind.as_str(),
					path: op.path,
					link: "HttpBatchLink",
				});
			}
			let rx = self.enqueue(op)?;
			rx.await.map_err(|_| Error::ChannelClosed)?
		})
	}
}

impl Shared {
	async fn flush(&self) {
		let pending = {
			let mut queue = self.queue.lock();
			queue.flush_scheduled = false;
			std::mem::take(&mut queue.pending)
		};

		let (ops, replies): (Vec<Operation>, Vec<Reply>) = pending
			.into_iter()
			.filter(|call| !call.reply.is_closed())
			.map(|call| (call.op, call.reply))
			.unzip();
		if ops.is_empty() {
			trace!(target: "tether.batch", "flush with no live callers");
			return;
		}

		let options = &self.options;
		let inputs: Vec<Value> = ops.iter().map(|op| options.transformer.serialize(&op.input)).collect();
		let entries: Vec<PlanEntry<'_>> = ops
			.iter()
			.zip(&inputs)
			.map(|(op, input)| PlanEntry {
				kind: op.kind,
				path: &op.path,
				input,
			})
			.collect();

		let mut replies: Vec<Option<Reply>> = replies.into_iter().map(Some).collect();
		let exchanges: Vec<(HttpRequest, Vec<Reply>)> = plan::plan(&options.url, &entries, &options.limits)
			.into_iter()
			.map(|exchange| {
				let paths: Vec<&str> = exchange.indices.iter().map(|&i| entries[i].path).collect();
				let inputs: Vec<&Value> = exchange.indices.iter().map(|&i| entries[i].input).collect();
				let request = build_request(&options.url, exchange.kind, &paths, &inputs, &options.headers);
				let replies = exchange.indices.iter().filter_map(|&i| replies[i].take()).collect();
				(request, replies)
			})
			.collect();

		debug!(target: "tether.batch", calls = ops.len(), exchanges = exchanges.len(), "flush");
		join_all(exchanges.into_iter().map(|(request, replies)| self.exchange(request, replies))).await;
	}

	async fn exchange(&self, request: HttpRequest, replies: Vec<Reply>) {
		self.exchanges.fetch_add(1, Ordering::SeqCst);
		let method = request.method.as_str();
		let url = request.url.clone();
		debug!(target: "tether.batch", method, %url, calls = replies.len(), "-> exchange");

		let outcome = match self.options.fetch.fetch(request).await {
			Ok(response) => parse_response(response, self.options.transformer.as_ref(), replies.len()),
			Err(err) => Err(err),
		};

		match outcome {
			Ok(results) => {
				debug!(target: "tether.batch", method, %url, "<- exchange");
				for (reply, result) in replies.into_iter().zip(results) {
					let _ = reply.send(result);
				}
			}
			Err(err) => {
				warn!(target: "tether.batch", method, %url, error = %err, "exchange failed");
				for reply in replies {
					let _ = reply.send(Err(err.replicate()));
				}
			}
		}
	}
}
