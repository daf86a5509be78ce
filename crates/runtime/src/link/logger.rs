//! Forwarding link that logs operations and their outcome.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use super::{Link, LinkFuture, Next};
use crate::operation::Operation;

type Filter = Arc<dyn Fn(&Operation) -> bool + Send + Sync>;

/// Logs every operation on the way down and its result on the way back.
///
/// Uses target `tether.link`: `debug` for requests and successes, `warn` for
/// failures.
#[derive(Clone)]
pub struct LoggerLink {
	enabled: Filter,
}

impl Default for LoggerLink {
	fn default() -> Self {
		Self::new()
	}
}

impl LoggerLink {
	pub fn new() -> Self {
		Self {
			enabled: Arc::new(|_| true),
		}
	}

	/// Only logs operations for which `filter` returns true.
	pub fn with_filter(filter: impl Fn(&Operation) -> bool + Send + Sync + 'static) -> Self {
		Self { enabled: Arc::new(filter) }
	}
}

impl Link for LoggerLink {
	fn call<'a>(&'a self, op: Operation, next: Next<'a>) -> LinkFuture<'a> {
		Box::pin(async move {
			if !(self.enabled)(&op) {
				return next.run(op).await;
			}

			let id = op.id;
			let kind = op.kind;
			let path = op.path.clone();
			debug!(target: "tether.link", id, %kind, %path, input = op.input.kind(), "-> operation");

			let started = Instant::now();
			let result = next.run(op).await;
			let elapsed_ms = started.elapsed().as_millis() as u64;

			match &result {
				Ok(value) => debug!(target: "tether.link", id, %kind, %path, elapsed_ms, output = value.kind(), "<- ok"),
				Err(err) => warn!(target: "tether.link", id, %kind, %path, elapsed_ms, error = %err, "<- error"),
			}
			result
		})
	}
}
