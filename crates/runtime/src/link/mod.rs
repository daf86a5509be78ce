//! Link chain.
//!
//! A client holds an ordered list of [`Link`]s. Each operation enters the
//! first link, which may observe or rewrite it and hand it on via [`Next`].
//! The last link must send the operation and produce the result; if the
//! chain runs out first the call fails with [`Error::NoTerminatingLink`].
//!
//! ```text
//! client.call(op)
//!    │
//! ┌──▼─────────┐   next.run(op)   ┌──────────────┐
//! │ LoggerLink │ ───────────────► │ HttpBatchLink│ ──► HTTP
//! └────────────┘                  └──────────────┘
//! ```

mod logger;

#[cfg(test)]
mod tests;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub use logger::LoggerLink;
use tether_protocol::RichValue;

use crate::error::{Error, Result};
use crate::operation::Operation;

/// Boxed future returned by [`Link::call`].
pub type LinkFuture<'a> = Pin<Box<dyn Future<Output = Result<RichValue>> + Send + 'a>>;

/// One stage of the chain.
pub trait Link: Send + Sync {
	/// Handles `op`, either answering it or forwarding it with `next.run(op)`.
	fn call<'a>(&'a self, op: Operation, next: Next<'a>) -> LinkFuture<'a>;
}

/// The remainder of the chain after the current link.
#[derive(Clone, Copy)]
pub struct Next<'a> {
	rest: &'a [Arc<dyn Link>],
}

impl<'a> Next<'a> {
	/// Starts a chain at its first link.
	pub fn new(chain: &'a [Arc<dyn Link>]) -> Self {
		Self { rest: chain }
	}

	/// Number of links still ahead.
	pub fn remaining(&self) -> usize {
		self.rest.len()
	}

	/// Passes `op` to the next link.
	pub fn run(self, op: Operation) -> LinkFuture<'a> {
		match self.rest.split_first() {
			Some((head, tail)) => head.call(op, Next { rest: tail }),
			None => Box::pin(async move { Err(Error::NoTerminatingLink { path: op.path }) }),
		}
	}
}
