//! Transport for the tether remote client.
//!
//! An [`Operation`] travels down a chain of [`Link`]s. Forwarding links
//! (such as [`LoggerLink`]) observe it; the terminating [`HttpBatchLink`]
//! queues it, coalesces calls made together into HTTP batch exchanges, and
//! hands each caller its own result.
//!
//! ```text
//! Operation ──► Link ──► ... ──► HttpBatchLink ──► HttpFetch ──► server
//! ```
//!
//! HTTP is reached through the [`HttpFetch`] trait. [`ReqwestFetch`] is the
//! default backend; tests substitute their own.

pub mod batch;
pub mod error;
pub mod fetch;
pub mod link;
pub mod operation;

pub use batch::{BatchLimits, HttpBatchLink, HttpBatchLinkOptions};
pub use error::{Error, Result};
pub use fetch::{FetchFuture, HttpFetch, HttpMethod, HttpRequest, HttpResponse, ReqwestFetch};
pub use link::{Link, LinkFuture, LoggerLink, Next};
pub use operation::{Operation, OperationId, next_operation_id};
