//! tether: environment-aware remote data client provider
//!
//! An application that renders on a server and in a browser needs a remote
//! procedure client and a query cache in both places, with different
//! lifetimes. This crate decides which cache instance each render gets,
//! where the client sends its calls, and exposes both to rendering code.
//!
//! - [`CacheLifecycle`]: per-request caches on the server, one shared cache
//!   per browser session
//! - [`resolve_endpoint`]: absolute URL from the environment on the server,
//!   same-origin `/api/trpc` in the browser
//! - [`build_remote_client`]: a [`RemoteClient`] whose single link batches
//!   calls over HTTP with a rich JSON encoding
//! - [`MountPoint`] and [`use_remote`]: compose the above and hand the
//!   resulting [`RemoteScope`] to code rendered inside the mount
//!
//! # Example
//!
//! ```ignore
//! use tether::{MountPoint, RuntimeContext, use_remote};
//!
//! #[tokio::main]
//! async fn main() -> tether::Result<()> {
//!     let mount = MountPoint::for_context(RuntimeContext::Server);
//!     let greeting = mount
//!         .render_async(async {
//!             use_remote().query("greeting.hello", "world").await
//!         })
//!         .await??;
//!     println!("{greeting:?}");
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod client;
pub mod config;
pub mod context;
pub mod endpoint;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod provider;

pub use cache::{
	CacheFactory, DefaultCacheFactory, DehydratedQuery, DehydratedState, QueryCache, QueryKey, make_query_cache,
};
pub use client::{RemoteClient, RemoteClientBuilder, build_remote_client, build_remote_client_with_fetch};
pub use config::{EnvSource, ProcessEnv, ProviderConfig};
pub use context::RuntimeContext;
pub use endpoint::{API_PATH, DEFAULT_BASE_URL_ENV, resolve_base_url, resolve_endpoint};
pub use error::{Error, Result};
pub use lifecycle::{CacheLifecycle, SessionSlot, acquire_query_cache};
pub use logging::init_logging;
pub use provider::{MountPoint, RemoteScope, try_use_remote, use_remote};
pub use {tether_protocol, tether_runtime};
pub use tether_protocol::{Identity, RichJson, RichValue, TransformError, Transformer};
pub use tether_runtime::{
	BatchLimits, HttpBatchLink, HttpBatchLinkOptions, HttpFetch, Link, LoggerLink, Operation, ReqwestFetch,
};
