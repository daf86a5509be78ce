//! Mount point and the `use_remote` lookup.
//!
//! A [`MountPoint`] composes the cache lifecycle, endpoint resolution and
//! client assembly. Code run through [`MountPoint::render`] or
//! [`MountPoint::render_async`] can reach the active [`RemoteScope`] with
//! [`use_remote`]. Scopes nest and the innermost wins.
//!
//! Synchronous renders push onto a thread-local stack guarded by RAII.
//! Async renders carry their stack in a tokio task-local, so the scope
//! follows the future across worker threads. Inside an async render the
//! task-local stack is the one used, including by nested sync renders.

use std::cell::RefCell;
use std::future::Future;
use std::sync::{Arc, OnceLock};

use tether_protocol::RichValue;
use tether_runtime::HttpFetch;
use tracing::{debug, trace};

use crate::cache::{QueryCache, QueryKey};
use crate::client::{RemoteClient, build_remote_client, build_remote_client_with_fetch};
use crate::config::{EnvSource, ProcessEnv, ProviderConfig};
use crate::context::RuntimeContext;
use crate::endpoint::resolve_endpoint;
use crate::error::{Error, Result};
use crate::lifecycle::CacheLifecycle;

thread_local! {
	static SCOPES: RefCell<Vec<RemoteScope>> = const { RefCell::new(Vec::new()) };
}

tokio::task_local! {
	static TASK_SCOPES: RefCell<Vec<RemoteScope>>;
}

fn with_stack<R>(f: impl FnOnce(&RefCell<Vec<RemoteScope>>) -> R) -> R {
	if TASK_SCOPES.try_with(|_| ()).is_ok() {
		TASK_SCOPES.with(|stack| f(stack))
	} else {
		SCOPES.with(|stack| f(stack))
	}
}

/// Pops the scope it pushed when dropped.
struct ScopeGuard;

impl ScopeGuard {
	fn push(scope: RemoteScope) -> Self {
		with_stack(|stack| stack.borrow_mut().push(scope));
		ScopeGuard
	}
}

impl Drop for ScopeGuard {
	fn drop(&mut self) {
		with_stack(|stack| {
			stack.borrow_mut().pop();
		});
	}
}

/// What a mounted provider exposes: its cache and its client.
#[derive(Debug, Clone)]
pub struct RemoteScope {
	pub cache: QueryCache,
	pub client: RemoteClient,
}

impl RemoteScope {
	/// Cached query: returns the stored result for `(path, input)` or fetches
	/// and stores it.
	pub async fn query(&self, path: &str, input: impl Into<RichValue>) -> Result<RichValue> {
		let input = input.into();
		let key = QueryKey::new(path, &input);
		self.cache.ensure(key, self.client.query(path, input)).await
	}

	/// Uncached mutation.
	pub async fn mutate(&self, path: &str, input: impl Into<RichValue>) -> Result<RichValue> {
		self.client.mutate(path, input).await
	}

	/// Drops cached results under a dotted path prefix.
	pub fn invalidate(&self, prefix: &str) -> usize {
		self.cache.invalidate_prefix(prefix)
	}
}

/// The active scope of the innermost enclosing render.
pub fn try_use_remote() -> Result<RemoteScope> {
	with_stack(|stack| stack.borrow().last().cloned()).ok_or(Error::OutsideMount)
}

/// The active scope of the innermost enclosing render.
///
/// # Panics
///
/// Panics when called outside of [`MountPoint::render`] or
/// [`MountPoint::render_async`]. Use [`try_use_remote`] to handle that case.
pub fn use_remote() -> RemoteScope {
	match try_use_remote() {
		Ok(scope) => scope,
		Err(err) => panic!("{err}"),
	}
}

/// Provider mounted at the root of a UI tree.
pub struct MountPoint {
	context: RuntimeContext,
	lifecycle: CacheLifecycle,
	config: ProviderConfig,
	env: Arc<dyn EnvSource>,
	fetch: Option<Arc<dyn HttpFetch>>,
	client: OnceLock<RemoteClient>,
}

impl MountPoint {
	pub fn new(context: RuntimeContext, config: ProviderConfig) -> Self {
		Self {
			context,
			lifecycle: CacheLifecycle::for_context(context),
			config,
			env: Arc::new(ProcessEnv),
			fetch: None,
			client: OnceLock::new(),
		}
	}

	/// Default configuration for `context`.
	pub fn for_context(context: RuntimeContext) -> Self {
		Self::new(context, ProviderConfig::default())
	}

	pub fn with_env(mut self, env: impl EnvSource + 'static) -> Self {
		self.env = Arc::new(env);
		self
	}

	/// Overrides the policy chosen from the context.
	pub fn with_lifecycle(mut self, lifecycle: CacheLifecycle) -> Self {
		self.lifecycle = lifecycle;
		self
	}

	/// HTTP backend for the client instead of the default reqwest one.
	pub fn with_fetch(mut self, fetch: Arc<dyn HttpFetch>) -> Self {
		self.fetch = Some(fetch);
		self
	}

	pub fn context(&self) -> RuntimeContext {
		self.context
	}

	pub fn config(&self) -> &ProviderConfig {
		&self.config
	}

	/// The client, once the first activation has built it.
	pub fn client(&self) -> Option<&RemoteClient> {
		self.client.get()
	}

	/// Acquires a cache under the lifecycle policy and returns it with this
	/// mount point's client, building the client on first use.
	///
	/// Fails only when the endpoint cannot be resolved.
	pub fn activate(&self) -> Result<RemoteScope> {
		let cache = self.lifecycle.acquire();
		let client = match self.client.get() {
			Some(client) => client.clone(),
			None => {
				let built = self.build_client()?;
				self.client.get_or_init(|| built).clone()
			}
		};
		trace!(target: "tether.mount", context = %self.context, cache = cache.id(), "activated");
		Ok(RemoteScope { cache, client })
	}

	fn build_client(&self) -> Result<RemoteClient> {
		let endpoint = resolve_endpoint(self.context, self.env.as_ref(), &self.config)?;
		debug!(target: "tether.mount", context = %self.context, %endpoint, "building client");
		Ok(match &self.fetch {
			Some(fetch) => build_remote_client_with_fetch(&endpoint, &self.config, Arc::clone(fetch)),
			None => build_remote_client(&endpoint, &self.config),
		})
	}

	/// Runs `child` with this mount point's scope active.
	pub fn render<R>(&self, child: impl FnOnce() -> R) -> Result<R> {
		let scope = self.activate()?;
		let _guard = ScopeGuard::push(scope);
		Ok(child())
	}

	/// Awaits `child` with this mount point's scope active.
	pub async fn render_async<F: Future>(&self, child: F) -> Result<F::Output> {
		let scope = self.activate()?;
		let mut stack = with_stack(|stack| stack.borrow().clone());
		stack.push(scope);
		Ok(TASK_SCOPES.scope(RefCell::new(stack), child).await)
	}
}
