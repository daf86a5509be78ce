//! When to create a query cache and when to reuse one.
//!
//! A server renders many requests in one process, so a cache shared between
//! them would leak one user's data into another's page. Each server
//! acquisition therefore gets a new cache. A browser session has one user
//! and many re-renders, so it keeps a single cache in a process-wide slot.
//!
//! | Context | Variant | Slot |
//! |---------|---------|------|
//! | `Server` | [`CacheLifecycle::PerRequest`] | never touched |
//! | `Browser` | [`CacheLifecycle::SessionShared`] | filled once, then read |

use std::fmt;
use std::sync::{Arc, LazyLock, OnceLock};

use tracing::{debug, trace};

use crate::cache::{CacheFactory, DefaultCacheFactory, QueryCache};
use crate::context::RuntimeContext;

static BROWSER_SLOT: LazyLock<Arc<SessionSlot>> = LazyLock::new(|| Arc::new(SessionSlot::new()));

/// Write-once holder of a session's cache.
#[derive(Default)]
pub struct SessionSlot {
	cell: OnceLock<QueryCache>,
}

impl fmt::Debug for SessionSlot {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("SessionSlot").field("cache", &self.cell.get()).finish()
	}
}

impl SessionSlot {
	pub fn new() -> Self {
		Self::default()
	}

	/// The slot shared by every browser-context provider in this process.
	pub fn global() -> Arc<SessionSlot> {
		Arc::clone(&BROWSER_SLOT)
	}

	pub fn get(&self) -> Option<QueryCache> {
		self.cell.get().cloned()
	}

	pub fn is_filled(&self) -> bool {
		self.cell.get().is_some()
	}

	/// Returns the stored cache, filling the slot with `factory` first if it
	/// is empty. The flag is true when this call created the cache.
	fn get_or_make(&self, factory: &dyn CacheFactory) -> (QueryCache, bool) {
		let mut created = false;
		let cache = self.cell.get_or_init(|| {
			created = true;
			factory.make()
		});
		(cache.clone(), created)
	}
}

/// Cache acquisition policy, fixed when a provider is composed.
#[derive(Clone)]
pub enum CacheLifecycle {
	/// A new cache on every acquisition.
	PerRequest { factory: Arc<dyn CacheFactory> },
	/// One cache per slot, created on first acquisition.
	SessionShared {
		slot: Arc<SessionSlot>,
		factory: Arc<dyn CacheFactory>,
	},
}

impl fmt::Debug for CacheLifecycle {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			CacheLifecycle::PerRequest { .. } => f.write_str("PerRequest"),
			CacheLifecycle::SessionShared { slot, .. } => f.debug_struct("SessionShared").field("slot", slot).finish(),
		}
	}
}

impl CacheLifecycle {
	/// Per-request on the server, session-shared (global slot) in the browser.
	pub fn for_context(context: RuntimeContext) -> Self {
		match context {
			RuntimeContext::Server => Self::per_request(),
			RuntimeContext::Browser => Self::session_shared(SessionSlot::global()),
		}
	}

	pub fn per_request() -> Self {
		CacheLifecycle::PerRequest {
			factory: Arc::new(DefaultCacheFactory),
		}
	}

	pub fn session_shared(slot: Arc<SessionSlot>) -> Self {
		CacheLifecycle::SessionShared {
			slot,
			factory: Arc::new(DefaultCacheFactory),
		}
	}

	/// Replaces the factory, keeping the variant and slot.
	pub fn with_factory(self, factory: impl CacheFactory + 'static) -> Self {
		let factory: Arc<dyn CacheFactory> = Arc::new(factory);
		match self {
			CacheLifecycle::PerRequest { .. } => CacheLifecycle::PerRequest { factory },
			CacheLifecycle::SessionShared { slot, .. } => CacheLifecycle::SessionShared { slot, factory },
		}
	}

	pub fn context(&self) -> RuntimeContext {
		match self {
			CacheLifecycle::PerRequest { .. } => RuntimeContext::Server,
			CacheLifecycle::SessionShared { .. } => RuntimeContext::Browser,
		}
	}

	pub fn acquire(&self) -> QueryCache {
		match self {
			CacheLifecycle::PerRequest { factory } => {
				let cache = factory.make();
				debug!(target: "tether.lifecycle", cache = cache.id(), "created per-request cache");
				cache
			}
			CacheLifecycle::SessionShared { slot, factory } => {
				let (cache, created) = slot.get_or_make(factory.as_ref());
				if created {
					debug!(target: "tether.lifecycle", cache = cache.id(), "created session cache");
				} else {
					trace!(target: "tether.lifecycle", cache = cache.id(), "reusing session cache");
				}
				cache
			}
		}
	}
}

/// Acquires a cache under the default policy for `context`.
pub fn acquire_query_cache(context: RuntimeContext) -> QueryCache {
	CacheLifecycle::for_context(context).acquire()
}
