//! Query cache handle and its factory.
//!
//! [`QueryCache`] is a cheap-clone handle to a keyed store of query results.
//! Entries live in a [`DashMap`] so server tasks and UI code can read and
//! write concurrently. Two handles are the same cache when
//! [`QueryCache::ptr_eq`] says so; [`QueryCache::id`] gives a stable number
//! for logs.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tether_protocol::{RichJson, RichValue, Transformer};
use tracing::{debug, trace};

use crate::error::Result;

static NEXT_CACHE_ID: AtomicU64 = AtomicU64::new(1);

/// Cache key: procedure path plus the canonical encoding of its input.
///
/// Inputs that differ only in object field order produce the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QueryKey {
	pub path: String,
	pub input: String,
}

impl QueryKey {
	pub fn new(path: impl Into<String>, input: &RichValue) -> Self {
		Self {
			path: path.into(),
			input: RichJson.serialize(input).to_string(),
		}
	}

	/// True when `prefix` is this key's path or a dotted ancestor of it.
	pub fn matches_prefix(&self, prefix: &str) -> bool {
		match self.path.strip_prefix(prefix) {
			Some(rest) => prefix.is_empty() || rest.is_empty() || rest.starts_with('.'),
			None => false,
		}
	}
}

impl fmt::Display for QueryKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}({})", self.path, self.input)
	}
}

#[derive(Debug, Clone)]
struct CacheEntry {
	value: RichValue,
	updated_at: DateTime<Utc>,
}

struct Inner {
	id: u64,
	entries: DashMap<QueryKey, CacheEntry>,
}

/// Shared handle to a store of query results.
#[derive(Clone)]
pub struct QueryCache {
	inner: Arc<Inner>,
}

impl Default for QueryCache {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Debug for QueryCache {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("QueryCache")
			.field("id", &self.inner.id)
			.field("entries", &self.inner.entries.len())
			.finish()
	}
}

impl QueryCache {
	pub fn new() -> Self {
		Self {
			inner: Arc::new(Inner {
				id: NEXT_CACHE_ID.fetch_add(1, Ordering::Relaxed),
				entries: DashMap::new(),
			}),
		}
	}

	/// Process-unique number of the underlying store.
	pub fn id(&self) -> u64 {
		self.inner.id
	}

	/// True when both handles point at the same store.
	pub fn ptr_eq(&self, other: &QueryCache) -> bool {
		Arc::ptr_eq(&self.inner, &other.inner)
	}

	pub fn get(&self, key: &QueryKey) -> Option<RichValue> {
		self.inner.entries.get(key).map(|entry| entry.value.clone())
	}

	/// When the entry for `key` was last written.
	pub fn updated_at(&self, key: &QueryKey) -> Option<DateTime<Utc>> {
		self.inner.entries.get(key).map(|entry| entry.updated_at)
	}

	pub fn set(&self, key: QueryKey, value: RichValue) {
		self.insert(key, value, Utc::now());
	}

	fn insert(&self, key: QueryKey, value: RichValue, updated_at: DateTime<Utc>) {
		self.inner.entries.insert(key, CacheEntry { value, updated_at });
	}

	pub fn contains(&self, key: &QueryKey) -> bool {
		self.inner.entries.contains_key(key)
	}

	/// Removes one entry. Returns whether it existed.
	pub fn invalidate(&self, key: &QueryKey) -> bool {
		self.inner.entries.remove(key).is_some()
	}

	/// Removes every entry under a dotted path prefix (`"post"` covers
	/// `"post"` and `"post.byId"`, not `"posts"`). Returns how many went.
	pub fn invalidate_prefix(&self, prefix: &str) -> usize {
		let before = self.inner.entries.len();
		self.inner.entries.retain(|key, _| !key.matches_prefix(prefix));
		let removed = before.saturating_sub(self.inner.entries.len());
		trace!(target: "tether.cache", cache = self.inner.id, prefix, removed, "invalidate");
		removed
	}

	pub fn clear(&self) {
		self.inner.entries.clear();
	}

	pub fn len(&self) -> usize {
		self.inner.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.inner.entries.is_empty()
	}

	/// Keys currently stored, sorted.
	pub fn keys(&self) -> Vec<QueryKey> {
		let mut keys: Vec<QueryKey> = self.inner.entries.iter().map(|entry| entry.key().clone()).collect();
		keys.sort();
		keys
	}

	/// Returns the cached value for `key`, or awaits `fetch` and stores its
	/// result. Failures are returned and not stored.
	pub async fn ensure<F, E>(&self, key: QueryKey, fetch: F) -> std::result::Result<RichValue, E>
	where
		F: Future<Output = std::result::Result<RichValue, E>>,
	{
		if let Some(value) = self.get(&key) {
			trace!(target: "tether.cache", cache = self.inner.id, %key, "hit");
			return Ok(value);
		}
		trace!(target: "tether.cache", cache = self.inner.id, %key, "miss");
		let value = fetch.await?;
		self.set(key, value.clone());
		Ok(value)
	}

	/// Snapshot of every entry, encoded with `transformer`.
	pub fn dehydrate(&self, transformer: &dyn Transformer) -> DehydratedState {
		let mut queries: Vec<DehydratedQuery> = self
			.inner
			.entries
			.iter()
			.map(|entry| DehydratedQuery {
				key: entry.key().clone(),
				data: transformer.serialize(&entry.value().value),
				data_updated_at: entry.value().updated_at.timestamp_millis(),
			})
			.collect();
		queries.sort_by(|a, b| a.key.cmp(&b.key));
		debug!(target: "tether.cache", cache = self.inner.id, queries = queries.len(), "dehydrated");
		DehydratedState { queries }
	}

	/// Loads entries from `state`. An entry already present and at least as
	/// new as the incoming one is kept. Returns how many entries were written.
	pub fn hydrate(&self, state: &DehydratedState, transformer: &dyn Transformer) -> Result<usize> {
		let mut written = 0;
		for query in &state.queries {
			let updated_at = DateTime::<Utc>::from_timestamp_millis(query.data_updated_at).unwrap_or_else(Utc::now);
			if self.updated_at(&query.key).is_some_and(|current| current >= updated_at) {
				continue;
			}
			let value = transformer.deserialize(query.data.clone())?;
			self.insert(query.key.clone(), value, updated_at);
			written += 1;
		}
		debug!(target: "tether.cache", cache = self.inner.id, written, total = state.queries.len(), "hydrated");
		Ok(written)
	}
}

/// Serializable snapshot of a cache, for handing server results to a browser.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DehydratedState {
	pub queries: Vec<DehydratedQuery>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DehydratedQuery {
	pub key: QueryKey,
	/// Transformer-encoded value.
	pub data: Value,
	/// Milliseconds since the Unix epoch.
	pub data_updated_at: i64,
}

impl DehydratedState {
	pub fn to_json(&self) -> Result<String> {
		Ok(serde_json::to_string(self)?)
	}

	pub fn from_json(json: &str) -> Result<Self> {
		Ok(serde_json::from_str(json)?)
	}
}

/// Builds new caches.
pub trait CacheFactory: Send + Sync {
	fn make(&self) -> QueryCache;
}

impl<F> CacheFactory for F
where
	F: Fn() -> QueryCache + Send + Sync,
{
	fn make(&self) -> QueryCache {
		self()
	}
}

/// Factory producing empty caches via [`make_query_cache`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCacheFactory;

impl CacheFactory for DefaultCacheFactory {
	fn make(&self) -> QueryCache {
		make_query_cache()
	}
}

/// Creates a fresh, empty cache.
pub fn make_query_cache() -> QueryCache {
	QueryCache::new()
}

#[cfg(test)]
mod tests {
	use chrono::TimeZone;
	use tether_protocol::Identity;

	use super::*;

	fn key(path: &str, id: i64) -> QueryKey {
		QueryKey::new(path, &RichValue::object().with_field("id", id))
	}

	#[test]
	fn factory_makes_distinct_caches() {
		let a = make_query_cache();
		let b = DefaultCacheFactory.make();
		assert!(!a.ptr_eq(&b));
		assert_ne!(a.id(), b.id());
		assert!(a.ptr_eq(&a.clone()));
	}

	#[test]
	fn closures_are_factories() {
		let shared = QueryCache::new();
		let handle = shared.clone();
		let factory = move || handle.clone();
		assert!(factory.make().ptr_eq(&shared));
	}

	#[test]
	fn field_order_does_not_change_key() {
		let ab = RichValue::object().with_field("a", 1).with_field("b", 2);
		let ba = RichValue::object().with_field("b", 2).with_field("a", 1);
		assert_eq!(QueryKey::new("q", &ab), QueryKey::new("q", &ba));
		assert_ne!(QueryKey::new("q", &ab), QueryKey::new("r", &ab));
	}

	#[test]
	fn set_get_invalidate() {
		let cache = QueryCache::new();
		cache.set(key("user.byId", 1), RichValue::from("ada"));

		assert_eq!(cache.get(&key("user.byId", 1)), Some(RichValue::from("ada")));
		assert!(cache.contains(&key("user.byId", 1)));
		assert!(!cache.contains(&key("user.byId", 2)));
		assert!(cache.invalidate(&key("user.byId", 1)));
		assert!(!cache.invalidate(&key("user.byId", 1)));
		assert!(cache.is_empty());
	}

	#[test]
	fn prefix_invalidation_respects_segments() {
		let cache = QueryCache::new();
		cache.set(key("post", 0), RichValue::Null);
		cache.set(key("post.byId", 1), RichValue::Null);
		cache.set(key("post.comments.list", 1), RichValue::Null);
		cache.set(key("posts", 1), RichValue::Null);

		assert_eq!(cache.invalidate_prefix("post"), 3);
		assert_eq!(cache.keys(), vec![key("posts", 1)]);

		cache.clear();
		assert_eq!(cache.len(), 0);
	}

	#[tokio::test]
	async fn ensure_fetches_once_and_skips_errors() {
		let cache = QueryCache::new();

		let failed: std::result::Result<RichValue, &str> = cache.ensure(key("q", 1), async { Err("offline") }).await;
		assert_eq!(failed, Err("offline"));
		assert!(cache.is_empty());

		let first = cache.ensure(key("q", 1), async { Ok::<_, ()>(RichValue::from(1)) }).await;
		let second = cache.ensure(key("q", 1), async { Ok::<_, ()>(RichValue::from(2)) }).await;
		assert_eq!(first, Ok(RichValue::Int(1)));
		assert_eq!(second, Ok(RichValue::Int(1)));
	}

	#[test]
	fn dehydrate_hydrate_keeps_rich_values() {
		let when = Utc.with_ymd_and_hms(2024, 2, 29, 12, 0, 0).unwrap();
		let server = QueryCache::new();
		server.set(key("event.byId", 9), RichValue::object().with_field("at", when));
		server.set(key("event.tags", 9), RichValue::Set(vec![RichValue::from("a"), RichValue::from("b")]));

		let json = server.dehydrate(&RichJson).to_json().unwrap();
		let browser = QueryCache::new();
		let written = browser.hydrate(&DehydratedState::from_json(&json).unwrap(), &RichJson).unwrap();

		assert_eq!(written, 2);
		assert_eq!(
			browser.get(&key("event.byId", 9)),
			Some(RichValue::object().with_field("at", when))
		);
		assert!(matches!(browser.get(&key("event.tags", 9)), Some(RichValue::Set(ref items)) if items.len() == 2));
	}

	#[test]
	fn hydrate_keeps_newer_local_entries() {
		let server = QueryCache::new();
		server.insert(key("q", 1), RichValue::from("old"), Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap());
		let state = server.dehydrate(&Identity);

		let browser = QueryCache::new();
		browser.set(key("q", 1), RichValue::from("fresh"));

		assert_eq!(browser.hydrate(&state, &Identity).unwrap(), 0);
		assert_eq!(browser.get(&key("q", 1)), Some(RichValue::from("fresh")));
	}
}
