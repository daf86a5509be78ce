use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tether_protocol::RichValue;

use super::*;

/// Terminating link that answers with the operation's path.
struct Answer;

impl Link for Answer {
	fn call<'a>(&'a self, op: Operation, _next: Next<'a>) -> LinkFuture<'a> {
		Box::pin(async move { Ok(RichValue::String(op.path)) })
	}
}

/// Forwarding link that prefixes the path and counts calls.
struct Prefix {
	prefix: &'static str,
	seen: AtomicUsize,
}

impl Link for Prefix {
	fn call<'a>(&'a self, mut op: Operation, next: Next<'a>) -> LinkFuture<'a> {
		self.seen.fetch_add(1, Ordering::SeqCst);
		op.path = format!("{}{}", self.prefix, op.path);
		next.run(op)
	}
}

#[tokio::test]
async fn links_run_in_order() {
	let outer = Arc::new(Prefix {
		prefix: "a.",
		seen: AtomicUsize::new(0),
	});
	let inner = Arc::new(Prefix {
		prefix: "b.",
		seen: AtomicUsize::new(0),
	});
	let chain: Vec<Arc<dyn Link>> = vec![outer.clone(), inner.clone(), Arc::new(Answer)];

	let result = Next::new(&chain).run(Operation::query("greet", RichValue::Undefined)).await.unwrap();

	assert_eq!(result, RichValue::String("b.a.greet".to_string()));
	assert_eq!(outer.seen.load(Ordering::SeqCst), 1);
	assert_eq!(inner.seen.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn chain_without_terminator_fails() {
	let chain: Vec<Arc<dyn Link>> = vec![Arc::new(LoggerLink::new())];

	let err = Next::new(&chain).run(Operation::mutation("post.add", RichValue::Null)).await.unwrap_err();

	assert!(matches!(err, Error::NoTerminatingLink { ref path } if path == "post.add"));
}

#[tokio::test]
async fn empty_chain_fails() {
	let chain: Vec<Arc<dyn Link>> = Vec::new();
	let next = Next::new(&chain);
	assert_eq!(next.remaining(), 0);
	assert!(next.run(Operation::query("x", RichValue::Null)).await.is_err());
}

#[tokio::test]
async fn logger_forwards_results_untouched() {
	let filtered = Arc::new(LoggerLink::with_filter(|op| op.path.starts_with("debug.")));
	let chain: Vec<Arc<dyn Link>> = vec![Arc::new(LoggerLink::default()), filtered, Arc::new(Answer)];

	let result = Next::new(&chain).run(Operation::query("user.list", RichValue::Undefined)).await.unwrap();

	assert_eq!(result, RichValue::String("user.list".to_string()));
}
