use futures_util::FutureExt;
use serde_json::json;
use tether_protocol::Identity;

use super::*;
use crate::fetch::{FetchFuture, HttpMethod, HttpResponse};

const URL: &str = "http://test/api/trpc";

type Responder = Box<dyn Fn(&HttpRequest) -> Result<HttpResponse> + Send + Sync>;

/// Records every request and answers with `respond`.
struct RecordingFetch {
	requests: Mutex<Vec<HttpRequest>>,
	respond: Responder,
}

impl RecordingFetch {
	fn new(respond: impl Fn(&HttpRequest) -> Result<HttpResponse> + Send + Sync + 'static) -> Arc<Self> {
		Arc::new(Self {
			requests: Mutex::new(Vec::new()),
			respond: Box::new(respond),
		})
	}

	fn echo() -> Arc<Self> {
		Self::new(|request| Ok(echo(request)))
	}

	fn requests(&self) -> Vec<HttpRequest> {
		self.requests.lock().clone()
	}
}

impl HttpFetch for RecordingFetch {
	fn fetch(&self, request: HttpRequest) -> FetchFuture<'_> {
		let response = (self.respond)(&request);
		self.requests.lock().push(request);
		Box::pin(async move { response })
	}
}

/// Batch input of a recorded request.
fn input_of(request: &HttpRequest) -> Value {
	let raw = match request.method {
		HttpMethod::Get => {
			let query = request.url.split_once('?').map(|(_, q)| q).unwrap_or_default();
			url::form_urlencoded::parse(query.as_bytes())
				.find(|(key, _)| key == "input")
				.map(|(_, value)| value.into_owned())
				.unwrap()
		}
		HttpMethod::Post => request.body.clone().unwrap(),
	};
	serde_json::from_str(&raw).unwrap()
}

/// Answers every call with its own encoded input.
fn echo(request: &HttpRequest) -> HttpResponse {
	let input = input_of(request);
	let input = input.as_object().unwrap();
	let items: Vec<Value> = (0..input.len())
		.map(|i| json!({"result": {"data": input[i.to_string().as_str()]}}))
		.collect();
	HttpResponse {
		status: 200,
		body: Value::Array(items).to_string(),
	}
}

fn link_with(fetch: Arc<RecordingFetch>, limits: BatchLimits) -> HttpBatchLink {
	HttpBatchLink::new(HttpBatchLinkOptions::new(URL).with_fetch(fetch).with_limits(limits))
}

fn send(link: &HttpBatchLink, op: Operation) -> LinkFuture<'_> {
	link.call(op, Next::new(&[]))
}

#[tokio::test]
async fn calls_in_one_tick_share_an_exchange() {
	let fetch = RecordingFetch::echo();
	let link = link_with(fetch.clone(), BatchLimits::default());
	let when = chrono::DateTime::parse_from_rfc3339("2024-05-06T07:08:09Z").unwrap().with_timezone(&chrono::Utc);

	let (a, b) = tokio::join!(
		send(&link, Operation::query("user.byId", RichValue::object().with_field("id", 7))),
		send(&link, Operation::query("clock.echo", RichValue::Date(when))),
	);

	assert_eq!(a.unwrap(), RichValue::object().with_field("id", 7));
	assert_eq!(b.unwrap(), RichValue::Date(when));
	assert_eq!(link.exchanges_sent(), 1);

	let requests = fetch.requests();
	assert_eq!(requests.len(), 1);
	assert_eq!(requests[0].method, HttpMethod::Get);
	assert!(requests[0].url.starts_with("http://test/api/trpc/user.byId,clock.echo?batch=1&input="));
}

#[tokio::test]
async fn queries_and_mutations_travel_separately() {
	let fetch = RecordingFetch::echo();
	let link = link_with(fetch.clone(), BatchLimits::default());

	let (query, mutation) = tokio::join!(
		send(&link, Operation::query("post.list", RichValue::Undefined)),
		send(&link, Operation::mutation("post.add", RichValue::from("hello"))),
	);

	assert_eq!(query.unwrap(), RichValue::Undefined);
	assert_eq!(mutation.unwrap(), RichValue::from("hello"));

	let requests = fetch.requests();
	assert_eq!(requests.len(), 2);
	let post = requests.iter().find(|r| r.method == HttpMethod::Post).unwrap();
	assert_eq!(post.url, "http://test/api/trpc/post.add?batch=1");
	assert_eq!(input_of(post), json!({"0": {"json": "hello"}}));
}

#[tokio::test]
async fn item_cap_splits_exchanges_and_keeps_order() {
	let fetch = RecordingFetch::echo();
	let link = link_with(fetch.clone(), BatchLimits::default().with_max_items(2));

	let (a, b, c) = tokio::join!(
		send(&link, Operation::query("n", RichValue::from(1))),
		send(&link, Operation::query("n", RichValue::from(2))),
		send(&link, Operation::query("n", RichValue::from(3))),
	);

	assert_eq!(a.unwrap(), RichValue::Int(1));
	assert_eq!(b.unwrap(), RichValue::Int(2));
	assert_eq!(c.unwrap(), RichValue::Int(3));
	assert_eq!(link.exchanges_sent(), 2);
}

#[tokio::test]
async fn oversized_query_goes_alone() {
	let fetch = RecordingFetch::echo();
	let link = link_with(fetch.clone(), BatchLimits::default().with_max_url_length(10));

	let (a, b) = tokio::join!(
		send(&link, Operation::query("first", RichValue::from("x"))),
		send(&link, Operation::query("second", RichValue::from("y"))),
	);

	assert_eq!(a.unwrap(), RichValue::from("x"));
	assert_eq!(b.unwrap(), RichValue::from("y"));
	assert_eq!(fetch.requests().len(), 2);
}

#[tokio::test]
async fn subscriptions_are_rejected() {
	let link = link_with(RecordingFetch::echo(), BatchLimits::default());

	let err = send(&link, Operation::subscription("feed.onPost", RichValue::Undefined)).await.unwrap_err();

	assert!(matches!(err, Error::UnsupportedOperation { kind: "subscription", ref path, .. } if path == "feed.onPost"));
	assert_eq!(link.exchanges_sent(), 0);
}

#[tokio::test]
async fn remote_errors_reach_only_their_caller() {
	let fetch = RecordingFetch::new(|_| {
		Ok(HttpResponse {
			status: 207,
			body: json!([
				{"result": {"data": {"json": "ok"}}},
				{"error": {"json": {
					"message": "not allowed",
					"code": -32001,
					"data": {"code": "UNAUTHORIZED", "httpStatus": 401, "path": "admin.stats"}
				}}},
			])
			.to_string(),
		})
	});
	let link = link_with(fetch, BatchLimits::default());

	let (ok, denied) = tokio::join!(
		send(&link, Operation::query("public.info", RichValue::Undefined)),
		send(&link, Operation::query("admin.stats", RichValue::Undefined)),
	);

	assert_eq!(ok.unwrap(), RichValue::from("ok"));
	let err = denied.unwrap_err();
	assert!(err.is_unauthorized());
	assert_eq!(err.http_status(), Some(401));
	assert!(matches!(err, Error::Remote { ref payload, .. } if payload["data"]["path"] == "admin.stats"));
}

#[tokio::test]
async fn transport_failure_reaches_every_caller() {
	let fetch = RecordingFetch::new(|_| Err(Error::Transport("connection refused".to_string())));
	let link = link_with(fetch, BatchLimits::default());

	let (a, b) = tokio::join!(
		send(&link, Operation::query("a", RichValue::Undefined)),
		send(&link, Operation::query("b", RichValue::Undefined)),
	);

	for result in [a, b] {
		assert!(matches!(result, Err(Error::Transport(ref msg)) if msg == "connection refused"));
	}
}

#[tokio::test]
async fn missing_data_decodes_to_undefined() {
	let fetch = RecordingFetch::new(|_| {
		Ok(HttpResponse {
			status: 200,
			body: r#"[{"result":{}}]"#.to_string(),
		})
	});
	let link = link_with(fetch, BatchLimits::default());

	let value = send(&link, Operation::mutation("session.end", RichValue::Undefined)).await.unwrap();

	assert_eq!(value, RichValue::Undefined);
}

#[tokio::test]
async fn abandoned_calls_are_left_out() {
	let fetch = RecordingFetch::echo();
	let link = link_with(fetch.clone(), BatchLimits::default());

	let mut abandoned = send(&link, Operation::query("slow", RichValue::Undefined));
	assert!(futures_util::poll!(&mut abandoned).is_pending());
	drop(abandoned);

	let kept = send(&link, Operation::query("fast", RichValue::from(1))).await.unwrap();

	assert_eq!(kept, RichValue::Int(1));
	let requests = fetch.requests();
	assert_eq!(requests.len(), 1);
	assert!(requests[0].url.starts_with("http://test/api/trpc/fast?"));
}

#[tokio::test]
async fn custom_transformer_and_headers_are_used() {
	let fetch = RecordingFetch::echo();
	let options = HttpBatchLinkOptions::new(URL)
		.with_fetch(fetch.clone())
		.with_transformer(Identity)
		.with_header("authorization", "Bearer t");
	let link = HttpBatchLink::new(options);

	let value = send(&link, Operation::query("echo", RichValue::from(5))).await.unwrap();

	assert_eq!(value, RichValue::Int(5));
	assert_eq!(link.transformer().name(), "identity");
	let requests = fetch.requests();
	assert_eq!(input_of(&requests[0]), json!({"0": 5}));
	assert_eq!(requests[0].headers, vec![("authorization".to_string(), "Bearer t".to_string())]);
}

#[test]
fn calling_outside_a_runtime_fails() {
	let link = link_with(RecordingFetch::echo(), BatchLimits::default());

	let result = send(&link, Operation::query("greet", RichValue::Undefined)).now_or_never();

	assert!(matches!(result, Some(Err(Error::NoRuntime { ref path })) if path == "greet"));
}
