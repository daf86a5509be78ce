//! Splitting queued calls into HTTP exchanges, and the exchange wire format.

use serde_json::Value;
use tether_protocol::{ErrorShape, ProcedureType, ResponseItem, RichValue, Transformer, batch_input};
use url::form_urlencoded::byte_serialize;

use crate::error::{Error, Result};
use crate::fetch::{HttpMethod, HttpRequest, HttpResponse};

/// Caps on the size of a single exchange.
///
/// `None` means unbounded. A `max_items` of zero is treated as unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchLimits {
	/// Maximum number of calls per exchange.
	pub max_items: Option<usize>,
	/// Maximum length of a GET URL, input included.
	pub max_url_length: Option<usize>,
}

impl BatchLimits {
	pub fn with_max_items(mut self, max: usize) -> Self {
		self.max_items = Some(max);
		self
	}

	pub fn with_max_url_length(mut self, max: usize) -> Self {
		self.max_url_length = Some(max);
		self
	}

	fn item_cap(&self) -> Option<usize> {
		self.max_items.filter(|&max| max > 0)
	}
}

/// A queued call as the planner sees it.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PlanEntry<'a> {
	pub kind: ProcedureType,
	pub path: &'a str,
	/// Transformer-encoded input.
	pub input: &'a Value,
}

/// One exchange: calls of a single kind, by index into the planned slice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Exchange {
	pub kind: ProcedureType,
	pub indices: Vec<usize>,
}

/// Groups calls by kind and splits each group to respect `limits`.
///
/// Kinds appear in the order of their first call; calls keep their relative
/// order inside each kind. A query whose URL alone exceeds the length cap is
/// sent on its own.
pub(crate) fn plan(url: &str, entries: &[PlanEntry<'_>], limits: &BatchLimits) -> Vec<Exchange> {
	let mut kinds: Vec<ProcedureType> = Vec::new();
	for entry in entries {
		if !kinds.contains(&entry.kind) {
			kinds.push(entry.kind);
		}
	}

	let mut exchanges = Vec::new();
	for kind in kinds {
		let mut current: Vec<usize> = Vec::new();
		for index in (0..entries.len()).filter(|&i| entries[i].kind == kind) {
			if !current.is_empty() && must_split(url, entries, &current, index, limits) {
				exchanges.push(Exchange {
					kind,
					indices: std::mem::take(&mut current),
				});
			}
			current.push(index);
		}
		if !current.is_empty() {
			exchanges.push(Exchange { kind, indices: current });
		}
	}
	exchanges
}

fn must_split(url: &str, entries: &[PlanEntry<'_>], current: &[usize], next: usize, limits: &BatchLimits) -> bool {
	if limits.item_cap().is_some_and(|max| current.len() >= max) {
		return true;
	}
	let Some(max_len) = limits.max_url_length else {
		return false;
	};
	if entries[next].kind != ProcedureType::Query {
		return false;
	}

	let candidate: Vec<&PlanEntry<'_>> = current.iter().chain(std::iter::once(&next)).map(|&i| &entries[i]).collect();
	let paths: Vec<&str> = candidate.iter().map(|e| e.path).collect();
	let inputs: Vec<&Value> = candidate.iter().map(|e| e.input).collect();
	query_url(url, &paths, &inputs).len() > max_len
}

/// `{url}/{p0},{p1}?batch=1&input=<urlencoded {"0": .., "1": ..}>`
pub(crate) fn query_url(url: &str, paths: &[&str], inputs: &[&Value]) -> String {
	let input = batch_input(inputs.iter().map(|v| (*v).clone())).to_string();
	let encoded: String = byte_serialize(input.as_bytes()).collect();
	format!("{url}/{}?batch=1&input={encoded}", paths.join(","))
}

/// Builds the HTTP request for one exchange.
pub(crate) fn build_request(
	url: &str,
	kind: ProcedureType,
	paths: &[&str],
	inputs: &[&Value],
	headers: &[(String, String)],
) -> HttpRequest {
	match kind {
		ProcedureType::Mutation => HttpRequest {
			method: HttpMethod::Post,
			url: format!("{url}/{}?batch=1", paths.join(",")),
			headers: headers.to_vec(),
			body: Some(batch_input(inputs.iter().map(|v| (*v).clone())).to_string()),
		},
		_ => HttpRequest {
			method: HttpMethod::Get,
			url: query_url(url, paths, inputs),
			headers: headers.to_vec(),
			body: None,
		},
	}
}

/// Splits a batch response into one result per call.
///
/// The outer `Err` is a failure of the whole exchange; the inner results are
/// per call, aligned with the request order.
pub(crate) fn parse_response(
	response: HttpResponse,
	transformer: &dyn Transformer,
	expected: usize,
) -> Result<Vec<Result<RichValue>>> {
	let body: Value = match serde_json::from_str(&response.body) {
		Ok(body) => body,
		Err(_) if !response.is_success() => {
			return Err(Error::Http {
				status: response.status,
				body: response.body,
			});
		}
		Err(e) => return Err(Error::Protocol(format!("response is not JSON: {e}"))),
	};

	let items = match body {
		Value::Array(items) => items,
		// Whole-batch failures come back as a single error object.
		Value::Object(mut object) if object.contains_key("error") => {
			let error = object.remove("error").unwrap_or(Value::Null);
			return Err(decode_error(transformer, error));
		}
		other if !response.is_success() => {
			return Err(Error::Http {
				status: response.status,
				body: other.to_string(),
			});
		}
		_ => return Err(Error::Protocol("response is not a batch array".to_string())),
	};

	if items.len() != expected {
		return Err(Error::Protocol(format!(
			"expected {expected} batch items, got {}",
			items.len()
		)));
	}

	Ok(items.into_iter().map(|item| decode_item(transformer, item)).collect())
}

fn decode_item(transformer: &dyn Transformer, item: Value) -> Result<RichValue> {
	match serde_json::from_value::<ResponseItem>(item) {
		Ok(ResponseItem::Result { result }) => match result.data {
			Some(data) => Ok(transformer.deserialize(data)?),
			None => Ok(RichValue::Undefined),
		},
		Ok(ResponseItem::Error { error }) => Err(decode_error(transformer, error)),
		Err(e) => Err(Error::Protocol(format!("malformed batch item: {e}"))),
	}
}

fn decode_error(transformer: &dyn Transformer, error: Value) -> Error {
	let payload = match transformer.deserialize(error) {
		Ok(value) => value.to_plain_json(),
		Err(e) => return Error::Transform(e),
	};
	match serde_json::from_value::<ErrorShape>(payload.clone()) {
		Ok(shape) => Error::from_shape(shape, payload),
		Err(e) => Error::Protocol(format!("malformed error shape: {e}")),
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;
	use tether_protocol::RichJson;

	use super::*;

	const URL: &str = "http://test/api/trpc";

	fn entries<'a>(calls: &'a [(ProcedureType, &'a str, Value)]) -> Vec<PlanEntry<'a>> {
		calls
			.iter()
			.map(|(kind, path, input)| PlanEntry {
				kind: *kind,
				path: *path,
				input,
			})
			.collect()
	}

	#[test]
	fn groups_by_kind_in_first_seen_order() {
		let calls = [
			(ProcedureType::Mutation, "post.add", json!(1)),
			(ProcedureType::Query, "post.list", json!(2)),
			(ProcedureType::Mutation, "post.remove", json!(3)),
		];
		let planned = plan(URL, &entries(&calls), &BatchLimits::default());

		assert_eq!(
			planned,
			vec![
				Exchange {
					kind: ProcedureType::Mutation,
					indices: vec![0, 2],
				},
				Exchange {
					kind: ProcedureType::Query,
					indices: vec![1],
				},
			]
		);
	}

	#[test]
	fn item_cap_splits_and_zero_is_ignored() {
		let calls: Vec<_> = (0..5).map(|i| (ProcedureType::Query, "q", json!(i))).collect();

		let capped = plan(URL, &entries(&calls), &BatchLimits::default().with_max_items(2));
		let sizes: Vec<usize> = capped.iter().map(|e| e.indices.len()).collect();
		assert_eq!(sizes, vec![2, 2, 1]);

		let zero = plan(URL, &entries(&calls), &BatchLimits::default().with_max_items(0));
		assert_eq!(zero.len(), 1);
	}

	#[test]
	fn url_length_cap_splits_queries_only() {
		let big = json!("x".repeat(100));
		let calls = [
			(ProcedureType::Query, "a", big.clone()),
			(ProcedureType::Query, "b", big.clone()),
			(ProcedureType::Mutation, "c", big.clone()),
			(ProcedureType::Mutation, "d", big.clone()),
		];
		let limits = BatchLimits::default().with_max_url_length(200);
		let planned = plan(URL, &entries(&calls), &limits);

		let groups: Vec<&[usize]> = planned.iter().map(|e| e.indices.as_slice()).collect();
		assert_eq!(groups, vec![&[0][..], &[1][..], &[2, 3][..]]);
	}

	#[test]
	fn query_request_encodes_input_in_url() {
		let one = json!({"json": {"id": 1}});
		let two = json!({"json": "a b"});
		let request = build_request(URL, ProcedureType::Query, &["user.byId", "greet"], &[&one, &two], &[]);

		assert_eq!(request.method, HttpMethod::Get);
		assert!(request.body.is_none());
		let (prefix, encoded) = request.url.split_once("&input=").unwrap();
		assert_eq!(prefix, "http://test/api/trpc/user.byId,greet?batch=1");
		let decoded: String = url::form_urlencoded::parse(format!("input={encoded}").as_bytes())
			.map(|(_, v)| v.into_owned())
			.collect();
		let input: Value = serde_json::from_str(&decoded).unwrap();
		assert_eq!(input, json!({"0": {"json": {"id": 1}}, "1": {"json": "a b"}}));
	}

	#[test]
	fn mutation_request_carries_body() {
		let input = json!({"json": {"title": "hi"}});
		let headers = vec![("x-trace".to_string(), "1".to_string())];
		let request = build_request(URL, ProcedureType::Mutation, &["post.add"], &[&input], &headers);

		assert_eq!(request.method, HttpMethod::Post);
		assert_eq!(request.url, "http://test/api/trpc/post.add?batch=1");
		assert_eq!(request.headers, headers);
		let body: Value = serde_json::from_str(request.body.as_deref().unwrap()).unwrap();
		assert_eq!(body, json!({"0": {"json": {"title": "hi"}}}));
	}

	#[test]
	fn response_items_decode_independently() {
		let response = HttpResponse {
			status: 207,
			body: json!([
				{"result": {"data": {"json": "2024-01-02T03:04:05.000Z", "meta": {"values": {"": ["Date"]}}}}},
				{"result": {}},
				{"error": {"json": {"message": "gone", "code": -32004, "data": {"httpStatus": 404}}}},
			])
			.to_string(),
		};
		let results = parse_response(response, &RichJson, 3).unwrap();

		assert!(matches!(results[0], Ok(RichValue::Date(_))));
		assert_eq!(results[1].as_ref().unwrap(), &RichValue::Undefined);
		let err = results[2].as_ref().unwrap_err();
		assert!(err.is_not_found());
		assert_eq!(err.to_string(), "NOT_FOUND: gone");
	}

	#[test]
	fn non_json_error_status_is_http_error() {
		let response = HttpResponse {
			status: 502,
			body: "bad gateway".to_string(),
		};
		let err = parse_response(response, &RichJson, 1).unwrap_err();
		assert!(matches!(err, Error::Http { status: 502, ref body } if body == "bad gateway"));
	}

	#[test]
	fn single_error_object_fails_whole_batch() {
		let response = HttpResponse {
			status: 400,
			body: json!({"error": {"json": {"message": "bad input", "code": -32600}}}).to_string(),
		};
		let err = parse_response(response, &RichJson, 2).unwrap_err();
		assert_eq!(err.error_name(), Some("BAD_REQUEST"));
	}

	#[test]
	fn item_count_mismatch_is_protocol_error() {
		let response = HttpResponse {
			status: 200,
			body: "[]".to_string(),
		};
		assert!(matches!(parse_response(response, &RichJson, 1), Err(Error::Protocol(_))));
	}
}
