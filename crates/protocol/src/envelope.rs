//! HTTP batch envelope types.
//!
//! A batch exchange carries several procedure calls of one kind:
//!
//! - queries: `GET {url}/{path0},{path1}?batch=1&input={"0": ..., "1": ...}`
//! - mutations: `POST {url}/{path0},{path1}?batch=1` with the same input map as body
//!
//! The response body is a JSON array aligned with the request order. Each
//! item is either `{"result": {"data": <encoded>}}` or `{"error": <encoded>}`
//! where the error decodes to an [`ErrorShape`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Kind of a remote procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcedureType {
	Query,
	Mutation,
	Subscription,
}

impl ProcedureType {
	pub fn as_str(self) -> &'static str {
		match self {
			ProcedureType::Query => "query",
			ProcedureType::Mutation => "mutation",
			ProcedureType::Subscription => "subscription",
		}
	}
}

impl std::fmt::Display for ProcedureType {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// One element of a batch response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseItem {
	/// Successful call.
	Result { result: ResultPayload },
	/// Failed call; `error` is transformer-encoded and decodes to [`ErrorShape`].
	Error { error: Value },
}

/// Success payload of a batch item.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultPayload {
	/// Transformer-encoded return value. Absent when the procedure returned nothing.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub data: Option<Value>,
}

/// Error reported by the server for a single call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorShape {
	pub message: String,
	/// JSON-RPC style numeric code (see [`codes`]).
	pub code: i32,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub data: Option<ErrorData>,
}

/// Structured detail attached to an [`ErrorShape`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorData {
	/// Symbolic code such as `NOT_FOUND`.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub code: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub http_status: Option<u16>,
	/// Procedure path that failed.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub path: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub stack: Option<String>,
}

impl ErrorShape {
	/// Symbolic code, from `data.code` or derived from the numeric code.
	pub fn code_name(&self) -> &str {
		self.data
			.as_ref()
			.and_then(|d| d.code.as_deref())
			.or_else(|| codes::name(self.code))
			.unwrap_or("UNKNOWN")
	}
}

/// Numeric error codes and their symbolic names.
pub mod codes {
	pub const PARSE_ERROR: i32 = -32700;
	pub const BAD_REQUEST: i32 = -32600;
	pub const INTERNAL_SERVER_ERROR: i32 = -32603;
	pub const NOT_IMPLEMENTED: i32 = -32603;
	pub const UNAUTHORIZED: i32 = -32001;
	pub const FORBIDDEN: i32 = -32003;
	pub const NOT_FOUND: i32 = -32004;
	pub const METHOD_NOT_SUPPORTED: i32 = -32005;
	pub const TIMEOUT: i32 = -32008;
	pub const CONFLICT: i32 = -32009;
	pub const PRECONDITION_FAILED: i32 = -32012;
	pub const PAYLOAD_TOO_LARGE: i32 = -32013;
	pub const UNPROCESSABLE_CONTENT: i32 = -32022;
	pub const TOO_MANY_REQUESTS: i32 = -32029;
	pub const CLIENT_CLOSED_REQUEST: i32 = -32099;

	/// Symbolic name for a numeric code.
	///
	/// `-32603` is shared by two names; it maps to `INTERNAL_SERVER_ERROR`.
	pub fn name(code: i32) -> Option<&'static str> {
		Some(match code {
			PARSE_ERROR => "PARSE_ERROR",
			BAD_REQUEST => "BAD_REQUEST",
			INTERNAL_SERVER_ERROR => "INTERNAL_SERVER_ERROR",
			UNAUTHORIZED => "UNAUTHORIZED",
			FORBIDDEN => "FORBIDDEN",
			NOT_FOUND => "NOT_FOUND",
			METHOD_NOT_SUPPORTED => "METHOD_NOT_SUPPORTED",
			TIMEOUT => "TIMEOUT",
			CONFLICT => "CONFLICT",
			PRECONDITION_FAILED => "PRECONDITION_FAILED",
			PAYLOAD_TOO_LARGE => "PAYLOAD_TOO_LARGE",
			UNPROCESSABLE_CONTENT => "UNPROCESSABLE_CONTENT",
			TOO_MANY_REQUESTS => "TOO_MANY_REQUESTS",
			CLIENT_CLOSED_REQUEST => "CLIENT_CLOSED_REQUEST",
			_ => return None,
		})
	}
}

/// Builds the `{"0": ..., "1": ...}` input map of a batch.
pub fn batch_input<I>(inputs: I) -> Value
where
	I: IntoIterator<Item = Value>,
{
	Value::Object(inputs.into_iter().enumerate().map(|(i, v)| (i.to_string(), v)).collect::<Map<_, _>>())
}
