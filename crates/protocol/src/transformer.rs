//! Symmetric encoders for request and response bodies.
//!
//! A [`Transformer`] turns a [`RichValue`] into JSON for the wire and back.
//! The same transformer must be configured on both ends.
//!
//! [`RichJson`] writes a `{json, meta}` envelope. `json` is the plain JSON
//! form of the value; `meta.values` maps the dotted path of every node whose
//! kind plain JSON cannot express to an annotation naming that kind:
//!
//! ```text
//! {
//!   "json": {"at": "2024-03-01T12:30:00Z", "tags": ["a", "b"]},
//!   "meta": {"values": {"at": ["Date"], "tags": ["set"]}}
//! }
//! ```
//!
//! Path segments are object keys or array indices; map entries are
//! addressed as `<map>.<index>.0` (key) and `<map>.<index>.1` (value). A
//! literal `.` or `\` in a key is escaped with `\`, and an empty key is
//! written `\0` so that it never collides with the empty path, which names
//! the root.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::value::{RichValue, format_date, non_finite_literal};

/// Errors raised while decoding a transformed body.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransformError {
	/// The body is not a valid envelope.
	#[error("malformed envelope: {0}")]
	Envelope(String),

	/// An annotation points at a node that does not exist.
	#[error("annotation path '{0}' does not resolve")]
	Path(String),

	/// The annotation names a kind this transformer does not know.
	#[error("unknown annotation '{kind}' at '{path}'")]
	UnknownAnnotation { kind: String, path: String },

	/// The annotated node has the wrong shape for its kind.
	#[error("invalid {kind} literal at '{path}': {value}")]
	InvalidLiteral { kind: &'static str, path: String, value: String },
}

/// Encodes and decodes values symmetrically for the wire.
pub trait Transformer: Send + Sync {
	/// Encodes a value for a request or response body.
	fn serialize(&self, value: &RichValue) -> Value;

	/// Decodes a value produced by [`serialize`](Self::serialize) on the other end.
	fn deserialize(&self, value: Value) -> Result<RichValue, TransformError>;

	/// Name used in logs.
	fn name(&self) -> &'static str;
}

/// Plain JSON. Rich kinds degrade as in [`RichValue::to_plain_json`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl Transformer for Identity {
	fn serialize(&self, value: &RichValue) -> Value {
		value.to_plain_json()
	}

	fn deserialize(&self, value: Value) -> Result<RichValue, TransformError> {
		Ok(RichValue::from(value))
	}

	fn name(&self) -> &'static str {
		"identity"
	}
}

/// Lossless `{json, meta}` envelope.
#[derive(Debug, Clone, Copy, Default)]
pub struct RichJson;

const DATE: &str = "Date";
const BIGINT: &str = "bigint";
const UNDEFINED: &str = "undefined";
const MAP: &str = "map";
const SET: &str = "set";
const REGEXP: &str = "regexp";
const NUMBER: &str = "number";

impl Transformer for RichJson {
	fn serialize(&self, value: &RichValue) -> Value {
		let mut annotations = Map::new();
		let mut path = Vec::new();
		let json = encode(value, &mut path, &mut annotations);

		let mut envelope = Map::new();
		envelope.insert("json".to_string(), json);
		if !annotations.is_empty() {
			let mut meta = Map::new();
			meta.insert("values".to_string(), Value::Object(annotations));
			envelope.insert("meta".to_string(), Value::Object(meta));
		}
		Value::Object(envelope)
	}

	fn deserialize(&self, value: Value) -> Result<RichValue, TransformError> {
		let Value::Object(mut envelope) = value else {
			return Err(TransformError::Envelope(format!("expected object, got {}", json_kind(&value))));
		};

		// An absent `json` member is how an `undefined` result travels.
		let Some(json) = envelope.remove("json") else {
			return Ok(RichValue::Undefined);
		};

		let mut annotations = Vec::new();
		if let Some(meta) = envelope.remove("meta") {
			let values = meta.get("values").cloned().unwrap_or(Value::Null);
			match values {
				Value::Object(map) => {
					for (path, kinds) in map {
						let kind = annotation_kind(&path, &kinds)?;
						annotations.push((split_path(&path), path, kind));
					}
				}
				Value::Null => {}
				other => {
					return Err(TransformError::Envelope(format!(
						"meta.values must be an object, got {}",
						json_kind(&other)
					)));
				}
			}
		}

		// Deepest first so a map's entries are restored before the map itself.
		annotations.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

		let mut root = RichValue::from(json);
		for (segments, path, kind) in annotations {
			let node = resolve_mut(&mut root, &segments).ok_or_else(|| TransformError::Path(path.clone()))?;
			let taken = std::mem::replace(node, RichValue::Null);
			*node = restore(taken, &kind, &path)?;
		}
		Ok(root)
	}

	fn name(&self) -> &'static str {
		"rich-json"
	}
}

fn encode(value: &RichValue, path: &mut Vec<String>, annotations: &mut Map<String, Value>) -> Value {
	let mut annotate = |kind: &str, path: &[String]| {
		annotations.insert(join_path(path), Value::Array(vec![Value::String(kind.to_string())]));
	};

	match value {
		RichValue::Undefined => {
			annotate(UNDEFINED, path);
			Value::Null
		}
		RichValue::BigInt(n) => {
			annotate(BIGINT, path);
			Value::String(n.to_string())
		}
		RichValue::Date(d) => {
			annotate(DATE, path);
			Value::String(format_date(d))
		}
		RichValue::RegExp { source, flags } => {
			annotate(REGEXP, path);
			Value::String(format!("/{source}/{flags}"))
		}
		RichValue::Float(f) if !f.is_finite() => {
			annotate(NUMBER, path);
			Value::String(non_finite_literal(*f).to_string())
		}
		RichValue::Set(items) => {
			annotate(SET, path);
			encode_items(items, path, annotations)
		}
		RichValue::Map(entries) => {
			annotate(MAP, path);
			let mut out = Vec::with_capacity(entries.len());
			for (index, (key, val)) in entries.iter().enumerate() {
				path.push(index.to_string());
				path.push("0".to_string());
				let key = encode(key, path, annotations);
				path.pop();
				path.push("1".to_string());
				let val = encode(val, path, annotations);
				path.pop();
				path.pop();
				out.push(Value::Array(vec![key, val]));
			}
			Value::Array(out)
		}
		RichValue::Array(items) => encode_items(items, path, annotations),
		RichValue::Object(fields) => {
			let mut out = Map::new();
			for (key, val) in fields {
				path.push(key.clone());
				out.insert(key.clone(), encode(val, path, annotations));
				path.pop();
			}
			Value::Object(out)
		}
		RichValue::Null | RichValue::Bool(_) | RichValue::Int(_) | RichValue::Float(_) | RichValue::String(_) => value.to_plain_json(),
	}
}

fn encode_items(items: &[RichValue], path: &mut Vec<String>, annotations: &mut Map<String, Value>) -> Value {
	let mut out = Vec::with_capacity(items.len());
	for (index, item) in items.iter().enumerate() {
		path.push(index.to_string());
		out.push(encode(item, path, annotations));
		path.pop();
	}
	Value::Array(out)
}

fn restore(node: RichValue, kind: &str, path: &str) -> Result<RichValue, TransformError> {
	let invalid = |kind: &'static str, node: &RichValue| TransformError::InvalidLiteral {
		kind,
		path: path.to_string(),
		value: node.to_plain_json().to_string(),
	};

	match kind {
		UNDEFINED => Ok(RichValue::Undefined),
		DATE => match &node {
			RichValue::String(s) => DateTime::parse_from_rfc3339(s)
				.map(|d| RichValue::Date(d.with_timezone(&Utc)))
				.map_err(|_| invalid("date", &node)),
			_ => Err(invalid("date", &node)),
		},
		BIGINT => match &node {
			RichValue::String(s) => s.parse::<i128>().map(RichValue::BigInt).map_err(|_| invalid("bigint", &node)),
			RichValue::Int(n) => Ok(RichValue::BigInt(i128::from(*n))),
			_ => Err(invalid("bigint", &node)),
		},
		NUMBER => match node.as_str() {
			Some("NaN") => Ok(RichValue::Float(f64::NAN)),
			Some("Infinity") => Ok(RichValue::Float(f64::INFINITY)),
			Some("-Infinity") => Ok(RichValue::Float(f64::NEG_INFINITY)),
			_ => Err(invalid("number", &node)),
		},
		REGEXP => match &node {
			RichValue::String(s) if s.starts_with('/') => match s.rfind('/') {
				Some(end) if end > 0 => Ok(RichValue::RegExp {
					source: s[1..end].to_string(),
					flags: s[end + 1..].to_string(),
				}),
				_ => Err(invalid("regexp", &node)),
			},
			_ => Err(invalid("regexp", &node)),
		},
		SET => match node {
			RichValue::Array(items) => Ok(RichValue::Set(items)),
			other => Err(invalid("set", &other)),
		},
		MAP => match node {
			RichValue::Array(items) => {
				let mut entries = Vec::with_capacity(items.len());
				for item in items {
					match item {
						RichValue::Array(mut pair) if pair.len() == 2 => {
							let val = pair.pop().unwrap_or(RichValue::Undefined);
							let key = pair.pop().unwrap_or(RichValue::Undefined);
							entries.push((key, val));
						}
						other => return Err(invalid("map entry", &other)),
					}
				}
				Ok(RichValue::Map(entries))
			}
			other => Err(invalid("map", &other)),
		},
		other => Err(TransformError::UnknownAnnotation {
			kind: other.to_string(),
			path: path.to_string(),
		}),
	}
}

fn annotation_kind(path: &str, kinds: &Value) -> Result<String, TransformError> {
	match kinds {
		Value::Array(items) => match items.first() {
			Some(Value::String(kind)) => Ok(kind.clone()),
			_ => Err(TransformError::Envelope(format!("annotation at '{path}' has no kind"))),
		},
		Value::String(kind) => Ok(kind.clone()),
		other => Err(TransformError::Envelope(format!(
			"annotation at '{path}' must be an array, got {}",
			json_kind(other)
		))),
	}
}

fn resolve_mut<'a>(root: &'a mut RichValue, segments: &[String]) -> Option<&'a mut RichValue> {
	let mut node = root;
	for segment in segments {
		node = match node {
			RichValue::Array(items) => items.get_mut(segment.parse::<usize>().ok()?)?,
			RichValue::Object(fields) => fields.get_mut(segment.as_str())?,
			_ => return None,
		};
	}
	Some(node)
}

const EMPTY_SEGMENT: &str = "\\0";

fn join_path(segments: &[String]) -> String {
	let mut out = String::new();
	for (i, segment) in segments.iter().enumerate() {
		if i > 0 {
			out.push('.');
		}
		if segment.is_empty() {
			out.push_str(EMPTY_SEGMENT);
			continue;
		}
		for c in segment.chars() {
			if c == '.' || c == '\\' {
				out.push('\\');
			}
			out.push(c);
		}
	}
	out
}

fn split_path(path: &str) -> Vec<String> {
	if path.is_empty() {
		return Vec::new();
	}
	let mut segments = Vec::new();
	let mut current = String::new();
	let mut chars = path.chars();
	while let Some(c) = chars.next() {
		match c {
			'\\' => match chars.next() {
				Some('0') | None => {}
				Some(escaped) => current.push(escaped),
			},
			'.' => segments.push(std::mem::take(&mut current)),
			_ => current.push(c),
		}
	}
	segments.push(current);
	segments
}

fn json_kind(value: &Value) -> &'static str {
	match value {
		Value::Null => "null",
		Value::Bool(_) => "bool",
		Value::Number(_) => "number",
		Value::String(_) => "string",
		Value::Array(_) => "array",
		Value::Object(_) => "object",
	}
}
