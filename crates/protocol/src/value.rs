//! Values that keep their kind across the wire.
//!
//! Plain JSON cannot tell a date from a string, a map from a list of pairs,
//! or `undefined` from `null`. [`RichValue`] models those kinds explicitly so
//! a [`Transformer`](crate::Transformer) can annotate them and the other side
//! can restore them.
//!
//! | Kind | Plain JSON form (lossy) |
//! |------|-------------------------|
//! | `Undefined` | `null` |
//! | `BigInt` | decimal string |
//! | `Date` | RFC 3339 string |
//! | `RegExp` | `"/source/flags"` |
//! | `Map` | `[[key, value], ...]` |
//! | `Set` | `[item, ...]` |
//! | non-finite `Float` | `"NaN"`, `"Infinity"`, `"-Infinity"` |

use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use serde_json::{Map, Number, Value};

/// A value that may carry kinds beyond the JSON primitives.
#[derive(Debug, Clone, PartialEq)]
pub enum RichValue {
	Null,
	Undefined,
	Bool(bool),
	Int(i64),
	Float(f64),
	/// Integer outside the range a JSON number carries safely.
	BigInt(i128),
	String(String),
	Date(DateTime<Utc>),
	RegExp {
		source: String,
		flags: String,
	},
	Array(Vec<RichValue>),
	/// String-keyed record, insertion ordered.
	Object(IndexMap<String, RichValue>),
	/// Arbitrary-keyed map, insertion ordered.
	Map(Vec<(RichValue, RichValue)>),
	Set(Vec<RichValue>),
}

impl RichValue {
	/// Creates an empty object.
	pub fn object() -> Self {
		RichValue::Object(IndexMap::new())
	}

	/// Inserts a field when `self` is an object; returns `self` for chaining.
	///
	/// Non-object values are returned unchanged.
	pub fn with_field(mut self, key: impl Into<String>, value: impl Into<RichValue>) -> Self {
		if let RichValue::Object(fields) = &mut self {
			fields.insert(key.into(), value.into());
		}
		self
	}

	/// Short name of the value's kind, used in logs and error messages.
	pub fn kind(&self) -> &'static str {
		match self {
			RichValue::Null => "null",
			RichValue::Undefined => "undefined",
			RichValue::Bool(_) => "bool",
			RichValue::Int(_) => "int",
			RichValue::Float(_) => "float",
			RichValue::BigInt(_) => "bigint",
			RichValue::String(_) => "string",
			RichValue::Date(_) => "date",
			RichValue::RegExp { .. } => "regexp",
			RichValue::Array(_) => "array",
			RichValue::Object(_) => "object",
			RichValue::Map(_) => "map",
			RichValue::Set(_) => "set",
		}
	}

	/// Looks up a field of an object value.
	pub fn get(&self, key: &str) -> Option<&RichValue> {
		match self {
			RichValue::Object(fields) => fields.get(key),
			_ => None,
		}
	}

	pub fn as_str(&self) -> Option<&str> {
		match self {
			RichValue::String(s) => Some(s),
			_ => None,
		}
	}

	pub fn as_i64(&self) -> Option<i64> {
		match self {
			RichValue::Int(n) => Some(*n),
			RichValue::BigInt(n) => i64::try_from(*n).ok(),
			_ => None,
		}
	}

	pub fn as_date(&self) -> Option<&DateTime<Utc>> {
		match self {
			RichValue::Date(d) => Some(d),
			_ => None,
		}
	}

	/// Returns true for `null` and `undefined`.
	pub fn is_nullish(&self) -> bool {
		matches!(self, RichValue::Null | RichValue::Undefined)
	}

	/// Converts to plain JSON, degrading rich kinds to their JSON form.
	///
	/// This is what typed (`serde`) callers see: dates become RFC 3339
	/// strings, which `chrono`'s serde support parses back.
	pub fn to_plain_json(&self) -> Value {
		match self {
			RichValue::Null | RichValue::Undefined => Value::Null,
			RichValue::Bool(b) => Value::Bool(*b),
			RichValue::Int(n) => Value::Number((*n).into()),
			RichValue::Float(f) => match Number::from_f64(*f) {
				Some(n) => Value::Number(n),
				None => Value::String(non_finite_literal(*f).to_string()),
			},
			RichValue::BigInt(n) => Value::String(n.to_string()),
			RichValue::String(s) => Value::String(s.clone()),
			RichValue::Date(d) => Value::String(format_date(d)),
			RichValue::RegExp { source, flags } => Value::String(format!("/{source}/{flags}")),
			RichValue::Array(items) | RichValue::Set(items) => Value::Array(items.iter().map(RichValue::to_plain_json).collect()),
			RichValue::Object(fields) => Value::Object(fields.iter().map(|(k, v)| (k.clone(), v.to_plain_json())).collect::<Map<_, _>>()),
			RichValue::Map(entries) => Value::Array(
				entries
					.iter()
					.map(|(k, v)| Value::Array(vec![k.to_plain_json(), v.to_plain_json()]))
					.collect(),
			),
		}
	}
}

/// Formats a date the way it travels on the wire.
///
/// Sub-second digits are kept so a round trip is exact.
pub fn format_date(date: &DateTime<Utc>) -> String {
	date.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

pub(crate) fn non_finite_literal(f: f64) -> &'static str {
	if f.is_nan() {
		"NaN"
	} else if f.is_sign_positive() {
		"Infinity"
	} else {
		"-Infinity"
	}
}

impl From<Value> for RichValue {
	fn from(value: Value) -> Self {
		match value {
			Value::Null => RichValue::Null,
			Value::Bool(b) => RichValue::Bool(b),
			Value::Number(n) => match n.as_i64() {
				Some(i) => RichValue::Int(i),
				None => match n.as_u64() {
					Some(u) => RichValue::BigInt(i128::from(u)),
					None => RichValue::Float(n.as_f64().unwrap_or(f64::NAN)),
				},
			},
			Value::String(s) => RichValue::String(s),
			Value::Array(items) => RichValue::Array(items.into_iter().map(RichValue::from).collect()),
			Value::Object(fields) => RichValue::Object(fields.into_iter().map(|(k, v)| (k, RichValue::from(v))).collect()),
		}
	}
}

impl From<bool> for RichValue {
	fn from(b: bool) -> Self {
		RichValue::Bool(b)
	}
}

impl From<i64> for RichValue {
	fn from(n: i64) -> Self {
		RichValue::Int(n)
	}
}

impl From<i32> for RichValue {
	fn from(n: i32) -> Self {
		RichValue::Int(n.into())
	}
}

impl From<f64> for RichValue {
	fn from(f: f64) -> Self {
		RichValue::Float(f)
	}
}

impl From<i128> for RichValue {
	fn from(n: i128) -> Self {
		RichValue::BigInt(n)
	}
}

impl From<&str> for RichValue {
	fn from(s: &str) -> Self {
		RichValue::String(s.to_string())
	}
}

impl From<String> for RichValue {
	fn from(s: String) -> Self {
		RichValue::String(s)
	}
}

impl From<DateTime<Utc>> for RichValue {
	fn from(d: DateTime<Utc>) -> Self {
		RichValue::Date(d)
	}
}

impl<T: Into<RichValue>> From<Vec<T>> for RichValue {
	fn from(items: Vec<T>) -> Self {
		RichValue::Array(items.into_iter().map(Into::into).collect())
	}
}

impl<T: Into<RichValue>> From<Option<T>> for RichValue {
	fn from(value: Option<T>) -> Self {
		value.map_or(RichValue::Undefined, Into::into)
	}
}

#[cfg(test)]
mod tests {
	use chrono::TimeZone;
	use serde_json::json;

	use super::*;

	#[test]
	fn accessors_match_only_their_kind() {
		let when = Utc.with_ymd_and_hms(2022, 5, 6, 7, 8, 9).unwrap();
		assert_eq!(RichValue::Date(when).as_date(), Some(&when));
		assert_eq!(RichValue::from("2022-05-06T07:08:09Z").as_date(), None);

		assert!(RichValue::Null.is_nullish());
		assert!(RichValue::Undefined.is_nullish());
		assert!(!RichValue::Bool(false).is_nullish());
		assert!(!RichValue::Int(0).is_nullish());
	}

	#[test]
	fn plain_json_converts_numbers_by_range() {
		assert_eq!(RichValue::from(json!(42)), RichValue::Int(42));
		assert_eq!(RichValue::from(json!(1.5)), RichValue::Float(1.5));
		assert_eq!(RichValue::from(json!(u64::MAX)), RichValue::BigInt(i128::from(u64::MAX)));
	}

	#[test]
	fn plain_json_degrades_rich_kinds() {
		let when = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
		let value = RichValue::object()
			.with_field("at", when)
			.with_field("big", RichValue::BigInt(1 << 80))
			.with_field("gone", RichValue::Undefined)
			.with_field("tags", RichValue::Set(vec!["a".into(), "b".into()]));

		assert_eq!(
			value.to_plain_json(),
			json!({
				"at": "2024-03-01T12:30:00Z",
				"big": (1i128 << 80).to_string(),
				"gone": null,
				"tags": ["a", "b"],
			})
		);
	}

	#[test]
	fn non_finite_floats_become_literals() {
		assert_eq!(RichValue::Float(f64::NAN).to_plain_json(), json!("NaN"));
		assert_eq!(RichValue::Float(f64::NEG_INFINITY).to_plain_json(), json!("-Infinity"));
	}

	#[test]
	fn with_field_ignores_non_objects() {
		assert_eq!(RichValue::Int(1).with_field("a", 2i64), RichValue::Int(1));
	}

	#[test]
	fn option_none_is_undefined() {
		assert_eq!(RichValue::from(None::<i64>), RichValue::Undefined);
		assert_eq!(RichValue::from(Some(3i64)), RichValue::Int(3));
	}
}
