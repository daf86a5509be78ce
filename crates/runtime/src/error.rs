//! Error types for the tether runtime.

use serde_json::Value;
use tether_protocol::{ErrorShape, TransformError};
use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while sending an operation.
#[derive(Debug, Error)]
pub enum Error {
	/// The request never produced an HTTP response.
	#[error("Transport error: {0}")]
	Transport(String),

	/// The server answered with a status and a body that is not a batch response.
	#[error("HTTP {status}: {body}")]
	Http { status: u16, body: String },

	/// The server reported an error for this call.
	#[error("{name}: {message}")]
	Remote {
		/// Symbolic code (e.g., "NOT_FOUND", "UNAUTHORIZED")
		name: String,
		/// Human-readable error message
		message: String,
		/// Numeric JSON-RPC style code
		code: i32,
		/// HTTP status the server associated with the error
		http_status: Option<u16>,
		/// Server-side stack trace (if exposed)
		stack: Option<String>,
		/// Full decoded error payload
		payload: Value,
	},

	/// The response did not follow the batch protocol.
	#[error("Protocol error: {0}")]
	Protocol(String),

	/// A body could not be decoded by the transformer.
	#[error("Transform error: {0}")]
	Transform(#[from] TransformError),

	/// JSON serialization/deserialization error.
	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),

	/// The link dropped the call before answering.
	#[error("Channel closed unexpectedly")]
	ChannelClosed,

	/// The link chain ended without a link that sends the operation.
	#[error("No terminating link handled '{path}'")]
	NoTerminatingLink { path: String },

	/// The link cannot carry this kind of operation.
	#[error("{kind} '{path}' is not supported by {link}")]
	UnsupportedOperation {
		kind: &'static str,
		path: String,
		link: &'static str,
	},

	/// The batch flush needs a tokio runtime.
	#[error("No tokio runtime available to dispatch '{path}'")]
	NoRuntime { path: String },

	/// The endpoint URL cannot be used for an HTTP request.
	#[error("Invalid URL '{url}': {reason}")]
	InvalidUrl { url: String, reason: String },
}

impl Error {
	/// Builds a [`Error::Remote`] from a decoded server error.
	pub fn from_shape(shape: ErrorShape, payload: Value) -> Self {
		let name = shape.code_name().to_string();
		let (http_status, stack) = match shape.data {
			Some(data) => (data.http_status, data.stack),
			None => (None, None),
		};
		Error::Remote {
			name,
			message: shape.message,
			code: shape.code,
			http_status,
			stack,
			payload,
		}
	}

	/// Returns the symbolic code if this is a Remote error.
	pub fn error_name(&self) -> Option<&str> {
		match self {
			Error::Remote { name, .. } => Some(name),
			_ => None,
		}
	}

	/// Numeric code if this is a Remote error.
	pub fn error_code(&self) -> Option<i32> {
		match self {
			Error::Remote { code, .. } => Some(*code),
			_ => None,
		}
	}

	/// HTTP status associated with this error, if any.
	pub fn http_status(&self) -> Option<u16> {
		match self {
			Error::Http { status, .. } => Some(*status),
			Error::Remote { http_status, .. } => *http_status,
			_ => None,
		}
	}

	/// Returns the stack trace if this is a Remote error with a stack.
	pub fn stack_trace(&self) -> Option<&str> {
		match self {
			Error::Remote { stack, .. } => stack.as_deref(),
			_ => None,
		}
	}

	/// Returns true if the server reported the procedure or resource as missing.
	pub fn is_not_found(&self) -> bool {
		self.error_name() == Some("NOT_FOUND") || self.http_status() == Some(404)
	}

	/// Returns true if the server rejected the caller's credentials.
	pub fn is_unauthorized(&self) -> bool {
		self.error_name() == Some("UNAUTHORIZED") || self.http_status() == Some(401)
	}

	/// Returns true if this is a timeout error.
	pub fn is_timeout(&self) -> bool {
		match self {
			Error::Remote { name, .. } => name == "TIMEOUT",
			Error::Http { status, .. } => *status == 408 || *status == 504,
			_ => false,
		}
	}

	/// Copies a batch-wide failure for each call in the batch.
	///
	/// Variants holding non-clonable sources are flattened to their message.
	pub(crate) fn replicate(&self) -> Error {
		match self {
			Error::Transport(msg) => Error::Transport(msg.clone()),
			Error::Http { status, body } => Error::Http {
				status: *status,
				body: body.clone(),
			},
			Error::Remote {
				name,
				message,
				code,
				http_status,
				stack,
				payload,
			} => Error::Remote {
				name: name.clone(),
				message: message.clone(),
				code: *code,
				http_status: *http_status,
				stack: stack.clone(),
				payload: payload.clone(),
			},
			Error::Protocol(msg) => Error::Protocol(msg.clone()),
			Error::Transform(err) => Error::Transform(err.clone()),
			Error::InvalidUrl { url, reason } => Error::InvalidUrl {
				url: url.clone(),
				reason: reason.clone(),
			},
			other => Error::Transport(other.to_string()),
		}
	}
}
