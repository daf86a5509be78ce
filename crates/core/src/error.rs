use tether_protocol::TransformError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
	/// The server needs a base URL and the environment does not provide one.
	#[error("missing configuration: environment variable {key} is not set")]
	MissingConfig { key: String },

	/// `use_remote()` was called with no mounted provider above it.
	#[error("remote client requested outside of a mounted provider")]
	OutsideMount,

	#[error("invalid provider configuration")]
	Config(#[source] serde_json::Error),

	#[error(transparent)]
	Json(#[from] serde_json::Error),

	#[error(transparent)]
	Transform(#[from] TransformError),

	#[error(transparent)]
	Runtime(#[from] tether_runtime::Error),
}

impl Error {
	/// The transport error behind this one, if any.
	pub fn runtime(&self) -> Option<&tether_runtime::Error> {
		match self {
			Error::Runtime(err) => Some(err),
			_ => None,
		}
	}
}
