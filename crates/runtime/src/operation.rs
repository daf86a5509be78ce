//! A single remote procedure call travelling down the link chain.

use std::sync::atomic::{AtomicU64, Ordering};

use tether_protocol::{ProcedureType, RichValue};

/// Unique identifier for an operation.
pub type OperationId = u64;

static NEXT_OPERATION_ID: AtomicU64 = AtomicU64::new(1);

/// Returns a new process-unique operation ID.
pub fn next_operation_id() -> OperationId {
	NEXT_OPERATION_ID.fetch_add(1, Ordering::Relaxed)
}

/// One call: procedure kind, dotted path, and input.
#[derive(Debug, Clone)]
pub struct Operation {
	pub id: OperationId,
	pub kind: ProcedureType,
	/// Dotted procedure path (e.g., `"post.byId"`).
	pub path: String,
	pub input: RichValue,
}

impl Operation {
	pub fn new(kind: ProcedureType, path: impl Into<String>, input: RichValue) -> Self {
		Self {
			id: next_operation_id(),
			kind,
			path: path.into(),
			input,
		}
	}

	pub fn query(path: impl Into<String>, input: RichValue) -> Self {
		Self::new(ProcedureType::Query, path, input)
	}

	pub fn mutation(path: impl Into<String>, input: RichValue) -> Self {
		Self::new(ProcedureType::Mutation, path, input)
	}

	pub fn subscription(path: impl Into<String>, input: RichValue) -> Self {
		Self::new(ProcedureType::Subscription, path, input)
	}
}
