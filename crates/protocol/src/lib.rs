//! Wire types for the tether remote client.
//!
//! This crate holds the pieces that define what crosses the network:
//!
//! - [`RichValue`]: values with kinds beyond the JSON primitives
//! - [`Transformer`]: symmetric body encoding ([`RichJson`], [`Identity`])
//! - batch envelope types ([`ResponseItem`], [`ErrorShape`], [`ProcedureType`])
//!
//! Types here do no I/O. The transport lives in `tether-runtime`.

pub mod envelope;
pub mod transformer;
pub mod value;

pub use envelope::{ErrorData, ErrorShape, ProcedureType, ResponseItem, ResultPayload, batch_input, codes};
pub use transformer::{Identity, RichJson, TransformError, Transformer};
pub use value::{RichValue, format_date};
