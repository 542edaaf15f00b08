//! Optional observability hooks for token exchanges and API calls.
//!
//! # Feature Flags
//!
//! - `tracing` wraps each operation in a span named `zoom_oauth2.op` with `op` and `stage`
//!   fields, and emits `debug` events for cache hits, coalesced exchanges, invalidations, and
//!   retries.
//! - `metrics` increments the `zoom_oauth2_operation_total` counter labeled by `op` and
//!   `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Operations observed by the crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
	/// Refresh or initial token exchange driven by `get_token`.
	TokenExchange,
	/// Authorization code exchange.
	AuthorizationCode,
	/// Token revocation.
	Revoke,
	/// Authenticated API request.
	ApiRequest,
}
impl Operation {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Operation::TokenExchange => "token_exchange",
			Operation::AuthorizationCode => "authorization_code",
			Operation::Revoke => "revoke",
			Operation::ApiRequest => "api_request",
		}
	}
}
impl Display for Operation {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded per operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpOutcome {
	/// Entry to the operation.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
	/// Served by an exchange another caller already completed.
	Coalesced,
	/// The operation is being repeated after an authentication failure.
	Retry,
}
impl OpOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OpOutcome::Attempt => "attempt",
			OpOutcome::Success => "success",
			OpOutcome::Failure => "failure",
			OpOutcome::Coalesced => "coalesced",
			OpOutcome::Retry => "retry",
		}
	}
}
impl Display for OpOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Emits a `debug` event when the `tracing` feature is enabled; compiles to nothing otherwise.
macro_rules! debug_event {
	($($arg:tt)+) => {{
		#[cfg(feature = "tracing")]
		::tracing::debug!($($arg)+);
	}};
}
pub(crate) use debug_event;
