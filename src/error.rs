//! Crate-level error types shared by the token manager, the API client, and stores.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Token store failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem; fatal and never retried.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// The token endpoint was unreachable or returned no usable token.
	#[error(transparent)]
	AuthExchange(#[from] AuthExchangeError),
	/// Transport failure while calling the API itself.
	#[error("Network error occurred while calling the API: {0}")]
	Network(#[source] TransportError),

	/// The API answered with a non-JSON payload.
	#[error("API did not return JSON (status {status}, content type {content_type:?}).")]
	NonJsonResponse {
		/// HTTP status code of the offending response.
		status: u16,
		/// Raw `Content-Type` header value, if any.
		content_type: Option<String>,
		/// Response body, untouched.
		body: Vec<u8>,
	},
	/// The API rejected the credentials and no retry budget remained.
	#[error("API rejected the access token with status {status}.")]
	Unauthorized {
		/// HTTP status code (401).
		status: u16,
		/// Response body, untouched.
		body: Vec<u8>,
	},
}

/// Configuration and validation failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// Client credentials are missing or malformed.
	#[error("Client credentials are invalid.")]
	InvalidCredentials(#[from] crate::auth::CredentialsError),
	/// Endpoint configuration is invalid.
	#[error("Endpoint configuration is invalid.")]
	InvalidEndpoints(#[from] crate::config::EndpointsError),
	/// An OAuth endpoint could not be handed to the `oauth2` client.
	#[error("OAuth endpoint URL is invalid.")]
	InvalidOAuthUrl {
		/// Underlying parsing failure.
		#[source]
		source: oauth2::url::ParseError,
	},
	/// Request target cannot be resolved against the API origin.
	#[error("Request URI `{uri}` cannot be resolved against the API origin.")]
	InvalidUri {
		/// Caller-supplied target.
		uri: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// A header name or value supplied by the caller is invalid.
	#[error("Header `{name}` is invalid.")]
	InvalidHeader {
		/// Offending header name.
		name: String,
	},
	/// Request body could not be serialized into JSON.
	#[error("Request body could not be serialized into JSON.")]
	BodySerialization(#[source] serde_json::Error),
	/// Requested scopes cannot be normalized.
	#[error("Requested scopes are invalid.")]
	InvalidScope(#[from] crate::auth::ScopeValidationError),
	/// Both a refresh token and a scope were configured; the exchange accepts only one.
	#[error("A refresh token and a scope cannot both be supplied to the token exchange.")]
	ScopeWithRefreshToken,
	/// Revocation needs a token but none was named or held.
	#[error("No token is available to revoke.")]
	NoTokenToRevoke,
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Coarse classification of a token endpoint rejection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionKind {
	/// The refresh token or authorization code was rejected.
	InvalidGrant,
	/// Client authentication failed.
	InvalidClient,
	/// Requested scopes are invalid or exceed what the app may request.
	InvalidScope,
	/// Failure is temporary; a later attempt may succeed.
	Transient,
}
impl RejectionKind {
	/// Classifies a rejection from the OAuth `error` code, the free-form reason, and finally
	/// the HTTP status.
	pub fn classify(status: u16, error: Option<&str>, reason: Option<&str>) -> Self {
		error
			.and_then(match_exact_code)
			.or_else(|| reason.and_then(match_exact_code))
			.or_else(|| reason.and_then(match_reason_text))
			.unwrap_or_else(|| classify_status(status))
	}
}

/// Failures raised while exchanging credentials for a token.
#[derive(Debug, ThisError)]
pub enum AuthExchangeError {
	/// The token endpoint could not be reached.
	#[error("Token endpoint is unreachable: {0}")]
	Transport(#[source] TransportError),
	/// The token endpoint answered with a non-success status.
	#[error("Token endpoint rejected the exchange with status {status}: {message}.")]
	Rejected {
		/// HTTP status code.
		status: u16,
		/// Classified failure kind.
		kind: RejectionKind,
		/// Provider-supplied message (OAuth `error_description`, `reason`, or body preview).
		message: String,
	},
	/// The token endpoint responded with an empty body.
	#[error("Token endpoint returned an empty body (status {status}).")]
	EmptyBody {
		/// HTTP status code.
		status: u16,
	},
	/// The token endpoint responded with malformed JSON.
	#[error("Token endpoint returned malformed JSON.")]
	Parse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// The token endpoint answered without an access token.
	#[error("Token endpoint response did not contain an access token.")]
	MissingAccessToken,
	/// The exchange this call queued behind failed; its failure is shared instead of repeated.
	#[error("A concurrent token exchange failed: {message}")]
	Coalesced {
		/// HTTP status of the shared failure, when one was observed.
		status: Option<u16>,
		/// Classification of the shared rejection, when the endpoint answered.
		kind: Option<RejectionKind>,
		/// Rendered shared failure.
		message: String,
	},
	/// The `state` returned to the redirect handler does not match the session.
	#[error("Authorization state mismatch.")]
	StateMismatch,
	/// The `oauth2` client reported an unexpected condition.
	#[error("Token endpoint returned an unexpected response: {message}.")]
	Unexpected {
		/// Description of the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
}
impl AuthExchangeError {
	/// HTTP status associated with the failure, when one was observed.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Rejected { status, .. } | Self::EmptyBody { status } => Some(*status),
			Self::Parse { status, .. }
			| Self::Unexpected { status, .. }
			| Self::Coalesced { status, .. } => *status,
			Self::Transport(_) | Self::MissingAccessToken | Self::StateMismatch => None,
		}
	}
}

/// Transport-level failures (network, IO, timeouts).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// The call exceeded the configured timeout.
	#[error("Request timed out.")]
	Timeout {
		/// Transport-specific timeout error.
		#[source]
		source: BoxError,
	},
	/// Underlying HTTP client reported a network failure.
	#[error("Network failure.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O failure.")]
	Io(#[from] std::io::Error),
	/// The transport could not turn the request into a wire request.
	#[error("Request could not be built by the transport.")]
	InvalidRequest {
		/// Transport-specific builder error.
		#[source]
		source: BoxError,
	},
	/// Transport failure that carries only a message.
	#[error("HTTP client error: {message}.")]
	Other {
		/// Description of the failure.
		message: String,
	},
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}

	/// Wraps a transport-specific timeout error.
	pub fn timeout(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Timeout { source: Box::new(src) }
	}

	/// Returns `true` for timeouts.
	pub fn is_timeout(&self) -> bool {
		matches!(self, Self::Timeout { .. })
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		if e.is_timeout() {
			Self::timeout(e)
		} else if e.is_builder() {
			Self::InvalidRequest { source: Box::new(e) }
		} else {
			Self::network(e)
		}
	}
}

fn match_exact_code(value: &str) -> Option<RejectionKind> {
	if value.eq_ignore_ascii_case("invalid_grant") || value.eq_ignore_ascii_case("access_denied") {
		Some(RejectionKind::InvalidGrant)
	} else if value.eq_ignore_ascii_case("invalid_client")
		|| value.eq_ignore_ascii_case("unauthorized_client")
	{
		Some(RejectionKind::InvalidClient)
	} else if value.eq_ignore_ascii_case("invalid_scope")
		|| value.eq_ignore_ascii_case("insufficient_scope")
	{
		Some(RejectionKind::InvalidScope)
	} else if value.eq_ignore_ascii_case("temporarily_unavailable")
		|| value.eq_ignore_ascii_case("server_error")
	{
		Some(RejectionKind::Transient)
	} else {
		None
	}
}

fn match_reason_text(reason: &str) -> Option<RejectionKind> {
	let lowered = reason.to_ascii_lowercase();

	match lowered.as_str() {
		text if text.contains("invalid_grant") || text.contains("invalid token") =>
			Some(RejectionKind::InvalidGrant),
		text if text.contains("invalid_client") || text.contains("invalid client") =>
			Some(RejectionKind::InvalidClient),
		text if text.contains("scope") => Some(RejectionKind::InvalidScope),
		text if text.contains("temporarily_unavailable") || text.contains("retry") =>
			Some(RejectionKind::Transient),
		_ => None,
	}
}

fn classify_status(status: u16) -> RejectionKind {
	match status {
		400 | 404 | 410 => RejectionKind::InvalidGrant,
		401 => RejectionKind::InvalidClient,
		403 => RejectionKind::InvalidScope,
		_ => RejectionKind::Transient,
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn classification_prefers_oauth_error_code() {
		assert_eq!(
			RejectionKind::classify(400, Some("invalid_client"), Some("whatever")),
			RejectionKind::InvalidClient
		);
		assert_eq!(
			RejectionKind::classify(500, None, Some("invalid_grant: code already used")),
			RejectionKind::InvalidGrant
		);
	}

	#[test]
	fn classification_reads_zoom_reason_text() {
		assert_eq!(
			RejectionKind::classify(400, Some("invalid_request"), Some("Invalid Token!")),
			RejectionKind::InvalidGrant
		);
		assert_eq!(
			RejectionKind::classify(400, None, Some("Invalid client_id or client_secret")),
			RejectionKind::InvalidClient
		);
	}

	#[test]
	fn classification_falls_back_to_status() {
		assert_eq!(RejectionKind::classify(401, None, None), RejectionKind::InvalidClient);
		assert_eq!(RejectionKind::classify(403, None, None), RejectionKind::InvalidScope);
		assert_eq!(RejectionKind::classify(429, None, None), RejectionKind::Transient);
		assert_eq!(RejectionKind::classify(503, None, None), RejectionKind::Transient);
	}

	#[test]
	fn exchange_error_reports_status() {
		let err = AuthExchangeError::Rejected {
			status: 400,
			kind: RejectionKind::InvalidGrant,
			message: "Invalid Token!".into(),
		};

		assert_eq!(err.status(), Some(400));
		assert_eq!(AuthExchangeError::MissingAccessToken.status(), None);

		let top: Error = err.into();

		assert!(matches!(top, Error::AuthExchange(AuthExchangeError::Rejected { .. })));
		assert!(top.to_string().contains("Invalid Token!"));
	}
}
