//! Token endpoint response parsing.

// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, TokenSecret},
	error::{AuthExchangeError, RejectionKind},
};

const BODY_PREVIEW_LIMIT: usize = 256;

/// Raw token endpoint payload. Both snake_case and camelCase field names are accepted.
#[derive(Clone, Deserialize)]
pub struct AuthExchangeResult {
	/// Issued access token.
	#[serde(default, alias = "accessToken")]
	pub access_token: Option<TokenSecret>,
	/// Token type, normally `bearer`.
	#[serde(default, alias = "tokenType")]
	pub token_type: Option<String>,
	/// Rotated refresh token, when supplied.
	#[serde(default, alias = "refreshToken")]
	pub refresh_token: Option<TokenSecret>,
	/// Lifetime in seconds.
	#[serde(default, alias = "expiresIn")]
	pub expires_in: Option<u64>,
	/// Granted scopes.
	#[serde(default)]
	pub scope: Option<ScopeSet>,
}
impl AuthExchangeResult {
	/// Validates the payload into an [`IssuedToken`].
	pub fn into_issued(self) -> Result<IssuedToken, AuthExchangeError> {
		let access_token = self
			.access_token
			.filter(|token| !token.is_empty())
			.ok_or(AuthExchangeError::MissingAccessToken)?;

		Ok(IssuedToken {
			access_token,
			refresh_token: self.refresh_token.filter(|token| !token.is_empty()),
			expires_in: self.expires_in.map(Duration::from_secs),
			scope: self.scope,
			token_type: self.token_type,
		})
	}
}
impl Debug for AuthExchangeResult {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthExchangeResult")
			.field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
			.field("token_type", &self.token_type)
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("expires_in", &self.expires_in)
			.field("scope", &self.scope)
			.finish()
	}
}

/// Validated exchange outcome, independent of the wire format that produced it.
#[derive(Clone, Debug)]
pub struct IssuedToken {
	/// Issued access token.
	pub access_token: TokenSecret,
	/// Rotated refresh token, when supplied.
	pub refresh_token: Option<TokenSecret>,
	/// Lifetime relative to the moment the response arrived.
	pub expires_in: Option<Duration>,
	/// Granted scopes, when reported.
	pub scope: Option<ScopeSet>,
	/// Token type, when reported.
	pub token_type: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
	#[serde(default)]
	error: Option<String>,
	#[serde(default)]
	error_description: Option<String>,
	#[serde(default)]
	reason: Option<String>,
	#[serde(default)]
	message: Option<String>,
}

/// Interprets a token endpoint response.
///
/// Non-2xx statuses become [`AuthExchangeError::Rejected`]; a 2xx response must carry a JSON
/// body with a non-empty access token.
pub fn parse_token_response(status: u16, body: &[u8]) -> Result<IssuedToken, AuthExchangeError> {
	if !(200..300).contains(&status) {
		return Err(rejection(status, body));
	}
	if body.iter().all(u8::is_ascii_whitespace) {
		return Err(AuthExchangeError::EmptyBody { status });
	}

	let mut deserializer = serde_json::Deserializer::from_slice(body);
	let result: AuthExchangeResult = serde_path_to_error::deserialize(&mut deserializer)
		.map_err(|source| AuthExchangeError::Parse { source, status: Some(status) })?;

	result.into_issued()
}

pub(crate) fn rejection(status: u16, body: &[u8]) -> AuthExchangeError {
	let parsed = serde_json::from_slice::<ErrorBody>(body).ok();
	let (error, reason) = match &parsed {
		Some(parsed) => (
			parsed.error.as_deref(),
			parsed
				.error_description
				.as_deref()
				.or(parsed.reason.as_deref())
				.or(parsed.message.as_deref()),
		),
		None => (None, None),
	};
	let kind = RejectionKind::classify(status, error, reason);
	let message = reason.or(error).map(str::to_owned).unwrap_or_else(|| body_preview(body));

	AuthExchangeError::Rejected { status, kind, message }
}

fn body_preview(body: &[u8]) -> String {
	let text = String::from_utf8_lossy(body);
	let trimmed = text.trim();

	if trimmed.is_empty() {
		return "empty response body".into();
	}

	trimmed.chars().take(BODY_PREVIEW_LIMIT).collect()
}
