//! Validated OAuth client credentials.

// std
use std::ops::Deref;
// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD};
// self
use crate::{_prelude::*, auth::TokenSecret};

const CLIENT_ID_MAX_LEN: usize = 128;

/// Error returned when credential validation fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum CredentialsError {
	/// The client identifier was empty.
	#[error("Client identifier is missing.")]
	MissingClientId,
	/// The client secret was empty.
	#[error("Client secret is missing.")]
	MissingClientSecret,
	/// A credential contains whitespace characters.
	#[error("The {field} contains whitespace.")]
	ContainsWhitespace {
		/// Which credential failed validation.
		field: &'static str,
	},
	/// The client identifier exceeded the allowed character count.
	#[error("Client identifier exceeds {max} characters.")]
	TooLong {
		/// Maximum permitted character count.
		max: usize,
	},
}

/// OAuth client identifier issued by the app marketplace.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClientId(String);
impl ClientId {
	/// Creates a new identifier after validation.
	pub fn new(value: impl AsRef<str>) -> Result<Self, CredentialsError> {
		let view = value.as_ref();

		validate_client_id(view)?;

		Ok(Self(view.to_owned()))
	}
}
impl Deref for ClientId {
	type Target = str;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
impl AsRef<str> for ClientId {
	fn as_ref(&self) -> &str {
		&self.0
	}
}
impl From<ClientId> for String {
	fn from(value: ClientId) -> Self {
		value.0
	}
}
impl TryFrom<String> for ClientId {
	type Error = CredentialsError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		validate_client_id(&value)?;

		Ok(Self(value))
	}
}
impl Debug for ClientId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "ClientId({})", self.0)
	}
}
impl Display for ClientId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}

/// Immutable client id + secret pair required by every token exchange.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "RawCredentials")]
pub struct Credentials {
	/// Client identifier.
	pub client_id: ClientId,
	client_secret: TokenSecret,
}
impl Credentials {
	/// Validates and wraps the provided pair.
	pub fn new(
		client_id: impl AsRef<str>,
		client_secret: impl Into<String>,
	) -> Result<Self, CredentialsError> {
		let client_id = ClientId::new(client_id)?;
		let client_secret = client_secret.into();

		if client_secret.is_empty() {
			return Err(CredentialsError::MissingClientSecret);
		}
		if client_secret.chars().any(char::is_whitespace) {
			return Err(CredentialsError::ContainsWhitespace { field: "client secret" });
		}

		Ok(Self { client_id, client_secret: TokenSecret::new(client_secret) })
	}

	/// Returns the client secret. Callers must avoid logging this string.
	pub fn client_secret(&self) -> &str {
		self.client_secret.expose()
	}

	/// `Basic base64(client_id:client_secret)` header value.
	pub fn basic_authorization(&self) -> String {
		let raw = format!("{}:{}", self.client_id.as_ref(), self.client_secret.expose());

		format!("Basic {}", STANDARD.encode(raw))
	}
}
impl Debug for Credentials {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Credentials")
			.field("client_id", &self.client_id)
			.field("client_secret", &"<redacted>")
			.finish()
	}
}
impl TryFrom<RawCredentials> for Credentials {
	type Error = CredentialsError;

	fn try_from(raw: RawCredentials) -> Result<Self, Self::Error> {
		Self::new(raw.client_id, raw.client_secret)
	}
}

#[derive(Deserialize)]
struct RawCredentials {
	#[serde(alias = "clientId")]
	client_id: String,
	#[serde(alias = "clientSecret")]
	client_secret: String,
}

fn validate_client_id(view: &str) -> Result<(), CredentialsError> {
	if view.is_empty() {
		return Err(CredentialsError::MissingClientId);
	}
	if view.chars().any(char::is_whitespace) {
		return Err(CredentialsError::ContainsWhitespace { field: "client identifier" });
	}
	if view.len() > CLIENT_ID_MAX_LEN {
		return Err(CredentialsError::TooLong { max: CLIENT_ID_MAX_LEN });
	}

	Ok(())
}
