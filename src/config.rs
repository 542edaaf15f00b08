//! Endpoint and client configuration.
//!
//! Values arrive either through [`EndpointsBuilder`] or by deserializing a [`ClientConfig`]
//! from any serde format. Reading files or environment variables is left to the caller.

// self
use crate::_prelude::*;

/// Default production API origin.
pub const PRODUCTION_API_ORIGIN: &str = "https://api.zoom.us/v2/";
/// Default production OAuth base.
pub const PRODUCTION_AUTH_BASE: &str = "https://zoom.us/";

/// Errors raised while building [`Endpoints`].
#[derive(Debug, PartialEq, Eq, ThisError)]
pub enum EndpointsError {
	/// A configured endpoint string is not a URL.
	#[error("The {endpoint} endpoint is not a valid URL.")]
	InvalidUrl {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Endpoints must use HTTP(S).
	#[error("The {endpoint} endpoint must use http or https: {url}.")]
	UnsupportedScheme {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Endpoint URL that failed validation.
		url: String,
	},
	/// Endpoints must carry a host so relative paths can be joined onto them.
	#[error("The {endpoint} endpoint cannot serve as a base URL: {url}.")]
	NotABase {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Endpoint URL that failed validation.
		url: String,
	},
	/// The development environment was selected without development endpoints.
	#[error("The development environment requires explicit endpoints.")]
	MissingDevelopmentEndpoints,
}

/// Deployment environment selecting the endpoint set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
	/// Public production endpoints.
	#[default]
	Production,
	/// Caller-supplied development endpoints.
	Development,
}
impl FromStr for Environment {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"production" | "prod" => Ok(Self::Production),
			"development" | "dev" => Ok(Self::Development),
			other => Err(format!("Unknown environment `{other}`.")),
		}
	}
}

/// Wire format of the token exchange.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeMode {
	/// JSON body carrying `clientId`, `clientSecret`, and `refreshToken` or `scope`.
	#[default]
	Json,
	/// RFC 6749 form exchange with HTTP Basic client authentication.
	#[serde(rename = "oauth")]
	OAuth,
}

/// Validated endpoint set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Endpoints {
	api_origin: Url,
	auth_base: Url,
	token: Url,
	authorization: Url,
	revocation: Url,
}
impl Endpoints {
	/// Creates a builder seeded with nothing; unset values fall back to production defaults.
	pub fn builder() -> EndpointsBuilder {
		EndpointsBuilder::default()
	}

	/// Production endpoint set.
	pub fn production() -> Result<Self, EndpointsError> {
		Self::builder().build()
	}

	/// Origin that relative request targets are joined onto (for example
	/// `https://api.zoom.us/v2/`).
	pub fn api_origin(&self) -> &Url {
		&self.api_origin
	}

	/// Base of the OAuth endpoints.
	pub fn auth_base(&self) -> &Url {
		&self.auth_base
	}

	/// Token endpoint (`{auth_base}/oauth/token` unless overridden).
	pub fn token(&self) -> &Url {
		&self.token
	}

	/// Authorization endpoint (`{auth_base}/oauth/authorize` unless overridden).
	pub fn authorization(&self) -> &Url {
		&self.authorization
	}

	/// Revocation endpoint (`{auth_base}/oauth/revoke` unless overridden).
	pub fn revocation(&self) -> &Url {
		&self.revocation
	}
}

/// Builder for [`Endpoints`].
#[derive(Clone, Debug, Default)]
pub struct EndpointsBuilder {
	api_origin: Option<Url>,
	auth_base: Option<Url>,
	token: Option<Url>,
	authorization: Option<Url>,
	revocation: Option<Url>,
}
impl EndpointsBuilder {
	/// Sets the API origin.
	pub fn api_origin(mut self, url: Url) -> Self {
		self.api_origin = Some(url);

		self
	}

	/// Sets the OAuth base the token, authorize, and revoke paths derive from.
	pub fn auth_base(mut self, url: Url) -> Self {
		self.auth_base = Some(url);

		self
	}

	/// Overrides the token endpoint.
	pub fn token_endpoint(mut self, url: Url) -> Self {
		self.token = Some(url);

		self
	}

	/// Overrides the authorization endpoint.
	pub fn authorization_endpoint(mut self, url: Url) -> Self {
		self.authorization = Some(url);

		self
	}

	/// Overrides the revocation endpoint.
	pub fn revocation_endpoint(mut self, url: Url) -> Self {
		self.revocation = Some(url);

		self
	}

	/// Validates the configured URLs and derives the OAuth endpoints.
	pub fn build(self) -> Result<Endpoints, EndpointsError> {
		let api_origin = match self.api_origin {
			Some(url) => url,
			None => parse("api origin", PRODUCTION_API_ORIGIN)?,
		};
		let auth_base = match self.auth_base {
			Some(url) => url,
			None => parse("auth base", PRODUCTION_AUTH_BASE)?,
		};
		let api_origin = as_directory("api origin", api_origin)?;
		let auth_base = as_directory("auth base", auth_base)?;
		let token = derive("token", self.token, &auth_base, "oauth/token")?;
		let authorization =
			derive("authorization", self.authorization, &auth_base, "oauth/authorize")?;
		let revocation = derive("revocation", self.revocation, &auth_base, "oauth/revoke")?;

		Ok(Endpoints { api_origin, auth_base, token, authorization, revocation })
	}
}

/// Endpoint pair as it appears in configuration files.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
	/// API origin.
	pub api_origin: Url,
	/// OAuth base.
	pub auth_base: Url,
}

/// Deserializable client configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
	/// Selected environment.
	pub environment: Environment,
	/// Production endpoint override.
	pub production: Option<EndpointConfig>,
	/// Development endpoints; required when `environment` is `development`.
	pub development: Option<EndpointConfig>,
	/// Per-request timeout in seconds, applied to exchanges and API calls.
	pub timeout_secs: Option<u64>,
	/// `User-Agent` override for API calls.
	pub user_agent: Option<String>,
	/// Token exchange wire format.
	pub exchange_mode: ExchangeMode,
}
impl ClientConfig {
	/// Endpoint set for the selected environment.
	pub fn endpoints(&self) -> Result<Endpoints, EndpointsError> {
		let selected = match self.environment {
			Environment::Production => self.production.as_ref(),
			Environment::Development =>
				Some(self.development.as_ref().ok_or(EndpointsError::MissingDevelopmentEndpoints)?),
		};
		let builder = Endpoints::builder();

		match selected {
			Some(config) => builder
				.api_origin(config.api_origin.clone())
				.auth_base(config.auth_base.clone())
				.build(),
			None => builder.build(),
		}
	}

	/// Configured timeout.
	pub fn timeout(&self) -> Option<Duration> {
		self.timeout_secs.map(Duration::from_secs)
	}
}

fn parse(endpoint: &'static str, raw: &str) -> Result<Url, EndpointsError> {
	Url::parse(raw).map_err(|source| EndpointsError::InvalidUrl { endpoint, source })
}

fn validate(endpoint: &'static str, url: &Url) -> Result<(), EndpointsError> {
	if !matches!(url.scheme(), "http" | "https") {
		return Err(EndpointsError::UnsupportedScheme { endpoint, url: url.to_string() });
	}
	if url.cannot_be_a_base() || url.host().is_none() {
		return Err(EndpointsError::NotABase { endpoint, url: url.to_string() });
	}

	Ok(())
}

// A trailing slash makes `Url::join` append instead of replacing the last path segment.
fn as_directory(endpoint: &'static str, mut url: Url) -> Result<Url, EndpointsError> {
	validate(endpoint, &url)?;

	if !url.path().ends_with('/') {
		let path = format!("{}/", url.path());

		url.set_path(&path);
	}

	url.set_query(None);
	url.set_fragment(None);

	Ok(url)
}

fn derive(
	endpoint: &'static str,
	explicit: Option<Url>,
	base: &Url,
	path: &str,
) -> Result<Url, EndpointsError> {
	let url = match explicit {
		Some(url) => url,
		None => base.join(path).map_err(|source| EndpointsError::InvalidUrl { endpoint, source })?,
	};

	validate(endpoint, &url)?;

	Ok(url)
}
