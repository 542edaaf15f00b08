//! Authenticated API client with a single retry after forced re-authentication.

pub mod request;
pub mod response;

pub use request::ApiRequest;
pub use response::{ApiResponse, ResponseBody, is_json_media_type};

// crates.io
use oauth2::{
	AsyncHttpClient, HttpRequest,
	http::{
		HeaderMap, HeaderName, HeaderValue, Method, Request,
		header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT},
	},
};
// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	config::ClientConfig,
	error::ConfigError,
	http::{HttpTransport, ResponseMetadataSlot},
	manager::TokenManager,
	oauth::{DefaultTransportErrorMapper, TransportErrorMapper},
	obs::{self, OpOutcome, OpSpan, Operation, debug_event},
};

/// `User-Agent` sent unless overridden.
pub const DEFAULT_USER_AGENT: &str = concat!("zoom-oauth2-rs/", env!("CARGO_PKG_VERSION"));

const JSON: &str = "application/json";
const UNAUTHORIZED: u16 = 401;

/// Issues authenticated requests against the API origin of its [`TokenManager`].
///
/// The client reuses the manager's transport and endpoints; any number of clients can share
/// one manager and therefore one token.
pub struct ApiClient<C, M = DefaultTransportErrorMapper>
where
	C: ?Sized + HttpTransport,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	tokens: Arc<TokenManager<C, M>>,
	default_headers: HeaderMap,
}
impl<C, M> ApiClient<C, M>
where
	C: ?Sized + HttpTransport,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a client with the default identifying, JSON content-type and accept headers.
	pub fn new(tokens: Arc<TokenManager<C, M>>) -> Self {
		let mut default_headers = HeaderMap::new();

		default_headers.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));
		default_headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON));
		default_headers.insert(ACCEPT, HeaderValue::from_static(JSON));

		Self { tokens, default_headers }
	}

	/// Creates a client that honors the `User-Agent` override of `config`.
	pub fn from_config(tokens: Arc<TokenManager<C, M>>, config: &ClientConfig) -> Result<Self> {
		let client = Self::new(tokens);

		match &config.user_agent {
			Some(user_agent) => client.default_header(USER_AGENT.as_str(), user_agent),
			None => Ok(client),
		}
	}

	/// Adds or replaces a header sent with every request.
	pub fn default_header(mut self, name: &str, value: &str) -> Result<Self> {
		let (name, value) = parse_header(name, value)?;

		self.default_headers.insert(name, value);

		Ok(self)
	}

	/// Token manager backing this client.
	pub fn tokens(&self) -> &Arc<TokenManager<C, M>> {
		&self.tokens
	}

	/// Headers merged under every request.
	pub fn default_headers(&self) -> &HeaderMap {
		&self.default_headers
	}

	/// Executes `request`. An unset `retry` means no retry.
	///
	/// A 401 with the retry enabled invalidates the token that was used, drops any
	/// `Authorization` header, and repeats the call once with a freshly exchanged token. A
	/// 401 without a retry left is [`Error::Unauthorized`]. Every other response must carry
	/// a JSON content type (or no payload at all).
	pub async fn request(&self, request: ApiRequest) -> Result<ApiResponse> {
		let retry = request.retry.unwrap_or(false);

		self.execute(request, retry).await
	}

	/// `GET` with the retry enabled unless the request disables it.
	pub async fn get(&self, request: ApiRequest) -> Result<ApiResponse> {
		self.send_as(Method::GET, request).await
	}

	/// `POST` with the retry enabled unless the request disables it.
	pub async fn post(&self, request: ApiRequest) -> Result<ApiResponse> {
		self.send_as(Method::POST, request).await
	}

	/// `PUT` with the retry enabled unless the request disables it.
	pub async fn put(&self, request: ApiRequest) -> Result<ApiResponse> {
		self.send_as(Method::PUT, request).await
	}

	/// `PATCH` with the retry enabled unless the request disables it.
	pub async fn patch(&self, request: ApiRequest) -> Result<ApiResponse> {
		self.send_as(Method::PATCH, request).await
	}

	/// `DELETE` with the retry enabled unless the request disables it.
	pub async fn delete(&self, request: ApiRequest) -> Result<ApiResponse> {
		self.send_as(Method::DELETE, request).await
	}

	async fn send_as(&self, method: Method, mut request: ApiRequest) -> Result<ApiResponse> {
		let retry = request.retry.unwrap_or(true);

		request.method = method;

		self.execute(request, retry).await
	}

	async fn execute(&self, mut request: ApiRequest, retry: bool) -> Result<ApiResponse> {
		let span = OpSpan::new(Operation::ApiRequest, "request");

		span.instrument(async move {
			let mut retries_left = u8::from(retry);
			let mut force = request.force_auth;
			let mut attempts = 0_u8;

			loop {
				attempts += 1;

				let url = self.resolve(&request.uri)?;
				let token = self.tokens.get_token(force).await?.access_token;
				let wire = self.build(&request, &url, &token)?;

				obs::record_outcome(Operation::ApiRequest, OpOutcome::Attempt);

				let response = match self.send(wire).await {
					Ok(response) => response,
					Err(err) => {
						obs::record_outcome(Operation::ApiRequest, OpOutcome::Failure);

						return Err(err);
					},
				};
				let status = response.status().as_u16();

				if status == UNAUTHORIZED {
					if retries_left > 0 {
						retries_left -= 1;

						self.tokens.invalidate_token(Some(token.expose()));
						request.remove_header(AUTHORIZATION.as_str());

						force = true;

						obs::record_outcome(Operation::ApiRequest, OpOutcome::Retry);
						debug_event!(uri = %url, "API rejected the token; retrying once.");

						continue;
					}

					obs::record_outcome(Operation::ApiRequest, OpOutcome::Failure);

					return Err(Error::Unauthorized { status, body: response.into_body() });
				}

				let result = response::interpret(response, attempts);

				obs::record_outcome(
					Operation::ApiRequest,
					if result.is_ok() { OpOutcome::Success } else { OpOutcome::Failure },
				);

				return result;
			}
		})
		.await
	}

	/// Absolute URIs are used verbatim; anything else is joined under the API origin, keeping
	/// its path prefix.
	fn resolve(&self, uri: &str) -> Result<Url> {
		match Url::parse(uri) {
			Ok(url) => Ok(url),
			Err(url::ParseError::RelativeUrlWithoutBase) => self
				.tokens
				.endpoints()
				.api_origin()
				.join(uri.trim_start_matches('/'))
				.map_err(|source| ConfigError::InvalidUri { uri: uri.to_owned(), source }.into()),
			Err(source) => Err(ConfigError::InvalidUri { uri: uri.to_owned(), source }.into()),
		}
	}

	fn build(&self, request: &ApiRequest, url: &Url, token: &TokenSecret) -> Result<HttpRequest> {
		let mut headers = self.default_headers.clone();

		if !request.has_header(AUTHORIZATION.as_str()) {
			let bearer = HeaderValue::from_str(&token.bearer())
				.map_err(|_| ConfigError::InvalidHeader { name: AUTHORIZATION.to_string() })?;

			headers.insert(AUTHORIZATION, bearer);
		}

		let mut overridden = Vec::<HeaderName>::new();

		for (name, value) in &request.headers {
			let (name, value) = parse_header(name, value)?;

			if overridden.contains(&name) {
				headers.append(name, value);
			} else {
				headers.insert(name.clone(), value);
				overridden.push(name);
			}
		}

		let mut wire = Request::builder()
			.method(request.method.clone())
			.uri(url.as_str())
			.body(request.body.clone().unwrap_or_default())
			.map_err(ConfigError::from)?;

		*wire.headers_mut() = headers;

		Ok(wire)
	}

	async fn send(&self, wire: HttpRequest) -> Result<oauth2::HttpResponse> {
		let meta = ResponseMetadataSlot::default();
		let handle = self.tokens.http_client().with_metadata(meta.clone());

		handle.call(wire).await.map_err(|err| {
			Error::Network(self.tokens.transport_mapper().map_transport_error(
				Operation::ApiRequest,
				meta.take().as_ref(),
				err,
			))
		})
	}
}
impl<C, M> Clone for ApiClient<C, M>
where
	C: ?Sized + HttpTransport,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn clone(&self) -> Self {
		Self { tokens: self.tokens.clone(), default_headers: self.default_headers.clone() }
	}
}
impl<C, M> Debug for ApiClient<C, M>
where
	C: ?Sized + HttpTransport,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ApiClient")
			.field("api_origin", &self.tokens.endpoints().api_origin().as_str())
			.field("default_headers", &self.default_headers)
			.finish()
	}
}

fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), ConfigError> {
	let invalid = || ConfigError::InvalidHeader { name: name.to_owned() };
	let parsed_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
	let parsed_value = HeaderValue::from_str(value).map_err(|_| invalid())?;

	Ok((parsed_name, parsed_value))
}
