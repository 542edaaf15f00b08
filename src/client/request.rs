//! Per-call request description.

// crates.io
use oauth2::http::Method;
// self
use crate::{_prelude::*, error::ConfigError};

/// One API call: method, target, headers, body, and the auth/retry knobs.
///
/// `uri` may be absolute (used verbatim) or relative to the API origin.
#[derive(Clone, Debug, Default)]
pub struct ApiRequest {
	/// HTTP method; `GET` unless set.
	pub method: Method,
	/// Absolute URL or path relative to the API origin.
	pub uri: String,
	/// Caller headers, applied over the client defaults in order.
	pub headers: Vec<(String, String)>,
	/// Raw request body.
	pub body: Option<Vec<u8>>,
	/// Forces a token exchange before the first attempt.
	pub force_auth: bool,
	/// Whether a 401 may trigger one retry with a fresh token. `None` defers to the entry
	/// point: [`ApiClient::request`](crate::client::ApiClient::request) treats it as `false`,
	/// the verb helpers as `true`.
	pub retry: Option<bool>,
}
impl ApiRequest {
	/// Creates a request for `method` against `uri`.
	pub fn new(method: Method, uri: impl Into<String>) -> Self {
		Self { method, uri: uri.into(), ..Default::default() }
	}

	/// `GET` request.
	pub fn get(uri: impl Into<String>) -> Self {
		Self::new(Method::GET, uri)
	}

	/// `POST` request.
	pub fn post(uri: impl Into<String>) -> Self {
		Self::new(Method::POST, uri)
	}

	/// `PUT` request.
	pub fn put(uri: impl Into<String>) -> Self {
		Self::new(Method::PUT, uri)
	}

	/// `PATCH` request.
	pub fn patch(uri: impl Into<String>) -> Self {
		Self::new(Method::PATCH, uri)
	}

	/// `DELETE` request.
	pub fn delete(uri: impl Into<String>) -> Self {
		Self::new(Method::DELETE, uri)
	}

	/// Adds a header. Caller headers override client defaults of the same name.
	pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.push((name.into(), value.into()));

		self
	}

	/// Sets a raw body.
	pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
		self.body = Some(body.into());

		self
	}

	/// Serializes `value` as the JSON body.
	pub fn json<T>(mut self, value: &T) -> Result<Self>
	where
		T: ?Sized + Serialize,
	{
		self.body = Some(serde_json::to_vec(value).map_err(ConfigError::BodySerialization)?);

		Ok(self)
	}

	/// Forces a fresh token for the first attempt.
	pub fn force_auth(mut self) -> Self {
		self.force_auth = true;

		self
	}

	/// Enables or disables the single 401 retry.
	pub fn retry(mut self, retry: bool) -> Self {
		self.retry = Some(retry);

		self
	}

	pub(crate) fn has_header(&self, name: &str) -> bool {
		self.headers.iter().any(|(candidate, _)| candidate.eq_ignore_ascii_case(name))
	}

	pub(crate) fn remove_header(&mut self, name: &str) {
		self.headers.retain(|(candidate, _)| !candidate.eq_ignore_ascii_case(name));
	}
}
