//! JSON token exchange (`ExchangeMode::Json`).
//!
//! The token endpoint receives a JSON document carrying the client credentials plus either
//! the held refresh token or the requested scope, never both.

// crates.io
use oauth2::{
	AsyncHttpClient,
	http::{
		Method, Request,
		header::{ACCEPT, CONTENT_TYPE},
	},
};
// self
use super::TokenManager;
use crate::{
	_prelude::*,
	auth::{IssuedToken, TokenSecret, parse_token_response},
	error::{AuthExchangeError, ConfigError},
	http::{HttpTransport, ResponseMetadataSlot},
	oauth::TransportErrorMapper,
	obs::Operation,
};

const JSON: &str = "application/json";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExchangePayload<'a> {
	client_id: &'a str,
	client_secret: &'a str,
	#[serde(skip_serializing_if = "Option::is_none")]
	refresh_token: Option<&'a str>,
	#[serde(skip_serializing_if = "Option::is_none")]
	scope: Option<String>,
}

impl<C, M> TokenManager<C, M>
where
	C: ?Sized + HttpTransport,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	pub(super) async fn exchange_json(
		&self,
		refresh_token: Option<&TokenSecret>,
	) -> Result<IssuedToken> {
		let payload = ExchangePayload {
			client_id: &self.credentials.client_id,
			client_secret: self.credentials.client_secret(),
			refresh_token: refresh_token.map(TokenSecret::expose),
			scope: match refresh_token {
				Some(_) => None,
				None => self
					.scope
					.as_ref()
					.filter(|scope| !scope.is_empty())
					.map(|scope| scope.normalized()),
			},
		};
		let body = serde_json::to_vec(&payload).map_err(ConfigError::BodySerialization)?;
		let request = Request::builder()
			.method(Method::POST)
			.uri(self.endpoints.token().as_str())
			.header(CONTENT_TYPE, JSON)
			.header(ACCEPT, JSON)
			.body(body)
			.map_err(ConfigError::from)?;
		let meta = ResponseMetadataSlot::default();
		let handle = self.http_client.with_metadata(meta.clone());
		let response = handle.call(request).await.map_err(|err| {
			AuthExchangeError::Transport(self.transport_mapper.map_transport_error(
				Operation::TokenExchange,
				meta.take().as_ref(),
				err,
			))
		})?;

		Ok(parse_token_response(response.status().as_u16(), response.body())?)
	}
}
