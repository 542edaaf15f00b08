//! RFC 6749 exchanges through the `oauth2` crate, plus transport error mapping.

// std
use std::borrow::Cow;
// crates.io
use oauth2::{
	AuthUrl, AuthorizationCode, ClientId, ClientSecret, EndpointNotSet, EndpointSet,
	HttpClientError, PkceCodeVerifier, RedirectUrl, RefreshToken, RequestTokenError, Scope,
	TokenResponse, TokenUrl,
	basic::{BasicClient, BasicErrorResponse, BasicRequestTokenError, BasicTokenResponse},
};
// self
use crate::{
	_prelude::*,
	auth::{Credentials, IssuedToken, ScopeSet, TokenSecret},
	config::Endpoints,
	error::{AuthExchangeError, ConfigError, RejectionKind, TransportError},
	http::{HttpTransport, ResponseMetadata, ResponseMetadataSlot},
	obs::{Operation, debug_event},
};

type ConfiguredBasicClient =
	BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Maps transport failures into [`TransportError`] values.
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an [`HttpClientError`] emitted by the transport.
	fn map_transport_error(
		&self,
		op: Operation,
		meta: Option<&ResponseMetadata>,
		err: HttpClientError<E>,
	) -> TransportError;
}

/// Mapper used unless a custom one is supplied.
///
/// reqwest timeouts and request-builder failures are recognized by downcasting; any other
/// transport error becomes [`TransportError::Network`].
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultTransportErrorMapper;
impl<E> TransportErrorMapper<E> for DefaultTransportErrorMapper
where
	E: 'static + Send + Sync + StdError,
{
	fn map_transport_error(
		&self,
		op: Operation,
		meta: Option<&ResponseMetadata>,
		err: HttpClientError<E>,
	) -> TransportError {
		debug_event!(op = op.as_str(), status = ?meta.and_then(|m| m.status), "Transport failure.");

		#[cfg(not(feature = "tracing"))]
		let _ = (op, meta);

		match err {
			HttpClientError::Reqwest(inner) => classify_transport_failure(*inner),
			HttpClientError::Http(inner) => TransportError::InvalidRequest { source: Box::new(inner) },
			HttpClientError::Io(inner) => TransportError::Io(inner),
			HttpClientError::Other(message) => TransportError::Other { message },
			_ => TransportError::Other { message: format!("Unclassified failure during {op}") },
		}
	}
}

fn classify_transport_failure<E>(err: E) -> TransportError
where
	E: 'static + Send + Sync + StdError,
{
	#[cfg(feature = "reqwest")]
	if let Some(reqwest_err) = (&err as &dyn StdError).downcast_ref::<ReqwestError>() {
		if reqwest_err.is_timeout() {
			return TransportError::timeout(err);
		}
		if reqwest_err.is_builder() {
			return TransportError::InvalidRequest { source: Box::new(err) };
		}
	}

	TransportError::network(err)
}

/// `oauth2`-backed client used by [`ExchangeMode::OAuth`](crate::config::ExchangeMode::OAuth)
/// and by authorization code exchanges.
pub(crate) struct BasicFacade {
	oauth_client: ConfiguredBasicClient,
}
impl BasicFacade {
	pub(crate) fn new(credentials: &Credentials, endpoints: &Endpoints) -> Result<Self> {
		let auth_url = AuthUrl::new(endpoints.authorization().to_string())
			.map_err(|source| ConfigError::InvalidOAuthUrl { source })?;
		let token_url = TokenUrl::new(endpoints.token().to_string())
			.map_err(|source| ConfigError::InvalidOAuthUrl { source })?;
		let oauth_client = BasicClient::new(ClientId::new(credentials.client_id.to_string()))
			.set_client_secret(ClientSecret::new(credentials.client_secret().to_owned()))
			.set_auth_uri(auth_url)
			.set_token_uri(token_url);

		Ok(Self { oauth_client })
	}

	pub(crate) async fn refresh<C, M>(
		&self,
		transport: &C,
		mapper: &M,
		refresh_token: &TokenSecret,
	) -> Result<IssuedToken, AuthExchangeError>
	where
		C: ?Sized + HttpTransport,
		M: ?Sized + TransportErrorMapper<C::TransportError>,
	{
		let meta = ResponseMetadataSlot::default();
		let handle = transport.with_metadata(meta.clone());
		let secret = RefreshToken::new(refresh_token.expose().to_owned());
		let response = self
			.oauth_client
			.exchange_refresh_token(&secret)
			.request_async(&handle)
			.await
			.map_err(|err| map_request_error(Operation::TokenExchange, meta.take(), err, mapper))?;

		issued_from(response)
	}

	pub(crate) async fn client_credentials<C, M>(
		&self,
		transport: &C,
		mapper: &M,
		scope: Option<&ScopeSet>,
	) -> Result<IssuedToken, AuthExchangeError>
	where
		C: ?Sized + HttpTransport,
		M: ?Sized + TransportErrorMapper<C::TransportError>,
	{
		let meta = ResponseMetadataSlot::default();
		let handle = transport.with_metadata(meta.clone());
		let mut request = self.oauth_client.exchange_client_credentials();

		for scope in scope.into_iter().flat_map(ScopeSet::iter) {
			request = request.add_scope(Scope::new(scope.to_owned()));
		}

		let response = request
			.request_async(&handle)
			.await
			.map_err(|err| map_request_error(Operation::TokenExchange, meta.take(), err, mapper))?;

		issued_from(response)
	}

	pub(crate) async fn exchange_code<C, M>(
		&self,
		transport: &C,
		mapper: &M,
		code: &str,
		pkce_verifier: Option<&str>,
		redirect_uri: &Url,
	) -> Result<IssuedToken>
	where
		C: ?Sized + HttpTransport,
		M: ?Sized + TransportErrorMapper<C::TransportError>,
	{
		let meta = ResponseMetadataSlot::default();
		let handle = transport.with_metadata(meta.clone());
		let redirect_url = RedirectUrl::new(redirect_uri.to_string())
			.map_err(|source| ConfigError::InvalidOAuthUrl { source })?;
		let mut request = self
			.oauth_client
			.exchange_code(AuthorizationCode::new(code.to_owned()))
			.set_redirect_uri(Cow::Owned(redirect_url));

		if let Some(verifier) = pkce_verifier {
			request = request.set_pkce_verifier(PkceCodeVerifier::new(verifier.to_owned()));
		}

		let response = request.request_async(&handle).await.map_err(|err| {
			map_request_error(Operation::AuthorizationCode, meta.take(), err, mapper)
		})?;

		Ok(issued_from(response)?)
	}
}

fn issued_from(response: BasicTokenResponse) -> Result<IssuedToken, AuthExchangeError> {
	let access_token = response.access_token().secret();

	if access_token.is_empty() {
		return Err(AuthExchangeError::MissingAccessToken);
	}

	let scope = response
		.scopes()
		.map(|scopes| ScopeSet::new(scopes.iter().map(|scope| scope.as_ref())))
		.transpose()
		.map_err(|err| AuthExchangeError::Unexpected {
			message: format!("Token endpoint returned invalid scopes: {err}"),
			status: None,
		})?;

	Ok(IssuedToken {
		access_token: TokenSecret::new(access_token.to_owned()),
		refresh_token: response
			.refresh_token()
			.map(|token| TokenSecret::new(token.secret().to_owned())),
		expires_in: response.expires_in(),
		scope,
		token_type: None,
	})
}

fn map_request_error<E, M>(
	op: Operation,
	meta: Option<ResponseMetadata>,
	err: BasicRequestTokenError<HttpClientError<E>>,
	mapper: &M,
) -> AuthExchangeError
where
	E: 'static + Send + Sync + StdError,
	M: ?Sized + TransportErrorMapper<E>,
{
	let status = meta.as_ref().and_then(|meta| meta.status);

	match err {
		RequestTokenError::ServerResponse(response) => map_server_response(response, status),
		RequestTokenError::Request(error) =>
			AuthExchangeError::Transport(mapper.map_transport_error(op, meta.as_ref(), error)),
		RequestTokenError::Parse(source, _body) => AuthExchangeError::Parse { source, status },
		RequestTokenError::Other(message) => AuthExchangeError::Unexpected { message, status },
	}
}

fn map_server_response(response: BasicErrorResponse, status: Option<u16>) -> AuthExchangeError {
	let code = response.error().as_ref().to_owned();
	let description = response.error_description().cloned();
	let status = status.unwrap_or(400);
	let kind = RejectionKind::classify(status, Some(&code), description.as_deref());

	AuthExchangeError::Rejected { status, kind, message: description.unwrap_or(code) }
}
