//! Demonstrates plugging a custom HTTP transport and error mapper into the token manager.
//!
//! 1. Implement [`HttpTransport`] so the transport records [`ResponseMetadata`] via the provided
//!    [`ResponseMetadataSlot`].
//! 2. Provide a [`TransportErrorMapper`] that understands both the transport error type and the
//!    captured metadata.
//! 3. Hand both to [`TokenManagerBuilder`] and let failures surface as [`TransportError`].

// std
use std::{
	error::Error as StdError,
	fmt::{Display, Formatter, Result as FmtResult},
	future::Future,
	pin::Pin,
	time::Duration,
};
// crates.io
use color_eyre::Result;
// self
use zoom_oauth2::{
	auth::Credentials,
	config::Endpoints,
	error::{AuthExchangeError, Error, TransportError},
	http::{HttpTransport, ResponseMetadata, ResponseMetadataSlot},
	manager::TokenManagerBuilder,
	oauth::TransportErrorMapper,
	oauth2::{
		AsyncHttpClient, HttpClientError, HttpRequest, HttpResponse,
		http::{HeaderValue, header::CONTENT_TYPE},
	},
	obs::Operation,
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let credentials = Credentials::new("demo-client", "demo-secret")?;
	let manager = TokenManagerBuilder::new(
		credentials.clone(),
		Endpoints::production()?,
		MockHttpClient::success(),
	)
	.transport_mapper(MockTransportErrorMapper)
	.build()?;
	let info = manager.get_token(false).await?;

	println!("Access token issued by the mock transport: {}.", info.access_token.expose());

	let failing = TokenManagerBuilder::new(
		credentials.clone(),
		Endpoints::production()?,
		MockHttpClient::transport_error(MockTransportError::DnsFailure { host: "zoom.us" }),
	)
	.transport_mapper(MockTransportErrorMapper)
	.build()?;

	match failing.get_token(false).await {
		Ok(_) => println!("Mock transport unexpectedly succeeded."),
		Err(Error::AuthExchange(AuthExchangeError::Transport(e))) =>
			println!("Transport error mapped by the custom mapper: {e}."),
		Err(e) => println!("Unexpected failure: {e}."),
	}

	let other = TokenManagerBuilder::new(
		credentials,
		Endpoints::production()?,
		MockHttpClient::other_error("upstream connection closed"),
	)
	.transport_mapper(MockTransportErrorMapper)
	.build()?;

	match other.get_token(false).await {
		Ok(_) => println!("Mock transport unexpectedly produced a token."),
		Err(e) => println!("An HttpClientError::Other variant made it through the mapper: {e}."),
	}

	Ok(())
}

#[derive(Clone, Debug)]
enum MockTransportError {
	DnsFailure {
		host: &'static str,
	},
	#[allow(unused)]
	BackendTimeout,
}
impl Display for MockTransportError {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Self::DnsFailure { host } => write!(f, "DNS lookup failed for {host}"),
			Self::BackendTimeout => write!(f, "Token endpoint timed out"),
		}
	}
}
impl StdError for MockTransportError {}

#[derive(Clone)]
enum MockBehavior {
	Success,
	TransportError(MockTransportError),
	Other(&'static str),
}

#[derive(Clone)]
struct MockHttpClient {
	behavior: MockBehavior,
}
impl MockHttpClient {
	fn success() -> Self {
		Self { behavior: MockBehavior::Success }
	}

	fn transport_error(error: MockTransportError) -> Self {
		Self { behavior: MockBehavior::TransportError(error) }
	}

	fn other_error(message: &'static str) -> Self {
		Self { behavior: MockBehavior::Other(message) }
	}
}
impl HttpTransport for MockHttpClient {
	type Handle = MockHttpHandle;
	type TransportError = MockTransportError;

	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle {
		MockHttpHandle { slot, behavior: self.behavior.clone() }
	}
}

struct MockHttpHandle {
	slot: ResponseMetadataSlot,
	behavior: MockBehavior,
}
impl<'a> AsyncHttpClient<'a> for MockHttpHandle {
	type Error = HttpClientError<MockTransportError>;
	type Future =
		Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'a + Send + Sync>>;

	fn call(&'a self, _request: HttpRequest) -> Self::Future {
		let slot = self.slot.clone();
		let behavior = self.behavior.clone();

		Box::pin(async move {
			slot.take();

			match behavior {
				MockBehavior::Success => {
					slot.store(ResponseMetadata { status: Some(200), retry_after: None });

					let mut response = HttpResponse::new(
						b"{\"access_token\":\"mock-access\",\"token_type\":\"bearer\",\"expires_in\":3599}"
							.to_vec(),
					);

					response
						.headers_mut()
						.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

					Ok(response)
				},
				MockBehavior::TransportError(error) => {
					slot.store(ResponseMetadata {
						status: Some(503),
						retry_after: Some(Duration::from_secs(2)),
					});

					// oauth2 names the variant after reqwest, but it boxes any transport error.
					Err(HttpClientError::Reqwest(Box::new(error)))
				},
				MockBehavior::Other(message) => Err(HttpClientError::Other(message.to_owned())),
			}
		})
	}
}

#[derive(Clone, Default)]
struct MockTransportErrorMapper;
impl TransportErrorMapper<MockTransportError> for MockTransportErrorMapper {
	fn map_transport_error(
		&self,
		op: Operation,
		metadata: Option<&ResponseMetadata>,
		error: HttpClientError<MockTransportError>,
	) -> TransportError {
		let op = op.as_str();
		let status = metadata.and_then(|meta| meta.status);
		let retry_after = metadata.and_then(|meta| meta.retry_after);

		match error {
			HttpClientError::Reqwest(inner) => match *inner {
				MockTransportError::BackendTimeout =>
					TransportError::Timeout { source: Box::new(MockTransportError::BackendTimeout) },
				error => TransportError::Other {
					message: format!(
						"{op} failed with status {status:?} (retry after {retry_after:?}): {error}"
					),
				},
			},
			HttpClientError::Other(text) =>
				TransportError::Other { message: format!("{op} failed: {text}") },
			_ => TransportError::Other { message: format!("{op} failed") },
		}
	}
}
