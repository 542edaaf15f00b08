//! Fixtures shared by the integration tests.

#![allow(dead_code)]

// crates.io
use httpmock::MockServer;
// self
use zoom_oauth2::{
	auth::Credentials,
	config::Endpoints,
	http::ReqwestHttpClient,
	manager::{TokenManager, TokenManagerBuilder},
	url::Url,
};

pub const CLIENT_ID: &str = "id";
pub const CLIENT_SECRET: &str = "sec";
/// `Basic base64("id:sec")`.
pub const BASIC_AUTHORIZATION: &str = "Basic aWQ6c2Vj";

pub fn credentials() -> Credentials {
	Credentials::new(CLIENT_ID, CLIENT_SECRET).expect("Fixture credentials should be valid.")
}

/// API origin at `{server}/v2/`, OAuth endpoints under `{server}/oauth/`.
pub fn endpoints(server: &MockServer) -> Endpoints {
	Endpoints::builder()
		.api_origin(Url::parse(&server.url("/v2/")).expect("Mock API origin should parse."))
		.auth_base(Url::parse(&server.url("/")).expect("Mock auth base should parse."))
		.build()
		.expect("Mock endpoints should build successfully.")
}

pub fn builder(server: &MockServer) -> TokenManagerBuilder<ReqwestHttpClient> {
	TokenManager::builder(credentials(), endpoints(server))
}

pub fn manager(server: &MockServer) -> TokenManager<ReqwestHttpClient> {
	builder(server).build().expect("Token manager should build against the mock server.")
}

pub fn token_body(access: &str, expires_in: u64, refresh: Option<&str>) -> String {
	match refresh {
		Some(refresh) => format!(
			"{{\"access_token\":\"{access}\",\"token_type\":\"bearer\",\"expires_in\":{expires_in},\"refresh_token\":\"{refresh}\"}}"
		),
		None => format!(
			"{{\"access_token\":\"{access}\",\"token_type\":\"bearer\",\"expires_in\":{expires_in}}}"
		),
	}
}
