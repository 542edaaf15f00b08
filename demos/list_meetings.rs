//! Lists meetings through the authenticated API client against a local mock of the Zoom API.
//!
//! The first API call is rejected with a 401 to show the single forced re-authentication.

// std
use std::{sync::Arc, time::Duration};
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use serde::Deserialize;
// self
use zoom_oauth2::{
	auth::Credentials,
	client::{ApiClient, ApiRequest},
	config::Endpoints,
	manager::TokenManager,
	url::Url,
};

#[derive(Debug, Deserialize)]
struct MeetingList {
	total_records: u32,
	meetings: Vec<Meeting>,
}

#[derive(Debug, Deserialize)]
struct Meeting {
	id: u64,
	topic: String,
}

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let token_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth/token");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"demo-access\",\"token_type\":\"bearer\",\"expires_in\":3600,\"refresh_token\":\"demo-refresh\"}",
			);
		})
		.await;
	let stale_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/v2/users/me/meetings").header("authorization", "Bearer stale");
			then.status(401)
				.header("content-type", "application/json")
				.body("{\"code\":124,\"message\":\"Invalid access token.\"}");
		})
		.await;
	let meetings_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/v2/users/me/meetings").header("authorization", "Bearer demo-access");
			then.status(200).header("content-type", "application/json").body(
				"{\"total_records\":2,\"meetings\":[{\"id\":1001,\"topic\":\"Standup\"},{\"id\":1002,\"topic\":\"Retro\"}]}",
			);
		})
		.await;
	let endpoints = Endpoints::builder()
		.api_origin(Url::parse(&server.url("/v2/"))?)
		.auth_base(Url::parse(&server.url("/"))?)
		.build()?;
	let tokens = TokenManager::builder(Credentials::new("demo-client", "demo-secret")?, endpoints)
		.access_token("stale", Some(Duration::from_secs(3600)))
		.build()?;
	let client = ApiClient::new(Arc::new(tokens));
	let response = client.get(ApiRequest::get("users/me/meetings")).await?;

	stale_mock.assert_async().await;
	token_mock.assert_async().await;
	meetings_mock.assert_async().await;

	println!("Listed meetings after {} attempts (status {}).", response.attempts, response.status);

	if let Some(list) = response.deserialize::<MeetingList>().transpose()? {
		println!("{} meetings:", list.total_records);

		for meeting in list.meetings {
			println!("- {} {}", meeting.id, meeting.topic);
		}
	}

	Ok(())
}
