//! User-level authorization: Authorization Code + PKCE sessions and token revocation.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use oauth2::{
	AsyncHttpClient,
	http::{
		Method, Request,
		header::{AUTHORIZATION, CONTENT_TYPE},
	},
};
use rand::{Rng, distr::Alphanumeric};
use sha2::{Digest, Sha256};
// self
use super::TokenManager;
use crate::{
	_prelude::*,
	auth::{
		InvalidationOutcome, ScopeSet, TokenInfo, TokenSource, TokenState,
		token::exchange::rejection,
	},
	error::{AuthExchangeError, ConfigError},
	http::{HttpTransport, ResponseMetadataSlot},
	oauth::TransportErrorMapper,
	obs::{self, OpOutcome, OpSpan, Operation, debug_event},
};

const STATE_LEN: usize = 32;
const PKCE_VERIFIER_LEN: usize = 64;

/// Authorization Code + PKCE handshake returned by
/// [`TokenManager::authorization_session`].
#[derive(Clone)]
pub struct AuthorizationSession {
	/// Opaque state value that must round-trip through the redirect.
	pub state: String,
	/// Redirect URI embedded in the authorize URL.
	pub redirect_uri: Url,
	/// Authorize URL to send the end user to.
	pub authorize_url: Url,
	/// Requested scopes, if any.
	pub scope: Option<ScopeSet>,
	pkce_verifier: String,
	pkce_challenge: String,
}
impl AuthorizationSession {
	fn generate(
		authorization: &Url,
		client_id: &str,
		redirect_uri: Url,
		scope: Option<ScopeSet>,
	) -> Self {
		let state = random_string(STATE_LEN);
		let pkce_verifier = random_string(PKCE_VERIFIER_LEN);
		let pkce_challenge = pkce_challenge(&pkce_verifier);
		let mut authorize_url = authorization.clone();
		let mut pairs = authorize_url.query_pairs_mut();

		pairs.append_pair("response_type", "code");
		pairs.append_pair("client_id", client_id);
		pairs.append_pair("redirect_uri", redirect_uri.as_str());

		if let Some(scope) = scope.as_ref().filter(|scope| !scope.is_empty()) {
			pairs.append_pair("scope", &scope.normalized());
		}

		pairs.append_pair("state", &state);
		pairs.append_pair("code_challenge", &pkce_challenge);
		pairs.append_pair("code_challenge_method", "S256");

		drop(pairs);

		Self { state, redirect_uri, authorize_url, scope, pkce_verifier, pkce_challenge }
	}

	/// S256 code challenge derived from the secret verifier.
	pub fn code_challenge(&self) -> &str {
		&self.pkce_challenge
	}

	/// Checks the `state` returned to the redirect handler.
	pub fn validate_state(&self, returned_state: &str) -> Result<(), AuthExchangeError> {
		if returned_state == self.state {
			Ok(())
		} else {
			Err(AuthExchangeError::StateMismatch)
		}
	}
}
impl Debug for AuthorizationSession {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthorizationSession")
			.field("state", &self.state)
			.field("redirect_uri", &self.redirect_uri)
			.field("authorize_url", &self.authorize_url)
			.field("scope", &self.scope)
			.field("code_challenge", &self.pkce_challenge)
			.finish()
	}
}

impl<C, M> TokenManager<C, M>
where
	C: ?Sized + HttpTransport,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Starts an Authorization Code + PKCE handshake redirecting to `redirect_uri`.
	pub fn authorization_session(&self, redirect_uri: Url) -> AuthorizationSession {
		AuthorizationSession::generate(
			self.endpoints.authorization(),
			&self.credentials.client_id,
			redirect_uri,
			self.scope.clone(),
		)
	}

	/// Validates the returned state and exchanges `code` with the session's PKCE verifier.
	pub async fn complete_authorization(
		&self,
		session: AuthorizationSession,
		returned_state: &str,
		code: &str,
	) -> Result<TokenInfo> {
		session.validate_state(returned_state)?;

		self.exchange_authorization_code(
			code,
			&session.redirect_uri,
			Some(session.pkce_verifier.as_str()),
		)
		.await
	}

	/// Exchanges an authorization code and installs the resulting token pair.
	pub async fn exchange_authorization_code(
		&self,
		code: &str,
		redirect_uri: &Url,
		pkce_verifier: Option<&str>,
	) -> Result<TokenInfo> {
		let span = OpSpan::new(Operation::AuthorizationCode, "exchange_authorization_code");

		span.instrument(async move {
			let _singleflight = self.exchange_guard.lock().await;

			self.metrics.record_attempt();
			obs::record_outcome(Operation::AuthorizationCode, OpOutcome::Attempt);

			let result = match self
				.facade
				.exchange_code(
					self.http_client.as_ref(),
					self.transport_mapper.as_ref(),
					code,
					pkce_verifier,
					redirect_uri,
				)
				.await
			{
				Ok(issued) => self.commit(issued, TokenSource::Exchanged).await,
				Err(err) => Err(err),
			};

			self.record_exchange(Operation::AuthorizationCode, &result);

			result
		})
		.await
	}

	/// Revokes `token`, or the held access token (falling back to the refresh token) when
	/// `None`.
	///
	/// A revoked token that is currently held is dropped from the state and the change is
	/// persisted to the configured store.
	pub async fn revoke_token(&self, token: Option<&str>) -> Result<()> {
		let span = OpSpan::new(Operation::Revoke, "revoke_token");

		span.instrument(async move {
			let _singleflight = self.exchange_guard.lock().await;
			let target = match token {
				Some(token) => token.to_owned(),
				None => {
					let state = self.state.read();

					state
						.access_token
						.as_ref()
						.or(state.refresh_token.as_ref())
						.map(|secret| secret.expose().to_owned())
						.ok_or(ConfigError::NoTokenToRevoke)?
				},
			};

			obs::record_outcome(Operation::Revoke, OpOutcome::Attempt);

			let result = self.send_revocation(&target).await;

			match &result {
				Ok(()) => obs::record_outcome(Operation::Revoke, OpOutcome::Success),
				Err(_) => obs::record_outcome(Operation::Revoke, OpOutcome::Failure),
			}

			result?;

			// Persist first so a failed save leaves memory and store agreeing.
			let mut next = self.state.read().clone();
			let (access, refresh_revoked) = revoke_held(&mut next, &target);

			debug_event!(access = ?access, refresh_revoked, "Token revoked.");

			if access != InvalidationOutcome::Cleared && !refresh_revoked {
				return Ok(());
			}
			if let Some(store) = &self.store {
				store.save(next.snapshot()).await?;
			}

			// Concurrent invalidations only clear tokens, so replaying the revocation is safe.
			revoke_held(&mut self.state.write(), &target);

			Ok(())
		})
		.await
	}

	async fn send_revocation(&self, token: &str) -> Result<()> {
		let body = url::form_urlencoded::Serializer::new(String::new())
			.append_pair("token", token)
			.finish()
			.into_bytes();
		let request = Request::builder()
			.method(Method::POST)
			.uri(self.endpoints.revocation().as_str())
			.header(AUTHORIZATION, self.credentials.basic_authorization())
			.header(CONTENT_TYPE, "application/x-www-form-urlencoded")
			.body(body)
			.map_err(ConfigError::from)?;
		let meta = ResponseMetadataSlot::default();
		let handle = self.http_client.with_metadata(meta.clone());
		let response = handle.call(request).await.map_err(|err| {
			AuthExchangeError::Transport(self.transport_mapper.map_transport_error(
				Operation::Revoke,
				meta.take().as_ref(),
				err,
			))
		})?;
		let status = response.status();

		if !status.is_success() {
			return Err(rejection(status.as_u16(), response.body()).into());
		}

		Ok(())
	}
}

fn random_string(len: usize) -> String {
	rand::rng().sample_iter(Alphanumeric).take(len).map(char::from).collect()
}

fn pkce_challenge(verifier: &str) -> String {
	URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

fn revoke_held(state: &mut TokenState, target: &str) -> (InvalidationOutcome, bool) {
	let access = state.invalidate(Some(target));
	let refresh_revoked = state.refresh_token.as_ref().is_some_and(|secret| secret.matches(target));

	if refresh_revoked {
		state.refresh_token = None;
	}

	(access, refresh_revoked)
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicBool, Ordering};
	// self
	use super::*;
	use crate::{
		_preludet::*,
		auth::{TokenSecret, TokenSnapshot},
		clock::ManualClock,
		error::RejectionKind,
		manager::TokenManagerBuilder,
		store::{MemoryStore, StoreError, StoreFuture, TokenStore},
	};

	// Accepts saves until it is switched to read-only.
	#[derive(Clone, Default)]
	struct LatchedStore {
		inner: MemoryStore,
		read_only: Arc<AtomicBool>,
	}
	impl TokenStore for LatchedStore {
		fn save(&self, snapshot: TokenSnapshot) -> StoreFuture<'_, ()> {
			if self.read_only.load(Ordering::SeqCst) {
				return Box::pin(async {
					Err(StoreError::Backend { message: "read-only".into() })
				});
			}

			self.inner.save(snapshot)
		}

		fn load(&self) -> StoreFuture<'_, Option<TokenSnapshot>> {
			self.inner.load()
		}
	}

	fn redirect() -> Url {
		Url::parse("https://app.example.com/callback").expect("Redirect fixture should parse.")
	}

	#[test]
	fn pkce_challenge_matches_rfc_7636_vector() {
		assert_eq!(
			pkce_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
			"E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
		);
	}

	#[test]
	fn session_builds_authorize_url() {
		let manager = TokenManagerBuilder::new(
			test_credentials(),
			test_endpoints("https://zoom.test"),
			ScriptedHttpClient::default(),
		)
		.scopes(["meeting:read"])
		.expect("Scope fixture should be valid.")
		.build()
		.expect("Manager should build.");
		let session = manager.authorization_session(redirect());
		let query = session.authorize_url.query_pairs().into_owned().collect::<HashMap<_, _>>();

		assert_eq!(session.authorize_url.path(), "/oauth/authorize");
		assert_eq!(session.state.len(), STATE_LEN);
		assert_eq!(query["response_type"], "code");
		assert_eq!(query["client_id"], "id");
		assert_eq!(query["redirect_uri"], "https://app.example.com/callback");
		assert_eq!(query["scope"], "meeting:read");
		assert_eq!(query["state"], session.state);
		assert_eq!(query["code_challenge"], session.code_challenge());
		assert_eq!(query["code_challenge_method"], "S256");
	}

	#[tokio::test]
	async fn state_mismatch_stops_before_exchange() {
		let transport = ScriptedHttpClient::default();
		let manager = build_scripted_test_manager(transport.clone(), ManualClock::new());
		let session = manager.authorization_session(redirect());
		let err = manager
			.complete_authorization(session, "forged", "code")
			.await
			.expect_err("A forged state must be rejected.");

		assert!(matches!(err, Error::AuthExchange(AuthExchangeError::StateMismatch)));
		assert!(transport.requests().is_empty());
	}

	#[tokio::test]
	async fn code_exchange_installs_token_pair() {
		let transport = ScriptedHttpClient::new([ScriptedReply::token("A", 3600, Some("R"))]);
		let manager = build_scripted_test_manager(transport.clone(), ManualClock::new());
		let session = manager.authorization_session(redirect());
		let state = session.state.clone();
		let verifier = session.pkce_verifier.clone();
		let info = manager
			.complete_authorization(session, &state, "the-code")
			.await
			.expect("Code exchange should succeed.");
		let body = String::from_utf8_lossy(transport.requests()[0].body()).into_owned();

		assert_eq!(info.access_token.expose(), "A");
		assert!(info.has_refresh_token);
		assert!(body.contains("grant_type=authorization_code"));
		assert!(body.contains("code=the-code"));
		assert!(body.contains(&format!("code_verifier={verifier}")));
		assert_eq!(
			manager.get_token(false).await.expect("Token should be cached.").source,
			TokenSource::Cached
		);
	}

	#[tokio::test]
	async fn revoke_clears_held_token_and_persists() {
		let store = MemoryStore::default();
		let transport = ScriptedHttpClient::new([
			ScriptedReply::token("A", 3600, Some("R")),
			ScriptedReply::json(200, "{}"),
		]);
		let manager = TokenManagerBuilder::new(
			test_credentials(),
			test_endpoints("https://zoom.test"),
			transport.clone(),
		)
		.store(store.clone())
		.build()
		.expect("Manager should build.");

		manager.get_token(false).await.expect("Exchange should succeed.");
		manager.revoke_token(None).await.expect("Revocation should succeed.");

		let request = &transport.requests_to("/oauth/revoke")[0];

		assert_eq!(String::from_utf8_lossy(request.body()), "token=A");
		assert_eq!(
			request.headers().get(AUTHORIZATION).and_then(|value| value.to_str().ok()),
			Some("Basic aWQ6c2Vj")
		);
		assert!(manager.is_expired());
		assert_eq!(store.saves(), 2);
		assert_eq!(
			store
				.current()
				.and_then(|snapshot| snapshot.refresh_token)
				.as_ref()
				.map(TokenSecret::expose),
			Some("R")
		);
	}

	#[tokio::test]
	async fn revoke_keeps_state_when_the_store_rejects_it() {
		let store = LatchedStore::default();
		let transport = ScriptedHttpClient::new([
			ScriptedReply::token("A", 3600, Some("R")),
			ScriptedReply::json(200, "{}"),
		]);
		let manager = TokenManagerBuilder::new(
			test_credentials(),
			test_endpoints("https://zoom.test"),
			transport,
		)
		.store(store.clone())
		.build()
		.expect("Manager should build.");

		manager.get_token(false).await.expect("Exchange should succeed.");
		store.read_only.store(true, Ordering::SeqCst);

		let err = manager.revoke_token(None).await.expect_err("The failed save must surface.");

		assert!(matches!(err, Error::Storage(StoreError::Backend { .. })));
		assert!(!manager.is_expired(), "Memory must keep agreeing with the store.");
		assert_eq!(manager.snapshot().access_token.as_ref().map(TokenSecret::expose), Some("A"));
		assert_eq!(
			store
				.inner
				.current()
				.and_then(|snapshot| snapshot.access_token)
				.as_ref()
				.map(TokenSecret::expose),
			Some("A")
		);
	}

	#[tokio::test]
	async fn revoke_failures_keep_state() {
		let transport = ScriptedHttpClient::new([
			ScriptedReply::token("A", 3600, None),
			ScriptedReply::json(
				400,
				r#"{"error":"invalid_client","reason":"Invalid client_id or client_secret"}"#,
			),
		]);
		let manager = build_scripted_test_manager(transport, ManualClock::new());

		manager.get_token(false).await.expect("Exchange should succeed.");

		let err = manager.revoke_token(Some("A")).await.expect_err("A 400 must fail revocation.");

		assert!(matches!(
			err,
			Error::AuthExchange(AuthExchangeError::Rejected {
				status: 400,
				kind: RejectionKind::InvalidClient,
				..
			})
		));
		assert!(!manager.is_expired());
	}

	#[tokio::test]
	async fn revoke_without_token_is_a_config_error() {
		let manager = build_scripted_test_manager(ScriptedHttpClient::default(), ManualClock::new());
		let err = manager.revoke_token(None).await.expect_err("Nothing is held to revoke.");

		assert!(matches!(err, Error::Config(ConfigError::NoTokenToRevoke)));
	}
}
