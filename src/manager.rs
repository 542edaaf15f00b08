//! Token lifecycle owner.
//!
//! [`TokenManager`] holds the access/refresh pair and answers "give me a valid token".
//! Fresh tokens are served from memory without awaiting anything. Renewals are serialized by
//! a single-flight guard: callers that queue behind an in-flight exchange reuse its token
//! instead of starting their own, so concurrent callers trigger at most one round trip.

mod authorization;
mod exchange;
mod metrics;

pub use authorization::*;
pub use metrics::ExchangeMetrics;

// self
#[cfg(feature = "reqwest")] use crate::http::ReqwestHttpClient;
use crate::{
	_prelude::*,
	auth::{
		Credentials, InvalidationOutcome, IssuedToken, ScopeSet, TokenInfo, TokenSecret,
		TokenSnapshot, TokenSource, TokenState,
	},
	clock::{Clock, SystemClock},
	config::{ClientConfig, Endpoints, ExchangeMode},
	error::{AuthExchangeError, ConfigError, RejectionKind},
	http::HttpTransport,
	oauth::{BasicFacade, DefaultTransportErrorMapper, TransportErrorMapper},
	obs::{self, OpOutcome, OpSpan, Operation, debug_event},
	store::TokenStore,
};

/// Token manager over the crate's default reqwest transport.
#[cfg(feature = "reqwest")]
pub type ReqwestTokenManager = TokenManager<ReqwestHttpClient>;

/// Owns the token state for one set of client credentials.
pub struct TokenManager<C, M = DefaultTransportErrorMapper>
where
	C: ?Sized + HttpTransport,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	credentials: Credentials,
	endpoints: Endpoints,
	mode: ExchangeMode,
	scope: Option<ScopeSet>,
	http_client: Arc<C>,
	transport_mapper: Arc<M>,
	store: Option<Arc<dyn TokenStore>>,
	clock: Arc<dyn Clock>,
	facade: BasicFacade,
	state: RwLock<TokenState>,
	exchange_guard: AsyncMutex<()>,
	last_exchange: Mutex<ExchangeRecord>,
	invalidated: Mutex<Option<TokenSecret>>,
	metrics: ExchangeMetrics,
}
#[cfg(feature = "reqwest")]
impl TokenManager<ReqwestHttpClient> {
	/// Starts a builder over a default reqwest transport.
	pub fn builder(
		credentials: Credentials,
		endpoints: Endpoints,
	) -> TokenManagerBuilder<ReqwestHttpClient> {
		TokenManagerBuilder::new(credentials, endpoints, ReqwestHttpClient::default())
	}

	/// Starts a builder from deserialized configuration: endpoints for the selected
	/// environment, exchange mode, and request timeout.
	pub fn from_config(
		credentials: Credentials,
		config: &ClientConfig,
	) -> Result<TokenManagerBuilder<ReqwestHttpClient>> {
		let endpoints = config.endpoints().map_err(ConfigError::from)?;
		let mut builder = Self::builder(credentials, endpoints).exchange_mode(config.exchange_mode);

		if let Some(timeout) = config.timeout() {
			builder = builder.timeout(timeout);
		}

		Ok(builder)
	}
}
impl<C, M> TokenManager<C, M>
where
	C: ?Sized + HttpTransport,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Returns a usable access token.
	///
	/// Without `force`, a token that has not reached its expiry is returned as is. Otherwise
	/// one exchange is performed, unless another caller's exchange completed while this one
	/// waited for the guard, in which case its outcome is shared: the token on success,
	/// [`AuthExchangeError::Coalesced`] on failure.
	pub async fn get_token(&self, force: bool) -> Result<TokenInfo> {
		if !force && let Some(info) = self.cached_info() {
			debug_event!(forced = false, "Serving cached access token.");

			return Ok(info);
		}

		// Generation first: a success commits the state before it closes the record.
		let observed_generation = self.state.read().generation;
		let observed_attempt = self.last_exchange.lock().attempt;
		let span = OpSpan::new(Operation::TokenExchange, "get_token");

		span.instrument(async move {
			let _singleflight = self.exchange_guard.lock().await;

			if let Some(failure) = self.coalesced_failure(observed_attempt) {
				return Err(failure.into());
			}
			if let Some(info) = self.coalesced_info(observed_generation, force) {
				return Ok(info);
			}

			self.exchange_locked().await
		})
		.await
	}

	/// Returns `true` when no token is held, its expiry is unknown, or it has expired.
	pub fn is_expired(&self) -> bool {
		self.state.read().is_expired_at(self.clock.now())
	}

	/// Drops the held access token so the next [`get_token`](Self::get_token) exchanges.
	///
	/// Naming a token that has already been replaced is a no-op
	/// ([`InvalidationOutcome::Superseded`]), so a late 401 for an old token cannot discard a
	/// newer one. The refresh token is kept.
	pub fn invalidate_token(&self, token: Option<&str>) -> InvalidationOutcome {
		let mut state = self.state.write();
		let held = state.access_token.clone();
		let outcome = state.invalidate(token);

		drop(state);

		if outcome == InvalidationOutcome::Cleared {
			*self.invalidated.lock() = held;
		}

		debug_event!(outcome = ?outcome, "Access token invalidation requested.");

		outcome
	}

	/// Serializable copy of the current state.
	pub fn snapshot(&self) -> TokenSnapshot {
		self.state.read().snapshot()
	}

	/// Seeds the state from the configured store's last snapshot.
	///
	/// Invalidations are not persisted, so a restored access token equal to the last one
	/// invalidated here is dropped; its refresh token is kept.
	///
	/// Returns `false` when no store is configured or it holds nothing.
	pub async fn restore(&self) -> Result<bool> {
		let Some(store) = &self.store else {
			return Ok(false);
		};
		let _singleflight = self.exchange_guard.lock().await;
		let Some(snapshot) = store.load().await? else {
			return Ok(false);
		};
		let mut restored =
			TokenState::from_snapshot(snapshot, self.clock.now(), self.clock.now_utc());

		if let Some(invalidated) = self.invalidated.lock().as_ref() {
			restored.invalidate(Some(invalidated.expose()));
		}

		let mut state = self.state.write();

		restored.generation = state.generation.wrapping_add(1);
		*state = restored;

		Ok(true)
	}

	/// Exchange counters.
	pub fn exchange_metrics(&self) -> &ExchangeMetrics {
		&self.metrics
	}

	/// Configured endpoints.
	pub fn endpoints(&self) -> &Endpoints {
		&self.endpoints
	}

	/// Client credentials.
	pub fn credentials(&self) -> &Credentials {
		&self.credentials
	}

	/// Scope requested when no refresh token is held.
	pub fn scope(&self) -> Option<&ScopeSet> {
		self.scope.as_ref()
	}

	/// Transport shared with API clients built on this manager.
	pub fn http_client(&self) -> &Arc<C> {
		&self.http_client
	}

	/// Transport error mapper shared with API clients built on this manager.
	pub fn transport_mapper(&self) -> &Arc<M> {
		&self.transport_mapper
	}

	fn cached_info(&self) -> Option<TokenInfo> {
		self.state.read().fresh_info(self.clock.now(), TokenSource::Cached)
	}

	fn coalesced_failure(&self, observed: u64) -> Option<AuthExchangeError> {
		let record = self.last_exchange.lock();

		if record.attempt == observed {
			return None;
		}

		let failure = record.failure.as_ref()?.to_error();

		self.metrics.record_coalesced();
		obs::record_outcome(Operation::TokenExchange, OpOutcome::Coalesced);
		debug_event!(error = %failure, "Sharing the failure of a concurrent exchange.");

		Some(failure)
	}

	fn coalesced_info(&self, observed: u64, force: bool) -> Option<TokenInfo> {
		let state = self.state.read();
		let now = self.clock.now();

		if state.generation != observed {
			let info = state.fresh_info(now, TokenSource::Cached)?;

			self.metrics.record_coalesced();
			obs::record_outcome(Operation::TokenExchange, OpOutcome::Coalesced);
			debug_event!(forced = force, "Reusing token from a concurrent exchange.");

			return Some(info);
		}
		if !force {
			return state.fresh_info(now, TokenSource::Cached);
		}

		None
	}

	// Callers must hold `exchange_guard`.
	async fn exchange_locked(&self) -> Result<TokenInfo> {
		self.metrics.record_attempt();
		obs::record_outcome(Operation::TokenExchange, OpOutcome::Attempt);

		let refresh_token = self.state.read().refresh_token.clone();
		let result = match refresh_token {
			Some(refresh_token) => self.renew(&refresh_token).await,
			None => self.acquire().await,
		};
		let result = match result {
			Ok(issued) => self.commit(issued, TokenSource::Exchanged).await,
			Err(err) => Err(err),
		};

		self.last_exchange.lock().close(&result);
		self.record_exchange(Operation::TokenExchange, &result);

		result
	}

	async fn renew(&self, refresh_token: &TokenSecret) -> Result<IssuedToken> {
		match self.mode {
			ExchangeMode::Json => self.exchange_json(Some(refresh_token)).await,
			ExchangeMode::OAuth => Ok(self
				.facade
				.refresh(self.http_client.as_ref(), self.transport_mapper.as_ref(), refresh_token)
				.await?),
		}
	}

	async fn acquire(&self) -> Result<IssuedToken> {
		match self.mode {
			ExchangeMode::Json => self.exchange_json(None).await,
			ExchangeMode::OAuth => Ok(self
				.facade
				.client_credentials(
					self.http_client.as_ref(),
					self.transport_mapper.as_ref(),
					self.scope.as_ref(),
				)
				.await?),
		}
	}

	// Builds the successor off-lock and saves it before it becomes visible, so a failed save
	// leaves the previous state in place.
	async fn commit(&self, issued: IssuedToken, source: TokenSource) -> Result<TokenInfo> {
		let now = self.clock.now();
		let next = self.state.read().successor(issued, now, self.clock.now_utc());

		if let Some(store) = &self.store {
			store.save(next.snapshot()).await?;
		}

		let info = next.info(now, source).ok_or(AuthExchangeError::MissingAccessToken)?;

		*self.state.write() = next;

		Ok(info)
	}

	fn record_exchange<T>(&self, op: Operation, result: &Result<T>) {
		match result {
			Ok(_) => {
				self.metrics.record_success();
				obs::record_outcome(op, OpOutcome::Success);
			},
			Err(_err) => {
				self.metrics.record_failure();
				obs::record_outcome(op, OpOutcome::Failure);
				debug_event!(op = op.as_str(), error = %_err, "Token exchange failed.");
			},
		}
	}
}
impl<C, M> Debug for TokenManager<C, M>
where
	C: ?Sized + HttpTransport,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenManager")
			.field("credentials", &self.credentials)
			.field("endpoints", &self.endpoints)
			.field("mode", &self.mode)
			.field("scope", &self.scope)
			.field("state", &*self.state.read())
			.field("store_set", &self.store.is_some())
			.finish()
	}
}

/// Builder for [`TokenManager`].
pub struct TokenManagerBuilder<C, M = DefaultTransportErrorMapper> {
	credentials: Credentials,
	endpoints: Endpoints,
	http_client: C,
	transport_mapper: M,
	mode: ExchangeMode,
	scope: Option<ScopeSet>,
	refresh_token: Option<TokenSecret>,
	access_token: Option<(TokenSecret, Option<Duration>)>,
	store: Option<Arc<dyn TokenStore>>,
	clock: Arc<dyn Clock>,
}
impl<C> TokenManagerBuilder<C>
where
	C: HttpTransport,
{
	/// Creates a builder over an explicit transport.
	pub fn new(credentials: Credentials, endpoints: Endpoints, http_client: C) -> Self {
		Self {
			credentials,
			endpoints,
			http_client,
			transport_mapper: DefaultTransportErrorMapper,
			mode: ExchangeMode::default(),
			scope: None,
			refresh_token: None,
			access_token: None,
			store: None,
			clock: Arc::new(SystemClock),
		}
	}
}
#[cfg(feature = "reqwest")]
impl<M> TokenManagerBuilder<ReqwestHttpClient, M> {
	/// Bounds each token endpoint call.
	pub fn timeout(mut self, timeout: Duration) -> Self {
		self.http_client = self.http_client.with_timeout(timeout);

		self
	}
}
impl<C, M> TokenManagerBuilder<C, M>
where
	C: HttpTransport,
	M: TransportErrorMapper<C::TransportError>,
{
	/// Swaps the transport.
	pub fn http_client<C2>(self, http_client: C2) -> TokenManagerBuilder<C2, M>
	where
		C2: HttpTransport,
		M: TransportErrorMapper<C2::TransportError>,
	{
		TokenManagerBuilder {
			credentials: self.credentials,
			endpoints: self.endpoints,
			http_client,
			transport_mapper: self.transport_mapper,
			mode: self.mode,
			scope: self.scope,
			refresh_token: self.refresh_token,
			access_token: self.access_token,
			store: self.store,
			clock: self.clock,
		}
	}

	/// Swaps the transport error mapper.
	pub fn transport_mapper<M2>(self, transport_mapper: M2) -> TokenManagerBuilder<C, M2>
	where
		M2: TransportErrorMapper<C::TransportError>,
	{
		TokenManagerBuilder {
			credentials: self.credentials,
			endpoints: self.endpoints,
			http_client: self.http_client,
			transport_mapper,
			mode: self.mode,
			scope: self.scope,
			refresh_token: self.refresh_token,
			access_token: self.access_token,
			store: self.store,
			clock: self.clock,
		}
	}

	/// Selects the token exchange wire format.
	pub fn exchange_mode(mut self, mode: ExchangeMode) -> Self {
		self.mode = mode;

		self
	}

	/// Scope requested when no refresh token is held.
	pub fn scope(mut self, scope: ScopeSet) -> Self {
		self.scope = Some(scope);

		self
	}

	/// Scope requested when no refresh token is held, parsed from any iterator.
	pub fn scopes<I, S>(self, scopes: I) -> Result<Self>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		let scope = ScopeSet::new(scopes).map_err(ConfigError::from)?;

		Ok(self.scope(scope))
	}

	/// Seeds the refresh token used by the first exchange.
	pub fn refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
		self.refresh_token = Some(TokenSecret::new(refresh_token));

		self
	}

	/// Seeds an access token obtained elsewhere, valid for `expires_in` from build time.
	pub fn access_token(
		mut self,
		access_token: impl Into<String>,
		expires_in: Option<Duration>,
	) -> Self {
		self.access_token = Some((TokenSecret::new(access_token), expires_in));

		self
	}

	/// Persists every committed exchange into `store`.
	pub fn store(mut self, store: impl 'static + TokenStore) -> Self {
		self.store = Some(Arc::new(store));

		self
	}

	/// Overrides the time source.
	pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;

		self
	}

	/// Validates the configuration and builds the manager.
	pub fn build(self) -> Result<TokenManager<C, M>> {
		if self.refresh_token.is_some() && self.scope.as_ref().is_some_and(|scope| !scope.is_empty())
		{
			return Err(ConfigError::ScopeWithRefreshToken.into());
		}

		let facade = BasicFacade::new(&self.credentials, &self.endpoints)?;
		let mut state = TokenState {
			refresh_token: self.refresh_token,
			scope: self.scope.clone(),
			..Default::default()
		};

		if let Some((access_token, expires_in)) = self.access_token {
			let issued = IssuedToken {
				access_token,
				refresh_token: None,
				expires_in,
				scope: None,
				token_type: None,
			};

			state = state.successor(issued, self.clock.now(), self.clock.now_utc());
		}

		Ok(TokenManager {
			credentials: self.credentials,
			endpoints: self.endpoints,
			mode: self.mode,
			scope: self.scope,
			http_client: Arc::new(self.http_client),
			transport_mapper: Arc::new(self.transport_mapper),
			store: self.store,
			clock: self.clock,
			facade,
			state: RwLock::new(state),
			exchange_guard: AsyncMutex::new(()),
			last_exchange: Mutex::new(ExchangeRecord::default()),
			invalidated: Mutex::new(None),
			metrics: ExchangeMetrics::default(),
		})
	}
}

// Outcome of the latest `get_token` exchange, closed while the guard is still held.
#[derive(Debug, Default)]
struct ExchangeRecord {
	attempt: u64,
	failure: Option<SharedFailure>,
}
impl ExchangeRecord {
	fn close<T>(&mut self, result: &Result<T>) {
		self.attempt = self.attempt.wrapping_add(1);
		self.failure = result.as_ref().err().map(SharedFailure::from);
	}
}

// `Error` owns boxed sources, so waiters receive a summary instead of the original.
#[derive(Clone, Debug)]
struct SharedFailure {
	status: Option<u16>,
	kind: Option<RejectionKind>,
	message: String,
}
impl SharedFailure {
	fn to_error(&self) -> AuthExchangeError {
		AuthExchangeError::Coalesced {
			status: self.status,
			kind: self.kind,
			message: self.message.clone(),
		}
	}
}
impl From<&Error> for SharedFailure {
	fn from(err: &Error) -> Self {
		let (status, kind) = match err {
			Error::AuthExchange(AuthExchangeError::Rejected { status, kind, .. }) =>
				(Some(*status), Some(*kind)),
			Error::AuthExchange(AuthExchangeError::Coalesced { status, kind, .. }) =>
				(*status, *kind),
			Error::AuthExchange(err) => (err.status(), None),
			_ => (None, None),
		};

		Self { status, kind, message: err.to_string() }
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use serde_json::Value;
	// self
	use super::*;
	use crate::{
		_preludet::*,
		clock::ManualClock,
		error::{RejectionKind, TransportError},
		store::{MemoryStore, StoreError, StoreFuture},
	};

	fn body_json(request: &oauth2::HttpRequest) -> Value {
		serde_json::from_slice(request.body()).expect("Exchange body should be JSON.")
	}

	#[tokio::test]
	async fn token_is_cached_until_expiry() {
		let clock = ManualClock::new();
		let transport = ScriptedHttpClient::new([
			ScriptedReply::token("A", 3600, Some("R")),
			ScriptedReply::token("B", 3600, None),
		]);
		let manager = build_scripted_test_manager(transport.clone(), clock.clone());
		let first = manager.get_token(false).await.expect("First exchange should succeed.");

		assert_eq!(first.access_token.expose(), "A");
		assert_eq!(first.source, TokenSource::Exchanged);

		clock.advance(Duration::from_secs(3599));

		let cached = manager.get_token(false).await.expect("Cached token should be served.");

		assert_eq!(cached.access_token.expose(), "A");
		assert_eq!(cached.source, TokenSource::Cached);
		assert_eq!(cached.expires_in, Some(Duration::from_secs(1)));
		assert_eq!(transport.requests().len(), 1);

		clock.advance(Duration::from_secs(2));

		assert!(manager.is_expired());

		let renewed = manager.get_token(false).await.expect("Expired token should renew.");

		assert_eq!(renewed.access_token.expose(), "B");
		assert_eq!(transport.requests().len(), 2);
		assert_eq!(
			body_json(&transport.requests()[1])["refreshToken"],
			Value::String("R".into()),
			"The renewal must present the held refresh token."
		);
	}

	#[tokio::test]
	async fn forced_call_exchanges_exactly_once() {
		let transport = ScriptedHttpClient::new([
			ScriptedReply::token("A", 3600, Some("R1")),
			ScriptedReply::token("B", 3600, Some("R2")),
		]);
		let manager = build_scripted_test_manager(transport.clone(), ManualClock::new());

		manager.get_token(false).await.expect("Initial exchange should succeed.");

		let forced = manager.get_token(true).await.expect("Forced exchange should succeed.");

		assert_eq!(forced.access_token.expose(), "B");
		assert_eq!(forced.source, TokenSource::Exchanged);
		assert_eq!(transport.requests().len(), 2);
		assert_eq!(manager.exchange_metrics().attempts(), 2);
		assert_eq!(manager.snapshot().refresh_token.as_ref().map(TokenSecret::expose), Some("R2"));
	}

	#[tokio::test]
	async fn concurrent_callers_share_one_exchange() {
		let transport = ScriptedHttpClient::new([
			ScriptedReply::token("A", 3600, Some("R")).delayed(Duration::from_millis(50))
		]);
		let manager =
			Arc::new(build_scripted_test_manager(transport.clone(), ManualClock::new()));
		let tasks = (0..8)
			.map(|_| {
				let manager = manager.clone();

				tokio::spawn(async move { manager.get_token(false).await })
			})
			.collect::<Vec<_>>();

		for task in tasks {
			let info = task
				.await
				.expect("Token task should not panic.")
				.expect("Every caller should observe the shared token.");

			assert_eq!(info.access_token.expose(), "A");
		}

		assert_eq!(transport.requests().len(), 1);
		assert_eq!(manager.exchange_metrics().attempts(), 1);
		assert_eq!(manager.exchange_metrics().coalesced(), 7);
	}

	#[tokio::test]
	async fn concurrent_callers_share_one_failure() {
		let transport = ScriptedHttpClient::new([ScriptedReply::with_content_type(
			503,
			"text/plain",
			"upstream unavailable",
		)
		.delayed(Duration::from_millis(50))]);
		let manager =
			Arc::new(build_scripted_test_manager(transport.clone(), ManualClock::new()));
		let tasks = (0..8)
			.map(|_| {
				let manager = manager.clone();

				tokio::spawn(async move { manager.get_token(false).await })
			})
			.collect::<Vec<_>>();
		let mut shared = 0;

		for task in tasks {
			let err = task
				.await
				.expect("Token task should not panic.")
				.expect_err("Every caller should observe the failure.");

			match err {
				Error::AuthExchange(AuthExchangeError::Rejected { status: 503, .. }) => {},
				Error::AuthExchange(AuthExchangeError::Coalesced {
					status: Some(503),
					kind: Some(RejectionKind::Transient),
					..
				}) => shared += 1,
				other => panic!("Unexpected failure: {other:?}."),
			}
		}

		assert_eq!(shared, 7);
		assert_eq!(transport.requests().len(), 1);
		assert_eq!(manager.exchange_metrics().attempts(), 1);
		assert_eq!(manager.exchange_metrics().failures(), 1);
		assert_eq!(manager.exchange_metrics().coalesced(), 7);

		transport.push(ScriptedReply::token("A", 3600, None));

		let info = manager.get_token(false).await.expect("A later call should exchange again.");

		assert_eq!(info.access_token.expose(), "A");
		assert_eq!(transport.requests().len(), 2);
	}

	#[tokio::test]
	async fn first_exchange_sends_scope_not_refresh_token() {
		let transport = ScriptedHttpClient::new([ScriptedReply::token("A", 3600, Some("R"))]);
		let manager = TokenManagerBuilder::new(
			test_credentials(),
			test_endpoints("https://zoom.test"),
			transport.clone(),
		)
		.scopes(["read"])
		.expect("Scope fixture should be valid.")
		.build()
		.expect("Scoped manager should build.");

		manager.get_token(false).await.expect("Scoped exchange should succeed.");

		let request = &transport.requests_to("/oauth/token")[0];
		let body = body_json(request);

		assert_eq!(request.method(), &oauth2::http::Method::POST);
		assert_eq!(body["clientId"], "id");
		assert_eq!(body["clientSecret"], "sec");
		assert_eq!(body["scope"], "read");
		assert!(body.get("refreshToken").is_none());
	}

	#[test]
	fn scope_and_refresh_token_conflict() {
		let err = TokenManagerBuilder::new(
			test_credentials(),
			test_endpoints("https://zoom.test"),
			ScriptedHttpClient::default(),
		)
		.refresh_token("R")
		.scopes(["read"])
		.expect("Scope fixture should be valid.")
		.build()
		.expect_err("A refresh token plus a scope must be rejected.");

		assert!(matches!(err, Error::Config(ConfigError::ScopeWithRefreshToken)));
	}

	#[tokio::test]
	async fn failed_exchange_leaves_state_untouched() {
		let clock = ManualClock::new();
		let transport = ScriptedHttpClient::new([
			ScriptedReply::token("A", 60, Some("R")),
			ScriptedReply::json(400, r#"{"reason":"Invalid Token!","error":"invalid_request"}"#),
			ScriptedReply::connection_refused(),
			ScriptedReply::json(200, r#"{"token_type":"bearer"}"#),
		]);
		let manager = build_scripted_test_manager(transport, clock.clone());

		manager.get_token(false).await.expect("Initial exchange should succeed.");

		let before = manager.snapshot();
		let rejected = manager.get_token(true).await.expect_err("A 400 must fail the exchange.");

		assert!(matches!(
			rejected,
			Error::AuthExchange(AuthExchangeError::Rejected {
				status: 400,
				kind: RejectionKind::InvalidGrant,
				..
			})
		));

		let refused = manager.get_token(true).await.expect_err("Transport failures must surface.");

		assert!(matches!(
			refused,
			Error::AuthExchange(AuthExchangeError::Transport(TransportError::Network { .. }))
		));

		let missing = manager.get_token(true).await.expect_err("Tokenless replies must fail.");

		assert!(matches!(missing, Error::AuthExchange(AuthExchangeError::MissingAccessToken)));
		assert_eq!(manager.snapshot(), before);
		assert!(!manager.is_expired(), "The previous token must survive failed renewals.");
		assert_eq!(manager.exchange_metrics().failures(), 3);
	}

	#[tokio::test]
	async fn invalidation_ignores_superseded_tokens() {
		let transport = ScriptedHttpClient::new([
			ScriptedReply::token("A", 3600, Some("R")),
			ScriptedReply::token("B", 3600, None),
		]);
		let manager = build_scripted_test_manager(transport.clone(), ManualClock::new());

		manager.get_token(false).await.expect("Initial exchange should succeed.");

		assert_eq!(manager.invalidate_token(Some("stale")), InvalidationOutcome::Superseded);
		assert_eq!(
			manager.get_token(false).await.expect("Token should stay cached.").access_token.expose(),
			"A"
		);
		assert_eq!(manager.invalidate_token(Some("A")), InvalidationOutcome::Cleared);
		assert!(manager.is_expired());
		assert_eq!(manager.invalidate_token(None), InvalidationOutcome::Empty);
		assert_eq!(
			manager.get_token(false).await.expect("Renewal should succeed.").access_token.expose(),
			"B"
		);
		assert_eq!(transport.requests().len(), 2);
	}

	#[tokio::test]
	async fn missing_lifetime_is_returned_but_not_cached() {
		let transport = ScriptedHttpClient::new([
			ScriptedReply::json(200, r#"{"access_token":"A"}"#),
			ScriptedReply::json(200, r#"{"access_token":"B"}"#),
		]);
		let manager = build_scripted_test_manager(transport, ManualClock::new());
		let first = manager.get_token(false).await.expect("Exchange should succeed.");

		assert_eq!(first.access_token.expose(), "A");
		assert_eq!(first.expires_in, None);
		assert!(manager.is_expired());
		assert_eq!(
			manager.get_token(false).await.expect("Exchange should succeed.").access_token.expose(),
			"B"
		);
	}

	#[tokio::test]
	async fn oauth_mode_uses_client_credentials_then_refresh() {
		let transport = ScriptedHttpClient::new([
			ScriptedReply::token("A", 3600, Some("R")),
			ScriptedReply::token("B", 3600, None),
		]);
		let manager = TokenManagerBuilder::new(
			test_credentials(),
			test_endpoints("https://zoom.test"),
			transport.clone(),
		)
		.exchange_mode(ExchangeMode::OAuth)
		.build()
		.expect("OAuth-mode manager should build.");

		manager.get_token(false).await.expect("Client credentials exchange should succeed.");
		manager.get_token(true).await.expect("Refresh exchange should succeed.");

		let bodies = transport
			.requests()
			.iter()
			.map(|request| String::from_utf8_lossy(request.body()).into_owned())
			.collect::<Vec<_>>();

		assert!(bodies[0].contains("grant_type=client_credentials"));
		assert!(bodies[1].contains("grant_type=refresh_token"));
		assert!(bodies[1].contains("refresh_token=R"));
	}

	#[tokio::test]
	async fn store_receives_snapshot_and_restores() {
		let store = MemoryStore::default();
		let transport = ScriptedHttpClient::new([ScriptedReply::token("A", 3600, Some("R"))]);
		let manager = TokenManagerBuilder::new(
			test_credentials(),
			test_endpoints("https://zoom.test"),
			transport,
		)
		.store(store.clone())
		.build()
		.expect("Store-backed manager should build.");

		manager.get_token(false).await.expect("Exchange should succeed.");

		assert_eq!(store.saves(), 1);

		let restored = TokenManagerBuilder::new(
			test_credentials(),
			test_endpoints("https://zoom.test"),
			ScriptedHttpClient::default(),
		)
		.store(store)
		.build()
		.expect("Second manager should build.");

		assert!(restored.restore().await.expect("Restore should succeed."));
		assert_eq!(
			restored.get_token(false).await.expect("Restored token should be cached.").source,
			TokenSource::Cached
		);
	}

	#[tokio::test]
	async fn restore_does_not_revive_an_invalidated_token() {
		let store = MemoryStore::default();
		let transport = ScriptedHttpClient::new([ScriptedReply::token("A", 3600, Some("R"))]);
		let manager = TokenManagerBuilder::new(
			test_credentials(),
			test_endpoints("https://zoom.test"),
			transport,
		)
		.store(store.clone())
		.build()
		.expect("Store-backed manager should build.");

		manager.get_token(false).await.expect("Exchange should succeed.");

		assert_eq!(manager.invalidate_token(Some("A")), InvalidationOutcome::Cleared);
		assert!(manager.restore().await.expect("Restore should succeed."));
		assert!(manager.is_expired(), "The rejected token must stay dropped.");
		assert_eq!(manager.snapshot().refresh_token.as_ref().map(TokenSecret::expose), Some("R"));
		assert_eq!(
			store
				.current()
				.and_then(|snapshot| snapshot.access_token)
				.as_ref()
				.map(TokenSecret::expose),
			Some("A")
		);
	}

	struct FailingStore;
	impl TokenStore for FailingStore {
		fn save(&self, _snapshot: TokenSnapshot) -> StoreFuture<'_, ()> {
			Box::pin(async { Err(StoreError::Backend { message: "read-only".into() }) })
		}

		fn load(&self) -> StoreFuture<'_, Option<TokenSnapshot>> {
			Box::pin(async { Ok(None) })
		}
	}

	#[tokio::test]
	async fn store_failure_prevents_commit() {
		let transport = ScriptedHttpClient::new([ScriptedReply::token("A", 3600, Some("R"))]);
		let manager = TokenManagerBuilder::new(
			test_credentials(),
			test_endpoints("https://zoom.test"),
			transport,
		)
		.store(FailingStore)
		.build()
		.expect("Manager should build.");
		let err = manager.get_token(false).await.expect_err("Store failures must surface.");

		assert!(matches!(err, Error::Storage(StoreError::Backend { .. })));
		assert!(manager.snapshot().access_token.is_none());
		assert!(!manager.restore().await.expect("Empty restore should succeed."));
	}

	#[tokio::test]
	async fn seeded_access_token_is_served_from_cache() {
		let clock = ManualClock::new();
		let manager = TokenManagerBuilder::new(
			test_credentials(),
			test_endpoints("https://zoom.test"),
			ScriptedHttpClient::default(),
		)
		.access_token("seeded", Some(Duration::from_secs(120)))
		.clock(Arc::new(clock.clone()))
		.build()
		.expect("Seeded manager should build.");
		let info = manager.get_token(false).await.expect("Seeded token should be served.");

		assert_eq!(info.access_token.expose(), "seeded");

		clock.advance(Duration::from_secs(120));

		assert!(manager.get_token(false).await.is_err(), "The empty script cannot renew.");
	}
}
