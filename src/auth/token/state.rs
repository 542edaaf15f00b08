//! Token state owned by the manager, plus the views handed to callers.

// self
use crate::{
	_prelude::*,
	auth::{IssuedToken, ScopeSet, TokenSecret},
};

/// Whether [`TokenInfo`] came from the cache or from a fresh exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenSource {
	/// Served from the held state without a token endpoint round trip by this caller.
	Cached,
	/// This caller's exchange produced the token.
	Exchanged,
}

/// Result of [`TokenState::invalidate`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvalidationOutcome {
	/// The held access token was cleared.
	Cleared,
	/// The named token is no longer the held one; nothing changed.
	Superseded,
	/// No access token was held.
	Empty,
}

/// A usable access token together with its lifetime metadata.
#[derive(Clone, Debug)]
pub struct TokenInfo {
	/// Access token to present as a bearer credential.
	pub access_token: TokenSecret,
	/// Remaining validity, when the endpoint reported a lifetime.
	pub expires_in: Option<Duration>,
	/// Wall-clock expiry, for reporting only.
	pub expires_at: Option<OffsetDateTime>,
	/// Granted scopes, when known.
	pub scope: Option<ScopeSet>,
	/// Whether a refresh token is held for the next renewal.
	pub has_refresh_token: bool,
	/// Cache hit or fresh exchange.
	pub source: TokenSource,
}

/// Mutable token state. Only the token manager writes it.
///
/// Expiry is tracked on the monotonic clock; the wall-clock fields exist for snapshots and
/// reporting.
#[derive(Clone, Default)]
pub struct TokenState {
	/// Current access token; `None` before the first exchange and after invalidation.
	pub access_token: Option<TokenSecret>,
	/// Refresh token used for the next renewal.
	pub refresh_token: Option<TokenSecret>,
	/// Granted (or requested) scopes.
	pub scope: Option<ScopeSet>,
	/// Monotonic expiry instant; `None` means the token is treated as expired.
	pub expires_at: Option<Instant>,
	/// Wall-clock mirror of `expires_at`.
	pub expires_at_utc: Option<OffsetDateTime>,
	/// Wall-clock time of the exchange that produced the access token.
	pub issued_at: Option<OffsetDateTime>,
	/// Incremented once per committed exchange.
	pub generation: u64,
}
impl TokenState {
	/// Returns `true` when no token is held, its expiry is unknown, or `expires_at <= now`.
	pub fn is_expired_at(&self, now: Instant) -> bool {
		match (&self.access_token, self.expires_at) {
			(Some(_), Some(expires_at)) => expires_at <= now,
			_ => true,
		}
	}

	/// Cached view of the held token, or `None` when it is expired at `now`.
	pub fn fresh_info(&self, now: Instant, source: TokenSource) -> Option<TokenInfo> {
		if self.is_expired_at(now) {
			return None;
		}

		self.info(now, source)
	}

	/// View of the held token regardless of expiry; `None` only when no token is held.
	pub fn info(&self, now: Instant, source: TokenSource) -> Option<TokenInfo> {
		let access_token = self.access_token.clone()?;
		let expires_in =
			self.expires_at.map(|expires_at| expires_at.saturating_duration_since(now));

		Some(TokenInfo {
			access_token,
			expires_in,
			expires_at: self.expires_at_utc,
			scope: self.scope.clone(),
			has_refresh_token: self.refresh_token.is_some(),
			source,
		})
	}

	/// Builds the successor state for an exchange answered at `now` / `now_utc`.
	///
	/// The refresh token and scope carry forward when the response omits them.
	pub fn successor(&self, issued: IssuedToken, now: Instant, now_utc: OffsetDateTime) -> Self {
		let expires_at = issued.expires_in.and_then(|lifetime| now.checked_add(lifetime));
		let expires_at_utc = issued
			.expires_in
			.and_then(|lifetime| now_utc.checked_add(lifetime.try_into().ok()?));

		Self {
			access_token: Some(issued.access_token),
			refresh_token: issued.refresh_token.or_else(|| self.refresh_token.clone()),
			scope: issued.scope.or_else(|| self.scope.clone()),
			expires_at,
			expires_at_utc,
			issued_at: Some(now_utc),
			generation: self.generation.wrapping_add(1),
		}
	}

	/// Clears the access token when `candidate` is `None` or names the held token.
	pub fn invalidate(&mut self, candidate: Option<&str>) -> InvalidationOutcome {
		let Some(held) = &self.access_token else {
			return InvalidationOutcome::Empty;
		};

		if candidate.is_some_and(|candidate| !held.matches(candidate)) {
			return InvalidationOutcome::Superseded;
		}

		self.access_token = None;
		self.expires_at = None;
		self.expires_at_utc = None;

		InvalidationOutcome::Cleared
	}

	/// Serializable copy of the state.
	pub fn snapshot(&self) -> TokenSnapshot {
		TokenSnapshot {
			access_token: self.access_token.clone(),
			refresh_token: self.refresh_token.clone(),
			scope: self.scope.clone(),
			expires_at: self.expires_at_utc,
			issued_at: self.issued_at,
		}
	}

	/// Rebuilds state from a snapshot, mapping the wall-clock expiry onto the monotonic clock.
	///
	/// An access token whose expiry already passed is dropped; the refresh token survives.
	pub fn from_snapshot(snapshot: TokenSnapshot, now: Instant, now_utc: OffsetDateTime) -> Self {
		let remaining: Option<Duration> =
			snapshot.expires_at.and_then(|expires_at| (expires_at - now_utc).try_into().ok());
		let live = remaining.filter(|remaining| !remaining.is_zero());
		let (access_token, expires_at, expires_at_utc) = match live {
			Some(remaining) => (snapshot.access_token, now.checked_add(remaining), snapshot.expires_at),
			None => (None, None, None),
		};

		Self {
			access_token,
			refresh_token: snapshot.refresh_token,
			scope: snapshot.scope,
			expires_at,
			expires_at_utc,
			issued_at: snapshot.issued_at,
			generation: 0,
		}
	}
}
impl Debug for TokenState {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenState")
			.field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("scope", &self.scope)
			.field("expires_at", &self.expires_at)
			.field("expires_at_utc", &self.expires_at_utc)
			.field("issued_at", &self.issued_at)
			.field("generation", &self.generation)
			.finish()
	}
}

/// Persisted form of [`TokenState`], written to a token store after every exchange.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSnapshot {
	/// Access token, if one was held.
	pub access_token: Option<TokenSecret>,
	/// Refresh token, if one was held.
	pub refresh_token: Option<TokenSecret>,
	/// Granted scopes.
	pub scope: Option<ScopeSet>,
	/// Wall-clock expiry of the access token.
	pub expires_at: Option<OffsetDateTime>,
	/// Wall-clock issue time of the access token.
	pub issued_at: Option<OffsetDateTime>,
}
impl Debug for TokenSnapshot {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenSnapshot")
			.field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("scope", &self.scope)
			.field("expires_at", &self.expires_at)
			.field("issued_at", &self.issued_at)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros::datetime;
	// self
	use super::*;

	fn issued(access: &str, expires_in: Option<u64>, refresh: Option<&str>) -> IssuedToken {
		IssuedToken {
			access_token: TokenSecret::new(access),
			refresh_token: refresh.map(TokenSecret::new),
			expires_in: expires_in.map(Duration::from_secs),
			scope: None,
			token_type: Some("bearer".into()),
		}
	}

	#[test]
	fn expiry_boundary_is_exclusive() {
		let t0 = Instant::now();
		let utc = datetime!(2025-01-01 00:00 UTC);
		let state = TokenState::default().successor(issued("A", Some(3600), Some("R")), t0, utc);

		assert!(!state.is_expired_at(t0 + Duration::from_secs(3599)));
		assert!(state.is_expired_at(t0 + Duration::from_secs(3600)));
		assert_eq!(state.expires_at_utc, Some(datetime!(2025-01-01 01:00 UTC)));
		assert_eq!(state.generation, 1);

		let info = state
			.fresh_info(t0 + Duration::from_secs(600), TokenSource::Cached)
			.expect("Token should still be fresh.");

		assert_eq!(info.expires_in, Some(Duration::from_secs(3000)));
		assert!(info.has_refresh_token);
	}

	#[test]
	fn missing_lifetime_is_treated_as_expired() {
		let t0 = Instant::now();
		let state = TokenState::default().successor(
			issued("A", None, None),
			t0,
			datetime!(2025-01-01 00:00 UTC),
		);

		assert!(state.is_expired_at(t0));
		assert!(state.fresh_info(t0, TokenSource::Cached).is_none());
		assert!(TokenState::default().is_expired_at(t0));
	}

	#[test]
	fn successor_keeps_refresh_token_when_omitted() {
		let t0 = Instant::now();
		let utc = datetime!(2025-01-01 00:00 UTC);
		let first = TokenState::default().successor(issued("A", Some(60), Some("R1")), t0, utc);
		let second = first.successor(issued("B", Some(60), None), t0, utc);
		let third = second.successor(issued("C", Some(60), Some("R2")), t0, utc);

		assert_eq!(second.refresh_token.as_ref().map(TokenSecret::expose), Some("R1"));
		assert_eq!(third.refresh_token.as_ref().map(TokenSecret::expose), Some("R2"));
		assert_eq!(third.generation, 3);
	}

	#[test]
	fn invalidation_only_clears_matching_token() {
		let t0 = Instant::now();
		let mut state = TokenState::default().successor(
			issued("A", Some(60), Some("R")),
			t0,
			datetime!(2025-01-01 00:00 UTC),
		);

		assert_eq!(state.invalidate(Some("stale")), InvalidationOutcome::Superseded);
		assert!(!state.is_expired_at(t0));
		assert_eq!(state.invalidate(Some("A")), InvalidationOutcome::Cleared);
		assert!(state.access_token.is_none());
		assert!(state.refresh_token.is_some(), "Invalidation keeps the refresh token.");
		assert_eq!(state.invalidate(None), InvalidationOutcome::Empty);
	}

	#[test]
	fn snapshot_restores_remaining_lifetime() {
		let t0 = Instant::now();
		let issued_utc = datetime!(2025-01-01 00:00 UTC);
		let state =
			TokenState::default().successor(issued("A", Some(3600), Some("R")), t0, issued_utc);
		let snapshot = state.snapshot();
		let restored =
			TokenState::from_snapshot(snapshot.clone(), t0, datetime!(2025-01-01 00:30 UTC));

		assert_eq!(restored.expires_at, Some(t0 + Duration::from_secs(1800)));
		assert_eq!(restored.access_token.as_ref().map(TokenSecret::expose), Some("A"));

		let stale = TokenState::from_snapshot(snapshot, t0, datetime!(2025-01-01 02:00 UTC));

		assert!(stale.access_token.is_none());
		assert_eq!(stale.refresh_token.as_ref().map(TokenSecret::expose), Some("R"));
	}
}
