//! Time sources used for token expiry.
//!
//! Expiry decisions run on the monotonic clock; wall-clock time only stamps snapshots and
//! reported expiry instants.

// self
use crate::_prelude::*;

/// Source of "now" for the token manager.
pub trait Clock
where
	Self: Send + Sync,
{
	/// Monotonic now.
	fn now(&self) -> Instant;

	/// Wall-clock now.
	fn now_utc(&self) -> OffsetDateTime;
}

/// Process clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;
impl Clock for SystemClock {
	fn now(&self) -> Instant {
		Instant::now()
	}

	fn now_utc(&self) -> OffsetDateTime {
		OffsetDateTime::now_utc()
	}
}

/// Hand-driven clock for tests and simulations.
///
/// Clones share the same offset, so advancing one handle moves every handle.
#[derive(Clone, Debug)]
pub struct ManualClock {
	origin: Instant,
	origin_utc: OffsetDateTime,
	offset: Arc<Mutex<Duration>>,
}
impl ManualClock {
	/// Starts at the current process time.
	pub fn new() -> Self {
		Self::starting_at(OffsetDateTime::now_utc())
	}

	/// Starts at `origin_utc` on the wall clock.
	pub fn starting_at(origin_utc: OffsetDateTime) -> Self {
		Self { origin: Instant::now(), origin_utc, offset: Default::default() }
	}

	/// Moves the clock forward.
	pub fn advance(&self, by: Duration) {
		*self.offset.lock() += by;
	}

	/// Total time advanced so far.
	pub fn elapsed(&self) -> Duration {
		*self.offset.lock()
	}
}
impl Default for ManualClock {
	fn default() -> Self {
		Self::new()
	}
}
impl Clock for ManualClock {
	fn now(&self) -> Instant {
		self.origin + self.elapsed()
	}

	fn now_utc(&self) -> OffsetDateTime {
		let elapsed = self.elapsed();

		time::Duration::try_from(elapsed)
			.ok()
			.and_then(|elapsed| self.origin_utc.checked_add(elapsed))
			.unwrap_or(self.origin_utc)
	}
}
