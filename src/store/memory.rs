//! In-process [`TokenStore`] for tests and short-lived tools.

// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::{
	_prelude::*,
	auth::TokenSnapshot,
	store::{StoreError, StoreFuture, TokenStore},
};

/// Keeps the latest snapshot in memory. Clones share the same slot.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
	slot: Arc<RwLock<Option<TokenSnapshot>>>,
	saves: Arc<AtomicU64>,
}
impl MemoryStore {
	/// Creates a store pre-seeded with `snapshot`.
	pub fn seeded(snapshot: TokenSnapshot) -> Self {
		Self { slot: Arc::new(RwLock::new(Some(snapshot))), saves: Default::default() }
	}

	/// Latest snapshot, without going through the async contract.
	pub fn current(&self) -> Option<TokenSnapshot> {
		self.slot.read().clone()
	}

	/// Number of completed saves.
	pub fn saves(&self) -> u64 {
		self.saves.load(Ordering::Relaxed)
	}

	fn save_now(&self, snapshot: TokenSnapshot) -> Result<(), StoreError> {
		*self.slot.write() = Some(snapshot);

		self.saves.fetch_add(1, Ordering::Relaxed);

		Ok(())
	}
}
impl TokenStore for MemoryStore {
	fn save(&self, snapshot: TokenSnapshot) -> StoreFuture<'_, ()> {
		Box::pin(async move { self.save_now(snapshot) })
	}

	fn load(&self) -> StoreFuture<'_, Option<TokenSnapshot>> {
		let current = self.current();

		Box::pin(async move { Ok(current) })
	}
}
