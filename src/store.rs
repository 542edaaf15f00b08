//! Persistence hook for token state.
//!
//! The manager saves a [`TokenSnapshot`] after every successful exchange, before the new
//! state becomes visible, and can seed itself from the last saved snapshot.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{_prelude::*, auth::TokenSnapshot};

/// Boxed future returned by [`TokenStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Storage backend for the manager's token state.
pub trait TokenStore
where
	Self: Send + Sync,
{
	/// Persists (replacing) the snapshot.
	fn save(&self, snapshot: TokenSnapshot) -> StoreFuture<'_, ()>;

	/// Returns the last saved snapshot, if any.
	fn load(&self) -> StoreFuture<'_, Option<TokenSnapshot>>;
}

/// Error type produced by [`TokenStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn store_error_converts_into_crate_error_with_source() {
		let store_error = StoreError::Backend { message: "disk full".into() };
		let error: Error = store_error.clone().into();

		assert!(matches!(error, Error::Storage(_)));
		assert!(error.to_string().contains("disk full"));

		let source =
			StdError::source(&error).expect("Crate error should expose the store error as source.");

		assert_eq!(source.to_string(), store_error.to_string());
	}
}
