//! Token material: redacted secrets, the manager-owned state, and exchange results.

pub mod exchange;
pub mod secret;
pub mod state;
