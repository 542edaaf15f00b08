//! Auth-domain models: client credentials, scope sets, and token state.

pub mod credentials;
pub mod scope;
pub mod token;

pub use credentials::*;
pub use scope::*;
pub use token::{exchange::*, secret::*, state::*};
