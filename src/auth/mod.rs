//! Session and action token management.
//!
//! - [`TokenStore`] - the two credentials and the readiness flag
//! - [`Authenticator`] - acquisition, single-flight coalescing and proactive refresh

mod authenticator;
mod token_store;

pub use authenticator::{AuthError, AuthSettings, Authenticator, TokenPolicy};
pub use token_store::{TokenKind, TokenStore};
