//! Single-use authorization tokens.
//!
//! A token binds an action (settle, dispute, session bridge) to a wager so that
//! an external channel can trigger it with one link click. Tokens expire, are
//! consumed at most once, and are retired in bulk when the wager settles
//! through another path.

pub mod authority;
pub mod errors;
pub mod models;

pub use authority::{TokenAuthority, TokenRequest, hash_token};
pub use errors::{TokenError, TokenResult};
pub use models::{IssuedToken, NewToken, OneTimeToken, TokenContext, TokenKind, TokenRejection};
