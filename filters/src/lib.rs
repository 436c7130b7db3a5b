mod authed;
pub mod token;
mod with_db;

pub use authed::{authed, authed_with_role, Caller, Forbidden, InvalidToken, Unauthenticated};
pub use token::TokenSigner;
pub use with_db::{with_db, with_tokens};
