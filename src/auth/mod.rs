//! Authentication state
//!
//! - `tokens`: the opaque bearer credential and the identity decoded from it
//! - `session`: login/logout and change notification

mod session;
mod tokens;

pub use session::{SessionState, SessionStore, LOGIN_PATH};
pub use tokens::{Credential, Identity, Role, TokenError};
