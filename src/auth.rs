//! Auth-domain identifiers, authority normalization, user identity, and token secrets.

pub mod authority;
pub mod id;
pub mod id_token;
pub mod secret;
pub mod user;

pub use authority::*;
pub use id::*;
pub use id_token::*;
pub use secret::*;
pub use user::*;
