pub mod auth;

pub use auth::{bearer_token, AuthenticatedUser, Claims, JwtVerifier, ADMIN_ROLE};
