//! The `verify(token) -> {subject, scopes} | error` interface the admin
//! surface authenticates against (§9). Production deployments plug in an
//! external token verifier; `StaticTokenVerifier` is the reference
//! implementation backing `ADMIN_AUTH_TOKEN`.

mod auth;

pub use auth::{AuthContext, StaticTokenVerifier, TokenVerifier};
