//! Authentication Module
//! Mission: Token issuance/verification, the request gate, and the auth API

pub mod api;
pub mod jwt;
pub mod middleware;
pub mod models;
pub mod user_store;

pub use api::AuthState;
pub use jwt::{TokenError, TokenService};
pub use middleware::{optional_auth, require_admin, require_auth, AuthUser};
pub use user_store::UserStore;
