//! Client Session Guard
//! Mission: Token persistence, bearer attachment, and local login throttling

pub mod lockout;
pub mod session;

pub use lockout::{LockStatus, LoginLockout, LOCK_DURATION, MAX_ATTEMPTS};
pub use session::{ClientError, PortfolioClient, Session, SessionStore};
