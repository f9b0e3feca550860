//! Persistence gateway, one store per aggregate.
//!
//! Stores run raw SQL and translate "no row" into `Ok(None)`; validation and
//! policy live in the service layer. Operations that must compose with other
//! writes come in a `_tx` variant taking an open transaction, so services own
//! begin/commit without the handle leaking into business code.

pub mod audit;
pub mod entity;
pub mod membership;
pub mod session;
pub mod two_factor;
pub mod user;
pub mod verification;

pub use audit::{AuditAction, AuditStore};
pub use entity::EntityStore;
pub use membership::MembershipStore;
pub use session::SessionStore;
pub use two_factor::TwoFactorStore;
pub use user::UserStore;
pub use verification::VerificationStore;

/// SQLSTATE 23505, raised on unique-constraint conflicts.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        return db_err.code().as_deref() == Some("23505");
    }
    false
}

/// Span shared by every query so traces carry the statement.
macro_rules! query_span {
    ($operation:expr, $query:expr) => {
        tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = $operation,
            db.statement = $query
        )
    };
}

pub(crate) use query_span;
