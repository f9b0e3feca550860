//! Business logic over the stores.
//!
//! Services validate business rules, own transactions, write audit entries,
//! and enqueue mail. An audit write failure fails the operation: a mutation
//! we cannot record is a mutation we refuse to confirm.

pub mod entity;
pub mod session;
pub mod two_factor;
pub mod user;

#[cfg(test)]
mod integration_tests;

pub use entity::EntityService;
pub use session::{LoginOutcome, SessionService};
pub use two_factor::{TwoFactorService, TwoFactorSetup};
pub use user::UserService;

use sqlx::PgPool;

use crate::{config::IdentityConfig, mail::MailQueue};

/// Bundle handed to the HTTP layer.
#[derive(Clone)]
pub struct Services {
    pub user: UserService,
    pub session: SessionService,
    pub two_factor: TwoFactorService,
    pub entity: EntityService,
}

impl Services {
    #[must_use]
    pub fn new(pool: PgPool, config: IdentityConfig, mail: MailQueue) -> Self {
        let user = UserService::new(pool.clone(), config.clone(), mail);
        Self {
            session: SessionService::new(pool.clone(), config.clone(), user.clone()),
            two_factor: TwoFactorService::new(pool.clone(), config),
            entity: EntityService::new(pool),
            user,
        }
    }
}
