//! Periodic maintenance jobs.

use sqlx::PgPool;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info};

use crate::{config::SESSION_CLEANUP_INTERVAL_HOURS, store::SessionStore};

/// Spawn the expired-session sweeper. The cadence is deliberately coarse;
/// token checks already reject expired sessions, this only reclaims rows.
pub fn spawn_session_cleanup(pool: PgPool) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let interval = Duration::from_secs(SESSION_CLEANUP_INTERVAL_HOURS * 3600);
        loop {
            match SessionStore::clean_up_expired(&pool).await {
                Ok(deleted) if deleted > 0 => {
                    info!(deleted, "expired sessions cleaned up");
                }
                Ok(_) => {}
                Err(err) => {
                    error!("session cleanup failed: {err}");
                }
            }
            sleep(interval).await;
        }
    })
}
