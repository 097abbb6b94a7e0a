//! Scheduled maintenance of refresh token records.

use crate::db::Database;
use crate::jwt::unix_now;
use std::time::Duration;
use tracing::{error, info};

/// Interval between cleanup runs.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60); // 1 hour

/// Revoke refresh records whose stored expiry has passed. Records are kept.
pub async fn run_cleanup(db: &Database) {
    let now = match unix_now() {
        Ok(now) => now,
        Err(e) => {
            error!("Skipping cleanup: {}", e);
            return;
        }
    };

    match db.tokens().revoke_expired(now).await {
        Ok(count) if count > 0 => info!("Revoked {} expired refresh tokens", count),
        Ok(_) => {}
        Err(e) => error!("Failed to revoke expired refresh tokens: {}", e),
    }
}

/// Spawn a background task that runs cleanup periodically.
/// Returns a handle that can be used to abort the task.
pub fn spawn_cleanup_scheduler(db: Database) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
        // The first tick completes immediately; startup already ran a sweep
        interval.tick().await;

        loop {
            interval.tick().await;
            run_cleanup(&db).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cleanup_revokes_only_expired() {
        let db = Database::open(":memory:").await.unwrap();
        let now = unix_now().unwrap();

        db.tokens().create(1, "old", "jti-old", now - 10).await.unwrap();
        db.tokens().create(1, "new", "jti-new", now + 600).await.unwrap();

        run_cleanup(&db).await;

        assert!(db.tokens().find_active("old").await.unwrap().is_none());
        assert!(db.tokens().find_active("new").await.unwrap().is_some());
        assert_eq!(db.tokens().count_by_user(1).await.unwrap(), 2);
    }
}
