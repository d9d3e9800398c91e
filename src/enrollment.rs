// Enrollment status is a one-way machine: assigned -> started -> completed.
// Both quiz starts and lesson progress report through record_activity, so the
// transition is a guarded UPDATE that no-ops once the row has moved on.

use crate::db::Db;
use uuid::Uuid;

pub const STATUS_ASSIGNED: &str = "assigned";
pub const STATUS_STARTED: &str = "started";
pub const STATUS_COMPLETED: &str = "completed";

/// First learner activity on an enrollment: assigned -> started. Idempotent;
/// a row already started or completed is left untouched.
pub async fn record_activity(db: &Db, enrollment_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE enrollments SET status = $2, started_at = now() \
         WHERE id = $1 AND status = $3",
    )
    .bind(enrollment_id)
    .bind(STATUS_STARTED)
    .bind(STATUS_ASSIGNED)
    .execute(db)
    .await?;
    Ok(())
}

/// Terminal transition once the course requirements are met.
pub async fn record_completion(db: &Db, enrollment_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE enrollments SET status = $2, completed_at = now() \
         WHERE id = $1 AND status <> $2",
    )
    .bind(enrollment_id)
    .bind(STATUS_COMPLETED)
    .execute(db)
    .await?;
    Ok(())
}
