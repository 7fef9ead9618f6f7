//! Postgres access for the reporting pipeline
//!
//! All queries live here so the pipeline stages stay testable against plain
//! data. Watermarks are not stored separately: the end time of the newest
//! persisted individual report IS the watermark, so a skipped persist
//! automatically leaves the window open for the next tick.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use vigil_core::models::{EmotionSample, MoodReport, Project, ReportKind, User};

/// All projects, in stable name order.
pub async fn list_projects(pool: &PgPool) -> Result<Vec<Project>, sqlx::Error> {
    sqlx::query_as::<_, Project>(
        r#"
        SELECT project_id, name, owner_id, members, repos
        FROM projects
        ORDER BY name
        "#,
    )
    .fetch_all(pool)
    .await
}

/// Look up one member row.
pub async fn find_user(pool: &PgPool, user_id: Uuid) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(
        r#"
        SELECT user_id, username, email
        FROM users
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await
}

/// End time of the newest individual report for this member in this
/// project. `None` means the member has never been processed.
pub async fn latest_individual_end(
    pool: &PgPool,
    user_id: Uuid,
    project_id: Uuid,
) -> Result<Option<DateTime<Utc>>, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        SELECT end_time
        FROM mood_reports
        WHERE project_id = $1 AND user_id = $2 AND report_type = $3
        ORDER BY end_time DESC
        LIMIT 1
        "#,
    )
    .bind(project_id)
    .bind(user_id)
    .bind(ReportKind::Individual.as_str())
    .fetch_optional(pool)
    .await
}

/// Telemetry entries strictly after `after` and at or before `until`,
/// oldest first.
pub async fn samples_between(
    pool: &PgPool,
    user_id: Uuid,
    after: DateTime<Utc>,
    until: DateTime<Utc>,
) -> Result<Vec<EmotionSample>, sqlx::Error> {
    sqlx::query_as::<_, EmotionSample>(
        r#"
        SELECT id, user_id, recorded_at, emotions
        FROM emotion_samples
        WHERE user_id = $1 AND recorded_at > $2 AND recorded_at <= $3
        ORDER BY recorded_at ASC
        "#,
    )
    .bind(user_id)
    .bind(after)
    .bind(until)
    .fetch_all(pool)
    .await
}

/// The `limit` most recent individual reports for a member, returned oldest
/// first so the last element is the comparison baseline.
pub async fn recent_individual_reports(
    pool: &PgPool,
    user_id: Uuid,
    project_id: Uuid,
    limit: i64,
) -> Result<Vec<MoodReport>, sqlx::Error> {
    let mut reports = sqlx::query_as::<_, MoodReport>(
        r#"
        SELECT report_id, project_id, user_id, report_type, report_timestamp,
               start_time, end_time, average_emotions, mood_summary,
               processed_entries, commit_count, processed_user_count,
               is_alarm, alarm_message
        FROM mood_reports
        WHERE project_id = $1 AND user_id = $2 AND report_type = $3
        ORDER BY end_time DESC
        LIMIT $4
        "#,
    )
    .bind(project_id)
    .bind(user_id)
    .bind(ReportKind::Individual.as_str())
    .bind(limit)
    .fetch_all(pool)
    .await?;

    reports.reverse();
    Ok(reports)
}

/// Persist one finished report.
pub async fn insert_report(pool: &PgPool, report: &MoodReport) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO mood_reports (
            report_id, project_id, user_id, report_type, report_timestamp,
            start_time, end_time, average_emotions, mood_summary,
            processed_entries, commit_count, processed_user_count,
            is_alarm, alarm_message
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        "#,
    )
    .bind(report.report_id)
    .bind(report.project_id)
    .bind(report.user_id)
    .bind(&report.report_type)
    .bind(report.report_timestamp)
    .bind(report.start_time)
    .bind(report.end_time)
    .bind(&report.average_emotions)
    .bind(&report.mood_summary)
    .bind(report.processed_entries)
    .bind(report.commit_count)
    .bind(report.processed_user_count)
    .bind(report.is_alarm)
    .bind(&report.alarm_message)
    .execute(pool)
    .await?;

    Ok(())
}

/// Most recent reports for the HTTP listing, optionally scoped to one
/// project. Newest first.
pub async fn recent_reports(
    pool: &PgPool,
    project_id: Option<Uuid>,
    limit: i64,
) -> Result<Vec<MoodReport>, sqlx::Error> {
    sqlx::query_as::<_, MoodReport>(
        r#"
        SELECT report_id, project_id, user_id, report_type, report_timestamp,
               start_time, end_time, average_emotions, mood_summary,
               processed_entries, commit_count, processed_user_count,
               is_alarm, alarm_message
        FROM mood_reports
        WHERE ($1::uuid IS NULL OR project_id = $1)
        ORDER BY report_timestamp DESC
        LIMIT $2
        "#,
    )
    .bind(project_id)
    .bind(limit)
    .fetch_all(pool)
    .await
}
