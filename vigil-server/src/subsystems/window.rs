//! Window resolution — the unprocessed telemetry interval per (user, project)
//!
//! The watermark is the `end_time` of the most recent individual report for
//! the pair, or the Unix epoch when none exists. A resolved window closes at
//! the newest entry actually fetched, not at wall clock, so the stored
//! watermark always reflects data that went into a report.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use vigil_core::models::EmotionSample;

use super::store;

/// One member's unprocessed telemetry interval and its entries.
#[derive(Debug, Clone)]
pub struct TelemetryWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub entries: Vec<EmotionSample>,
}

/// Close a window over already-fetched entries, newest entry last.
/// `None` when there is nothing new to process.
pub fn window_from_entries(
    watermark: DateTime<Utc>,
    entries: Vec<EmotionSample>,
) -> Option<TelemetryWindow> {
    let end = entries.last()?.recorded_at;
    Some(TelemetryWindow {
        start: watermark,
        end,
        entries,
    })
}

/// Resolve the unprocessed window for one member: entries strictly after the
/// watermark and at or before `now`, ordered by time.
pub async fn resolve_window(
    pool: &PgPool,
    user_id: Uuid,
    project_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Option<TelemetryWindow>> {
    let watermark = store::latest_individual_end(pool, user_id, project_id)
        .await?
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

    let entries = store::samples_between(pool, user_id, watermark, now).await?;

    Ok(window_from_entries(watermark, entries))
}

// ============================================================================
// TESTS
// ============================================================================
