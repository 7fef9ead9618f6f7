use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    Individual,
    Group,
}

impl ReportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportKind::Individual => "individual",
            ReportKind::Group => "group",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MoodReport {
    pub report_id: Uuid,
    pub project_id: Uuid,
    pub user_id: Option<Uuid>,
    pub report_type: String,
    pub report_timestamp: DateTime<Utc>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub average_emotions: serde_json::Value,
    pub mood_summary: String,
    pub processed_entries: i32,
    pub commit_count: i32,
    pub processed_user_count: Option<i32>,
    pub is_alarm: bool,
    pub alarm_message: Option<String>,
}
