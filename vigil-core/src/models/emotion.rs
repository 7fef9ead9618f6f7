use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EmotionSample {
    pub id: i64,
    pub user_id: Uuid,
    pub recorded_at: DateTime<Utc>,
    pub emotions: serde_json::Value,
}
