use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Project {
    pub project_id: Uuid,
    pub name: String,
    pub owner_id: Uuid,
    pub members: Vec<Uuid>,
    pub repos: Vec<String>,
}
