use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A stored upload. Rows are written once on ingest and never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Asset {
    pub id: String,
    pub filename: String,
    pub content_type: String,
    pub local_path: String,
    pub created_at: DateTime<Utc>,
}

impl Asset {
    pub fn new_id() -> String {
        Uuid::new_v4().to_string()
    }
}
