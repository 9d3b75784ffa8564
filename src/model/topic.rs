use serde::{Deserialize, Serialize};

pub const TOPIC_NAME_MAX_LEN: usize = 15;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topic {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub unit: Option<String>,
    /// Written by the telemetry pipeline, never by this service.
    #[serde(default)]
    pub last_update: Option<i64>,
}
