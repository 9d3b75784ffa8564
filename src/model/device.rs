use serde::{Deserialize, Serialize};

pub const DEVICE_NAME_MAX_LEN: usize = 15;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub serial: Option<String>,
    pub owner_id: u64,
    pub created_ts: i64,
}
