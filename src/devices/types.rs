use serde::{Deserialize, Serialize};

use crate::model::device::Device;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDetail {
    pub id: u64,
    pub name: String,
    pub user_id: u64,
    pub serial: Option<String>,
    pub topics: Vec<String>,
}

impl DeviceDetail {
    pub fn new(device: &Device, topics: Vec<String>) -> Self {
        Self {
            id: device.id,
            name: device.name.clone(),
            user_id: device.owner_id,
            serial: device.serial.clone(),
            topics,
        }
    }
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct TopicAdd {
    #[serde(rename = "topicsAdded")]
    pub topics_added: usize,
    pub topics: Vec<String>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct TopicRemove {
    #[serde(rename = "topicsRemoved")]
    pub topics_removed: usize,
    pub topics: Vec<String>,
}

/// Topic arguments arrive as a single name or a list; both normalize to a
/// list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TopicInput {
    One(String),
    Many(Vec<String>),
}

impl TopicInput {
    pub fn into_names(self) -> Vec<String> {
        match self {
            TopicInput::One(name) => vec![name],
            TopicInput::Many(names) => names,
        }
    }
}
