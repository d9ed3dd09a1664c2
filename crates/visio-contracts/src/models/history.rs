use serde::{Deserialize, Serialize};

use super::{GenerationConfig, ImageRef};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryItem {
    pub id: String,
    pub prompt: String,
    pub images: Vec<ImageRef>,
    pub config: GenerationConfig,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_image: Option<ImageRef>,
}
