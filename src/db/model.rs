use serde::Serialize;
use utoipa::ToSchema;

use crate::detect::Detection;

/// 分析结果记录，检测结果与建议以 JSON 文本保存
#[derive(Debug, sqlx::FromRow)]
pub struct AnalysisRecord {
    pub id: i64,
    /// 上传时的文件名
    pub image_filename: String,
    pub detected_objects_json: String,
    pub suggestions_json: String,
    /// UTC 时间，ISO-8601 格式
    pub created_at: String,
}

/// 历史记录条目
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HistoryItem {
    pub id: i64,
    pub filename: String,
    pub detected_objects: Vec<Detection>,
    pub suggestions: Vec<String>,
    pub timestamp: String,
}

impl TryFrom<AnalysisRecord> for HistoryItem {
    type Error = serde_json::Error;

    fn try_from(record: AnalysisRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: record.id,
            filename: record.image_filename,
            detected_objects: serde_json::from_str(&record.detected_objects_json)?,
            suggestions: serde_json::from_str(&record.suggestions_json)?,
            timestamp: record.created_at,
        })
    }
}
