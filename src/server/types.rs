use axum::body::Bytes;
use axum_typed_multipart::{FieldData, TryFromMultipart};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::detect::Detection;
use crate::index::Neighbor;

/// 图片分析请求
#[derive(TryFromMultipart)]
pub struct AnalyzeRequest {
    #[form_data(limit = "unlimited")]
    pub image: FieldData<Bytes>,
}

/// 图片分析表单（用于API文档）
#[derive(Debug, ToSchema)]
#[allow(unused)]
pub struct AnalyzeForm {
    /// 待分析的图片
    #[schema(format = Binary, content_media_type = "application/octet-stream")]
    pub image: String,
}

/// 图片分析响应
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AnalyzeResponse {
    /// 置信度高于阈值的物体
    pub detected_objects: Vec<Detection>,
    /// 针对检测结果的建议
    pub suggestions: Vec<String>,
}

/// 上传图片或以图搜图的请求
#[derive(TryFromMultipart)]
pub struct ImageRequest {
    #[form_data(limit = "unlimited")]
    pub file: FieldData<Bytes>,
}

/// 上传表单（用于API文档）
#[derive(Debug, ToSchema)]
#[allow(unused)]
pub struct ImageForm {
    /// 图片文件，Content-Type 必须为 image/*
    #[schema(format = Binary, content_media_type = "application/octet-stream")]
    pub file: String,
}

/// 上传响应
#[derive(Debug, Serialize, ToSchema)]
pub struct UploadResponse {
    pub message: String,
    /// 保存的文件名
    pub filename: String,
    /// 图片的访问路径
    pub path: String,
    /// 特征向量形状
    pub features_shape: Vec<usize>,
}

/// 相似图片搜索参数
#[derive(Debug, Deserialize)]
pub struct FindSimilarQuery {
    /// 返回结果数量
    #[serde(default = "default_k")]
    pub k: usize,
}

fn default_k() -> usize {
    5
}

/// 相似图片搜索响应
#[derive(Debug, Serialize, ToSchema)]
pub struct FindSimilarResponse {
    pub message: String,
    /// 按距离升序排列的结果
    pub results: Vec<Neighbor>,
}
