use std::sync::Arc;

use anyhow::anyhow;
use tokio::sync::RwLock;

use super::error::Result;
use crate::FeatureIndex;
use crate::config::{ConfDir, HttpOptions};
use crate::db::Database;
use crate::detect::Detector;
use crate::feature::FeatureExtractor;

/// 相似图片搜索所需的模型与索引
pub struct Similarity {
    pub extractor: Arc<dyn FeatureExtractor>,
    /// 写锁内同时追加索引和路径列表
    pub index: RwLock<FeatureIndex>,
}

impl Similarity {
    pub fn new(extractor: Arc<dyn FeatureExtractor>, index: FeatureIndex) -> Self {
        Self { extractor, index: RwLock::new(index) }
    }
}

/// 应用状态
pub struct AppState {
    /// 数据库连接
    pub db: Database,
    pub conf_dir: ConfDir,
    /// 目标检测模型，未加载时 /api/analyze 返回错误
    pub detector: Option<Arc<dyn Detector>>,
    /// 特征提取模型与索引，未加载时 /api/upload 与 /api/find_similar 返回错误
    pub similarity: Option<Similarity>,
    /// HTTP 配置选项
    pub http: HttpOptions,
}

impl AppState {
    /// 创建新的应用状态
    pub fn new(
        db: Database,
        conf_dir: ConfDir,
        detector: Option<Arc<dyn Detector>>,
        similarity: Option<Similarity>,
        http: HttpOptions,
    ) -> Arc<Self> {
        Arc::new(AppState { db, conf_dir, detector, similarity, http })
    }

    pub fn detector(&self) -> Result<Arc<dyn Detector>> {
        Ok(self.detector.clone().ok_or_else(|| anyhow!("Object detection model not available."))?)
    }

    pub fn similarity(&self) -> Result<&Similarity> {
        Ok(self.similarity.as_ref().ok_or_else(|| anyhow!("Image processing model not available."))?)
    }
}
