mod detr;
mod labels;

use anyhow::Result;
use opencv::core::Mat;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub use self::detr::*;
pub use self::labels::coco_label;

/// 检测到的物体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Detection {
    /// 物体类别
    pub label: String,
    /// 置信度，范围为 0 到 1
    pub confidence: f32,
    /// 边框坐标 `[x_min, y_min, x_max, y_max]`，单位为像素
    #[serde(rename = "box")]
    #[schema(value_type = Vec<f32>)]
    pub bbox: [f32; 4],
}

/// 目标检测模型
pub trait Detector: Send + Sync {
    /// 检测 BGR 图像中的物体，结果按模型输出顺序排列
    fn detect(&self, image: &Mat) -> Result<Vec<Detection>>;
}
