mod resnet;

use anyhow::Result;
use opencv::core::Mat;

pub use self::resnet::*;

/// 图片特征提取模型
pub trait FeatureExtractor: Send + Sync {
    /// 输出特征向量的维数
    fn dimensions(&self) -> usize;

    /// 提取 BGR 图像的特征向量，长度等于 [`FeatureExtractor::dimensions`]
    fn extract(&self, image: &Mat) -> Result<Vec<f32>>;
}
