use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow, bail};
use opencv::core::{self, Mat, Scalar, Size};
use opencv::dnn;
use opencv::prelude::*;

use super::FeatureExtractor;
use crate::config::FeatureOptions;
use crate::utils;

/// Caffe 风格的 ImageNet 均值，BGR 顺序，与 Keras `preprocess_input` 一致
const CAFFE_MEAN: (f64, f64, f64) = (103.939, 116.779, 123.68);

/// 基于 OpenCV dnn 的 ResNet50 全局池化特征提取器
pub struct ResNetExtractor {
    net: Mutex<dnn::Net>,
    input_size: i32,
    dimensions: usize,
}

impl ResNetExtractor {
    pub fn open<P: AsRef<Path>>(path: P, input_size: i32, dimensions: usize) -> Result<Self> {
        let net = utils::load_onnx(path)?;
        Ok(Self { net: Mutex::new(net), input_size, dimensions })
    }

    /// 使用命令行参数加载模型，未指定模型时返回错误
    pub fn from_options(opts: &FeatureOptions) -> Result<Self> {
        let path = opts.extractor.as_ref().context("未指定特征提取模型，请使用 --extractor 参数")?;
        Self::open(path, opts.extractor_input_size, opts.dimensions)
    }
}

impl FeatureExtractor for ResNetExtractor {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn extract(&self, image: &Mat) -> Result<Vec<f32>> {
        let (b, g, r) = CAFFE_MEAN;
        let blob = dnn::blob_from_image(
            image,
            1.,
            Size::new(self.input_size, self.input_size),
            Scalar::new(b, g, r, 0.),
            false,
            false,
            core::CV_32F,
        )?;

        let output = {
            let mut net = self.net.lock().map_err(|_| anyhow!("特征提取模型锁已被污染"))?;
            net.set_input(&blob, "", 1., Scalar::default())?;
            net.forward_single("")?
        };

        let features = output.data_typed::<f32>()?.to_vec();
        if features.len() != self.dimensions {
            bail!("模型输出维数为 {}，与配置的 {} 不一致", features.len(), self.dimensions);
        }
        Ok(features)
    }
}
