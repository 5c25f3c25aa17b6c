use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow, bail};
use log::debug;
use ndarray::{ArrayView2, Axis};
use opencv::core::{self, Mat, Scalar, Size, Vector};
use opencv::dnn;
use opencv::prelude::*;

use super::{Detection, Detector, coco_label};
use crate::config::DetectOptions;
use crate::utils;

/// DETR 预处理使用的 ImageNet 均值与标准差，RGB 顺序
const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// 基于 OpenCV dnn 的 DETR 检测器
///
/// 模型输入为 `[1, 3, S, S]`，输出 `logits [1, Q, C + 1]` 与 `pred_boxes [1, Q, 4]`
pub struct DetrDetector {
    net: Mutex<dnn::Net>,
    input_size: i32,
    threshold: f32,
}

impl DetrDetector {
    pub fn open<P: AsRef<Path>>(path: P, input_size: i32, threshold: f32) -> Result<Self> {
        let net = utils::load_onnx(path)?;
        Ok(Self { net: Mutex::new(net), input_size, threshold })
    }

    /// 使用命令行参数加载检测器，未指定模型时返回错误
    pub fn from_options(opts: &DetectOptions) -> Result<Self> {
        let path = opts.detector.as_ref().context("未指定检测模型，请使用 --detector 参数")?;
        Self::open(path, opts.detector_input_size, opts.threshold)
    }

    fn preprocess(&self, image: &Mat) -> Result<Mat> {
        let size = Size::new(self.input_size, self.input_size);
        let mut blob =
            dnn::blob_from_image(image, 1. / 255., size, Scalar::default(), true, false, core::CV_32F)?;
        normalize_planes(blob.data_typed_mut::<f32>()?, &IMAGENET_MEAN, &IMAGENET_STD);
        Ok(blob)
    }
}

impl Detector for DetrDetector {
    fn detect(&self, image: &Mat) -> Result<Vec<Detection>> {
        let blob = self.preprocess(image)?;

        let mut outputs = Vector::<Mat>::new();
        {
            let mut net = self.net.lock().map_err(|_| anyhow!("检测模型锁已被污染"))?;
            net.set_input(&blob, "", 1., Scalar::default())?;
            let names = net.get_unconnected_out_layers_names()?;
            net.forward(&mut outputs, &names)?;
        }

        // 两个输出的顺序不固定，通过最后一维区分边框与分类
        let (mut logits, mut boxes) = (None, None);
        for output in outputs.iter() {
            let shape = utils::shape_of(&output);
            debug!("DETR 输出形状: {shape:?}");
            match shape.last() {
                Some(4) => boxes = Some((output, shape)),
                Some(_) => logits = Some((output, shape)),
                None => {}
            }
        }
        let (logits, logits_shape) = logits.context("模型缺少 logits 输出")?;
        let (boxes, boxes_shape) = boxes.context("模型缺少 pred_boxes 输出")?;

        let queries = logits_shape[logits_shape.len().saturating_sub(2)];
        let classes = logits_shape[logits_shape.len() - 1];
        if boxes_shape[boxes_shape.len().saturating_sub(2)] != queries {
            bail!("logits 与 pred_boxes 的查询数量不一致: {logits_shape:?} / {boxes_shape:?}");
        }

        let logits = ArrayView2::from_shape((queries, classes), logits.data_typed::<f32>()?)?;
        let boxes = ArrayView2::from_shape((queries, 4), boxes.data_typed::<f32>()?)?;
        let size = (image.cols() as f32, image.rows() as f32);

        Ok(post_process(logits, boxes, size, self.threshold))
    }
}

/// 对 NCHW 张量逐通道做 `(x - mean) / std`
fn normalize_planes(data: &mut [f32], mean: &[f32; 3], std: &[f32; 3]) {
    let plane = data.len() / 3;
    if plane == 0 {
        return;
    }
    for (c, chunk) in data.chunks_exact_mut(plane).enumerate().take(3) {
        for v in chunk {
            *v = (*v - mean[c]) / std[c];
        }
    }
}

/// 将 DETR 原始输出转换为检测结果
///
/// 对每个查询做 softmax 并去掉最后的「无物体」类别，取最大类别，仅保留分数高于阈值的结果。
/// 边框从归一化的 `(cx, cy, w, h)` 转换为原图像素坐标的 `(x0, y0, x1, y1)`。
pub fn post_process(
    logits: ArrayView2<f32>,
    boxes: ArrayView2<f32>,
    (width, height): (f32, f32),
    threshold: f32,
) -> Vec<Detection> {
    let no_object = logits.ncols().saturating_sub(1);
    logits
        .axis_iter(Axis(0))
        .zip(boxes.axis_iter(Axis(0)))
        .filter_map(|(row, bbox)| {
            let max = row.fold(f32::NEG_INFINITY, |a, &b| a.max(b));
            let exp = row.mapv(|v| (v - max).exp());
            let sum = exp.sum();
            let (label, best) = exp
                .iter()
                .take(no_object)
                .enumerate()
                .fold((0, f32::NEG_INFINITY), |acc, (i, &v)| if v > acc.1 { (i, v) } else { acc });
            let score = best / sum;
            if score <= threshold {
                return None;
            }

            let (cx, cy, w, h) = (bbox[0], bbox[1], bbox[2], bbox[3]);
            let corners = [
                (cx - 0.5 * w) * width,
                (cy - 0.5 * h) * height,
                (cx + 0.5 * w) * width,
                (cy + 0.5 * h) * height,
            ];
            Some(Detection {
                label: coco_label(label),
                confidence: utils::round_to(score, 3),
                bbox: corners.map(|v| utils::round_to(v, 2)),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use ndarray::{Array2, array};

    use super::*;

    /// 构造一个在指定类别上占优的 logits 行
    fn peaked_row(classes: usize, class: usize, peak: f32) -> Vec<f32> {
        let mut row = vec![0.; classes];
        row[class] = peak;
        row
    }

    #[test]
    fn keeps_confident_queries() {
        let classes = 92;
        let mut data = peaked_row(classes, 1, 12.);
        data.extend(peaked_row(classes, 91, 12.));
        data.extend(peaked_row(classes, 62, 12.));
        let logits = Array2::from_shape_vec((3, classes), data).unwrap();
        let boxes = array![[0.5, 0.5, 0.5, 0.5], [0.1, 0.1, 0.1, 0.1], [0.25, 0.75, 0.1, 0.2]];

        let result = post_process(logits.view(), boxes.view(), (200., 100.), 0.7);

        assert_eq!(result.len(), 2);
        assert_eq!(result[0].label, "person");
        assert_eq!(result[0].bbox, [50., 25., 150., 75.]);
        assert!(result[0].confidence > 0.99 && result[0].confidence <= 1.);
        assert_eq!(result[1].label, "chair");
        assert_eq!(result[1].bbox, [40., 65., 60., 85.]);
    }

    #[test]
    fn threshold_is_exclusive() {
        // 两个类别等概率时最大概率恰好为 0.5
        let logits = array![[1., 1., f32::NEG_INFINITY]];
        let boxes = array![[0.5, 0.5, 1., 1.]];
        assert!(post_process(logits.view(), boxes.view(), (10., 10.), 0.5).is_empty());
        assert_eq!(post_process(logits.view(), boxes.view(), (10., 10.), 0.4).len(), 1);
    }

    #[test]
    fn rounds_outputs() {
        let logits = array![[0., 8., 0.]];
        let boxes = array![[0.333, 0.333, 0.111, 0.111]];
        let result = post_process(logits.view(), boxes.view(), (100., 100.), 0.5);
        assert_eq!(result[0].bbox, [27.75, 27.75, 38.85, 38.85]);
        let digits = format!("{}", result[0].confidence);
        assert!(digits.len() <= 5, "{digits}");
    }

    #[test]
    fn normalize_per_channel() {
        let mut data = vec![0.485, 0.485, 0.456, 0.456, 1., 1.];
        normalize_planes(&mut data, &IMAGENET_MEAN, &IMAGENET_STD);
        assert!(data[0].abs() < 1e-6 && data[3].abs() < 1e-6);
        assert!((data[4] - (1. - 0.406) / 0.225).abs() < 1e-5);
    }
}
