use std::path::Path;

use anyhow::{Result, anyhow, bail};
use indicatif::ProgressStyle;
use log::info;
use opencv::core::{Mat, Vector};
use opencv::{dnn, imgcodecs};
use opencv::prelude::*;
use rand::distr::{Alphanumeric, SampleString};
use regex::Regex;

/// 将图片数据解码为 BGR 三通道图像
pub fn imdecode(data: &[u8]) -> Result<Mat> {
    if data.is_empty() {
        bail!("图片内容为空");
    }
    let buf = Vector::<u8>::from_slice(data);
    let img = imgcodecs::imdecode(&buf, imgcodecs::IMREAD_COLOR)?;
    if img.empty() {
        bail!("无法解码图片");
    }
    Ok(img)
}

/// 读取图片文件为 BGR 三通道图像
pub fn imread<P: AsRef<Path>>(path: P) -> Result<Mat> {
    let path = path.as_ref();
    let filename = path.to_str().ok_or_else(|| anyhow!("路径不是合法的 UTF-8: {}", path.display()))?;
    let img = imgcodecs::imread(filename, imgcodecs::IMREAD_COLOR)?;
    if img.empty() {
        bail!("无法读取图片: {}", path.display());
    }
    Ok(img)
}

/// 加载 ONNX 模型
pub fn load_onnx<P: AsRef<Path>>(path: P) -> Result<dnn::Net> {
    let path = path.as_ref();
    if !path.exists() {
        bail!("模型文件不存在: {}", path.display());
    }
    info!("加载模型: {}", path.display());
    let filename = path.to_str().ok_or_else(|| anyhow!("路径不是合法的 UTF-8: {}", path.display()))?;
    let net = dnn::read_net_from_onnx(filename)?;
    if net.empty()? {
        bail!("模型为空: {}", path.display());
    }
    Ok(net)
}

/// 返回张量各维度的大小
pub fn shape_of(mat: &Mat) -> Vec<usize> {
    mat.mat_size().iter().map(|&d| d as usize).collect()
}

/// 根据逗号分隔的后缀名构建忽略大小写的匹配正则
pub fn suffix_regex(suffix: &str) -> Result<Regex> {
    let re = format!("(?i)^({})$", suffix.replace(',', "|"));
    Ok(Regex::new(&re)?)
}

/// 判断上传文件的 Content-Type 是否为图片
pub fn is_image_content_type(content_type: Option<&str>) -> bool {
    content_type.is_some_and(|s| s.starts_with("image/"))
}

/// 文件名能否原样写入路径列表：非空，不含控制字符，首尾没有空白
pub fn is_clean_filename(name: &str) -> bool {
    !name.is_empty() && name.trim() == name && !name.chars().any(char::is_control)
}

/// 生成上传图片的保存文件名，格式为 `<随机串>_<原文件名>`
///
/// 原文件名只保留最后一级，避免路径穿越，并去掉控制字符与首尾空白
pub fn upload_filename(original: Option<&str>) -> String {
    let base = original
        .and_then(|name| Path::new(name).file_name())
        .and_then(|name| name.to_str())
        .map(|name| name.chars().filter(|c| !c.is_control()).collect::<String>())
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "image".to_string());
    let prefix = Alphanumeric.sample_string(&mut rand::rng(), 16);
    format!("{prefix}_{base}")
}

/// 保留指定位数的小数
pub fn round_to(value: f32, digits: i32) -> f32 {
    let scale = 10f32.powi(digits);
    (value * scale).round() / scale
}

pub fn pb_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} {msg}")
        .unwrap()
}

#[cfg(test)]
mod tests {
    use opencv::core::{CV_8UC3, Scalar};

    use super::*;

    #[test]
    fn decode_rejects_garbage() {
        assert!(imdecode(&[]).is_err());
        assert!(imdecode(b"definitely not an image").is_err());
    }

    #[test]
    fn decode_png() -> Result<()> {
        let img = Mat::new_rows_cols_with_default(6, 9, CV_8UC3, Scalar::new(10., 20., 30., 0.))?;
        let mut buf = Vector::<u8>::new();
        imgcodecs::imencode(".png", &img, &mut buf, &Vector::new())?;

        let decoded = imdecode(buf.as_slice())?;
        assert_eq!((decoded.cols(), decoded.rows()), (9, 6));
        Ok(())
    }

    #[test]
    fn suffix_matching() -> Result<()> {
        let re = suffix_regex("png,jpg,jpeg")?;
        assert!(re.is_match("PNG"));
        assert!(re.is_match("jpeg"));
        assert!(!re.is_match("jpgx"));
        assert!(!re.is_match("gif"));
        Ok(())
    }

    #[test]
    fn upload_filename_strips_directories() {
        let name = upload_filename(Some("../../etc/cat.png"));
        let (prefix, rest) = name.split_once('_').unwrap();
        assert_eq!(prefix.len(), 16);
        assert_eq!(rest, "cat.png");

        assert!(upload_filename(None).ends_with("_image"));
        assert_ne!(upload_filename(Some("a.png")), upload_filename(Some("a.png")));
    }

    #[test]
    fn upload_filename_is_clean() {
        for original in ["cat.png ", " cat.png", "ca\nt.png", "cat\r\n.png", "\tcat.png"] {
            let name = upload_filename(Some(original));
            assert!(is_clean_filename(&name), "{name:?}");
            assert!(name.ends_with("_cat.png"), "{name:?}");
        }
        assert!(upload_filename(Some(" \n ")).ends_with("_image"));

        assert!(is_clean_filename("a b.png"));
        assert!(!is_clean_filename("a.png "));
        assert!(!is_clean_filename("a\n.png"));
        assert!(!is_clean_filename(""));
    }

    #[test]
    fn content_type_check() {
        assert!(is_image_content_type(Some("image/png")));
        assert!(!is_image_content_type(Some("text/plain")));
        assert!(!is_image_content_type(None));
    }

    #[test]
    fn rounding() {
        assert_eq!(round_to(0.98765, 3), 0.988);
        assert_eq!(round_to(12.3456, 2), 12.35);
    }
}
