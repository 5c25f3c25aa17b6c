use std::convert::Infallible;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;

use clap::{Parser, Subcommand};
use directories::ProjectDirs;

use crate::cli::*;

/// 上传图片对外暴露的 URL 前缀，同时也是索引中保存的路径前缀
pub const IMAGE_URL_PREFIX: &str = "static/images";

static CONF_DIR: LazyLock<ConfDir> = LazyLock::new(|| {
    let proj_dirs = ProjectDirs::from("", "imvision", "imvision").expect("failed to get project dir");
    ConfDir { path: proj_dirs.config_dir().to_path_buf() }
});

fn default_config_dir() -> &'static str {
    CONF_DIR.path().to_str().unwrap()
}

#[derive(Parser, Debug, Clone)]
pub struct DetectOptions {
    /// DETR 目标检测模型路径（ONNX 格式）
    #[arg(long, value_name = "ONNX")]
    pub detector: Option<PathBuf>,
    /// 检测结果的置信度阈值，低于该值的目标会被丢弃
    #[arg(long, value_name = "SCORE", default_value_t = 0.7)]
    pub threshold: f32,
    /// 检测模型的输入尺寸，图片会被缩放为 SIZE x SIZE
    #[arg(long, value_name = "SIZE", default_value_t = 800)]
    pub detector_input_size: i32,
}

#[derive(Parser, Debug, Clone)]
pub struct FeatureOptions {
    /// ResNet50 特征提取模型路径（ONNX 格式）
    #[arg(long, value_name = "ONNX")]
    pub extractor: Option<PathBuf>,
    /// 特征向量维数，需要与模型输出一致
    #[arg(long, value_name = "N", default_value_t = 2048)]
    pub dimensions: usize,
    /// 特征提取模型的输入尺寸
    #[arg(long, value_name = "SIZE", default_value_t = 224)]
    pub extractor_input_size: i32,
}

#[derive(Parser, Debug, Clone)]
pub struct HttpOptions {
    /// 允许跨域访问的来源，可以指定多次，`*` 表示允许全部
    #[arg(long = "cors-origin", value_name = "ORIGIN", default_value = "http://localhost:3000")]
    pub cors_origins: Vec<String>,
    /// 上传大小限制，单位为 MiB
    #[arg(long, value_name = "MIB", default_value_t = 10)]
    pub max_upload: usize,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self { cors_origins: vec!["http://localhost:3000".to_string()], max_upload: 10 }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "imvision", version)]
pub struct Opts {
    #[command(subcommand)]
    pub subcmd: SubCommand,
    /// imvision 数据目录
    #[arg(short, long, default_value = default_config_dir())]
    pub conf_dir: ConfDir,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubCommand {
    /// 启动 HTTP 服务
    Server(ServerCommand),
    /// 检测一张图片中的物体并给出建议
    Analyze(AnalyzeCommand),
    /// 批量添加图片到相似图片索引
    Add(AddCommand),
    /// 从索引中搜索相似图片
    Search(SearchCommand),
    /// 显示历史分析记录
    History(HistoryCommand),
    /// 使用图片目录重建索引
    Rebuild(RebuildCommand),
}

#[derive(Debug, Clone)]
pub struct ConfDir {
    path: PathBuf,
}

impl ConfDir {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// 创建数据目录和图片目录
    pub fn ensure(&self) -> io::Result<()> {
        std::fs::create_dir_all(self.image_dir())
    }

    /// 返回数据库文件的路径
    pub fn database(&self) -> PathBuf {
        self.path.join("imvision.db")
    }

    /// 返回特征索引文件的路径
    pub fn index(&self) -> PathBuf {
        self.path.join("image_features.index")
    }

    /// 返回图片路径列表文件，行号与索引中的向量一一对应
    pub fn image_list(&self) -> PathBuf {
        self.path.join("image_list.txt")
    }

    /// 返回上传图片的保存目录
    pub fn image_dir(&self) -> PathBuf {
        self.path.join("images")
    }
}

impl FromStr for ConfDir {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self { path: PathBuf::from(s) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conf_dir_layout() {
        let conf_dir: ConfDir = "/tmp/imvision".parse().unwrap();
        assert_eq!(conf_dir.database(), PathBuf::from("/tmp/imvision/imvision.db"));
        assert_eq!(conf_dir.index(), PathBuf::from("/tmp/imvision/image_features.index"));
        assert_eq!(conf_dir.image_list(), PathBuf::from("/tmp/imvision/image_list.txt"));
        assert_eq!(conf_dir.image_dir(), PathBuf::from("/tmp/imvision/images"));
    }

    #[test]
    fn parse_server_defaults() {
        let opts = Opts::parse_from(["imvision", "-c", "/tmp/x", "server"]);
        let SubCommand::Server(server) = opts.subcmd else { panic!("expected server") };
        assert_eq!(server.addr, "127.0.0.1:5001");
        assert_eq!(server.detect.threshold, 0.7);
        assert_eq!(server.feature.dimensions, 2048);
        assert_eq!(server.http.cors_origins, vec!["http://localhost:3000".to_string()]);
        assert!(server.detect.detector.is_none());
    }
}
