mod add;
mod analyze;
mod history;
mod rebuild;
mod search;
pub mod server;

use std::sync::Arc;

use anyhow::Result;
use log::info;
use tokio::task::block_in_place;

pub use add::*;
pub use analyze::*;
pub use history::*;
pub use rebuild::*;
pub use search::*;
pub use server::*;

use crate::FeatureIndex;
use crate::config::{ConfDir, FeatureOptions, Opts};
use crate::feature::{FeatureExtractor, ResNetExtractor};

pub trait SubCommandExtend {
    fn run(&self, opts: &Opts) -> impl std::future::Future<Output = anyhow::Result<()>> + Send;
}

/// 加载特征提取模型并打开索引，`rebuild_if_empty` 为真时使用图片目录重建空索引
fn open_index(
    conf_dir: &ConfDir,
    opts: &FeatureOptions,
    rebuild_if_empty: bool,
) -> Result<(Arc<dyn FeatureExtractor>, FeatureIndex)> {
    conf_dir.ensure()?;
    let extractor: Arc<dyn FeatureExtractor> = Arc::new(ResNetExtractor::from_options(opts)?);
    let mut index = FeatureIndex::open(conf_dir, extractor.dimensions())?;
    if rebuild_if_empty && index.is_empty() {
        block_in_place(|| index.rebuild(&conf_dir.image_dir(), &*extractor))?;
    }
    info!("索引大小: {}", index.len());
    Ok((extractor, index))
}
