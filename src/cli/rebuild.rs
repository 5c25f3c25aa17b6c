use anyhow::Result;
use clap::Parser;
use tokio::task::block_in_place;

use crate::cli::{SubCommandExtend, open_index};
use crate::config::{FeatureOptions, Opts};

#[derive(Parser, Debug, Clone)]
pub struct RebuildCommand {
    #[command(flatten)]
    pub feature: FeatureOptions,
}

impl SubCommandExtend for RebuildCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let (extractor, mut index) = open_index(&opts.conf_dir, &self.feature, false)?;
        let count = block_in_place(|| index.rebuild(&opts.conf_dir.image_dir(), &*extractor))?;
        println!("索引重建完成，共 {count} 张图片");
        Ok(())
    }
}
