use anyhow::Result;
use clap::{Parser, ValueEnum};
use tokio::task::block_in_place;

use crate::cli::{SubCommandExtend, open_index};
use crate::config::{FeatureOptions, Opts};
use crate::index::Neighbor;
use crate::utils;

#[derive(Parser, Debug, Clone)]
pub struct SearchCommand {
    #[command(flatten)]
    pub feature: FeatureOptions,
    /// 被搜索的图片路径
    pub image: String,
    /// 显示的结果数量
    #[arg(short, value_name = "K", default_value_t = 5)]
    pub k: usize,
    /// 输出格式
    #[arg(long, value_name = "FORMAT", value_enum, default_value_t = OutputFormat::Table)]
    pub output_format: OutputFormat,
}

impl SubCommandExtend for SearchCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let (extractor, index) = open_index(&opts.conf_dir, &self.feature, false)?;
        if index.is_empty() {
            anyhow::bail!("索引为空，请先添加图片");
        }

        let result = block_in_place(|| {
            let image = utils::imread(&self.image)?;
            let features = extractor.extract(&image)?;
            index.search(&features, self.k)
        })?;

        print_result(&result, self)
    }
}

fn print_result(result: &[Neighbor], opts: &SearchCommand) -> Result<()> {
    match opts.output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(result)?)
        }
        OutputFormat::Table => {
            for neighbor in result {
                println!("{:.2}\t{}", neighbor.distance, neighbor.path);
            }
        }
    }
    Ok(())
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum OutputFormat {
    Json,
    Table,
}
