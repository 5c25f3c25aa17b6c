use anyhow::Result;
use clap::Parser;
use serde_json::json;
use tokio::task::block_in_place;

use crate::cli::SubCommandExtend;
use crate::config::{DetectOptions, Opts};
use crate::db::{crud, init_db};
use crate::detect::{DetrDetector, Detector};
use crate::{suggest, utils};

#[derive(Parser, Debug, Clone)]
pub struct AnalyzeCommand {
    #[command(flatten)]
    pub detect: DetectOptions,
    /// 待分析的图片路径
    pub image: String,
    /// 同时将结果保存到历史记录
    #[arg(long)]
    pub save: bool,
}

impl SubCommandExtend for AnalyzeCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let detector = DetrDetector::from_options(&self.detect)?;
        let detected_objects = block_in_place(|| {
            let image = utils::imread(&self.image)?;
            detector.detect(&image)
        })?;
        let suggestions = suggest::suggest(&detected_objects);

        if self.save {
            std::fs::create_dir_all(opts.conf_dir.path())?;
            let db = init_db(opts.conf_dir.database()).await?;
            crud::add_analysis(&db, &self.image, &detected_objects, &suggestions).await?;
        }

        let output = json!({
            "detected_objects": detected_objects,
            "suggestions": suggestions,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        Ok(())
    }
}
