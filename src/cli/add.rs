use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use indicatif::{ParallelProgressIterator, ProgressBar};
use rayon::prelude::*;
use tokio::task::block_in_place;
use walkdir::WalkDir;

use crate::cli::{SubCommandExtend, open_index};
use crate::config::{FeatureOptions, IMAGE_URL_PREFIX, Opts};
use crate::utils::{self, pb_style};

#[derive(Parser, Debug, Clone)]
pub struct AddCommand {
    #[command(flatten)]
    pub feature: FeatureOptions,
    /// 图片所在目录
    pub path: PathBuf,
    /// 扫描的文件后缀名，多个后缀用逗号分隔
    #[arg(short, long, default_value = "jpg,jpeg,png")]
    pub suffix: String,
}

impl SubCommandExtend for AddCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let re_suf = utils::suffix_regex(&self.suffix)?;
        let (extractor, mut index) = open_index(&opts.conf_dir, &self.feature, false)?;

        let files = WalkDir::new(&self.path)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| {
                path.extension()
                    .is_some_and(|ext| re_suf.is_match(&ext.to_string_lossy()))
            })
            .collect::<Vec<_>>();

        let pb = ProgressBar::new(files.len() as u64).with_style(pb_style());

        let features = block_in_place(|| {
            files
                .par_iter()
                .progress_with(pb.clone())
                .filter_map(|file| {
                    let result = utils::imread(file).and_then(|img| extractor.extract(&img));
                    match result {
                        Ok(features) => Some((file, features)),
                        Err(e) => {
                            pb.println(format!("[ERR] {}: {e}", file.display()));
                            None
                        }
                    }
                })
                .collect::<Vec<_>>()
        });

        let image_dir = opts.conf_dir.image_dir();
        for (file, vector) in features {
            let filename = utils::upload_filename(file.to_str());
            std::fs::copy(file, image_dir.join(&filename))?;
            index.add(&vector, format!("{IMAGE_URL_PREFIX}/{filename}"))?;
            pb.println(format!("[OK] Add {}", file.display()));
        }
        block_in_place(|| index.save())?;

        pb.finish_with_message("图片添加完成");
        println!("索引大小: {}", index.len());

        Ok(())
    }
}
