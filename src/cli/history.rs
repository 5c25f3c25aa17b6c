use anyhow::Result;
use clap::Parser;
use log::info;

use crate::cli::SubCommandExtend;
use crate::config::Opts;
use crate::db::{HistoryItem, crud, init_db};

#[derive(Parser, Debug, Clone)]
pub struct HistoryCommand {
    /// 最多显示的记录数量
    #[arg(long, value_name = "COUNT")]
    pub limit: Option<usize>,
}

impl SubCommandExtend for HistoryCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        std::fs::create_dir_all(opts.conf_dir.path())?;
        let db = init_db(opts.conf_dir.database()).await?;
        info!("共有 {} 条分析记录", crud::count_analyses(&db).await?);
        let mut items = crud::list_analyses(&db)
            .await?
            .into_iter()
            .map(HistoryItem::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        if let Some(limit) = self.limit {
            items.truncate(limit);
        }
        println!("{}", serde_json::to_string_pretty(&items)?);
        Ok(())
    }
}
