use std::sync::Arc;

use anyhow::anyhow;
use clap::Parser;
use log::{error, info, warn};
use prometheus::{BasicAuthentication, labels};
use tokio::net::TcpListener;
use tokio::task::spawn_blocking;
use tokio::time::{Duration, sleep};

use crate::cli::{SubCommandExtend, open_index};
use crate::config::{DetectOptions, FeatureOptions, HttpOptions};
use crate::db::init_db;
use crate::detect::{DetrDetector, Detector};
use crate::server::{AppState, Similarity};
use crate::{Opts, metrics, server};

#[derive(Parser, Debug, Clone)]
pub struct ServerCommand {
    #[command(flatten)]
    pub detect: DetectOptions,
    #[command(flatten)]
    pub feature: FeatureOptions,
    #[command(flatten)]
    pub http: HttpOptions,
    /// 监听地址
    #[arg(long, default_value = "127.0.0.1:5001")]
    pub addr: String,
    /// prometheus 主动推送地址
    #[arg(long, value_name = "URL")]
    pub prometheus_push: Option<String>,
    /// 自定义 instance 标签值
    #[arg(long, value_name = "NAME")]
    pub prometheus_instance: Option<String>,
    /// prometheus 认证信息，格式为 username:password
    #[arg(long, value_name = "AUTH")]
    pub prometheus_auth: Option<String>,
}

impl SubCommandExtend for ServerCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        opts.conf_dir.ensure()?;
        let db = init_db(opts.conf_dir.database()).await?;

        let detector: Option<Arc<dyn Detector>> = match &self.detect.detector {
            Some(_) => Some(Arc::new(DetrDetector::from_options(&self.detect)?)),
            None => {
                warn!("未指定检测模型，/api/analyze 不可用");
                None
            }
        };

        let similarity = match &self.feature.extractor {
            Some(_) => {
                let (extractor, index) = open_index(&opts.conf_dir, &self.feature, true)?;
                metrics::set_index_size(index.len());
                Some(Similarity::new(extractor, index))
            }
            None => {
                warn!("未指定特征提取模型，/api/upload 与 /api/find_similar 不可用");
                None
            }
        };

        // 创建应用状态
        let state =
            AppState::new(db, opts.conf_dir.clone(), detector, similarity, self.http.clone());

        // 创建应用
        let app = server::create_app(state);

        if let Some(url) = self.prometheus_push.clone() {
            let instance = self.prometheus_instance.clone().unwrap_or_else(|| self.addr.clone());
            let auth = match &self.prometheus_auth {
                Some(s) => {
                    let (username, password) =
                        s.split_once(':').ok_or_else(|| anyhow!("prometheus 认证信息格式错误"))?;
                    Some((username.to_string(), password.to_string()))
                }
                None => None,
            };
            tokio::spawn(async move {
                loop {
                    let metric_families = prometheus::gather();
                    let url = url.clone();
                    let instance = instance.clone();
                    let auth = auth.clone();
                    let r = spawn_blocking(move || {
                        prometheus::push_metrics(
                            "imvision",
                            labels! {
                                "instance".to_string() => instance.clone(),
                            },
                            &url,
                            metric_families,
                            auth.map(|(username, password)| BasicAuthentication {
                                username,
                                password,
                            }),
                        )
                    })
                    .await;
                    match r {
                        Ok(Err(e)) => error!("推送指标失败: {e}"),
                        Err(e) => error!("推送任务异常退出: {e}"),
                        Ok(Ok(())) => {}
                    }
                    sleep(Duration::from_secs(30)).await;
                }
            });
        }

        // 启动服务器
        info!("服务器启动：http://{}", &self.addr);
        let listener = TcpListener::bind(&self.addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}
