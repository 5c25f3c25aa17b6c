use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow, bail};
use log::{error, info, warn};
use rayon::prelude::*;
use serde::Serialize;
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};
use utoipa::ToSchema;
use walkdir::WalkDir;

use crate::config::{ConfDir, IMAGE_URL_PREFIX};
use crate::feature::FeatureExtractor;
use crate::utils;

/// 重建索引时扫描的图片后缀
const REBUILD_SUFFIX: &str = "png,jpg,jpeg";

/// 相似图片搜索结果
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Neighbor {
    /// 图片路径
    pub path: String,
    /// 与查询向量的 L2 距离（平方），越小越相似
    pub distance: f32,
}

/// 图片特征索引
///
/// 向量 `i` 的 key 为 `i`，对应 `paths[i]`，两者只能通过 [`FeatureIndex::add`] 同时追加
pub struct FeatureIndex {
    index: Index,
    paths: Vec<String>,
    dimensions: usize,
    index_file: PathBuf,
    list_file: PathBuf,
}

impl FeatureIndex {
    fn create_index(dimensions: usize) -> Result<Index> {
        let options = IndexOptions {
            dimensions,
            metric: MetricKind::L2sq,
            quantization: ScalarKind::F32,
            connectivity: 16,
            expansion_add: 128,
            expansion_search: 64,
            ..Default::default()
        };
        Ok(Index::new(&options)?)
    }

    /// 打开索引，文件不存在时创建一个空索引
    ///
    /// 索引文件与路径列表的数量不一致时丢弃已有数据，由调用方决定是否重建
    pub fn open(conf_dir: &ConfDir, dimensions: usize) -> Result<Self> {
        let index_file = conf_dir.index();
        let list_file = conf_dir.image_list();
        let index = Self::create_index(dimensions)?;
        let mut s = Self { index, paths: vec![], dimensions, index_file, list_file };

        if !s.index_file.exists() || !s.list_file.exists() {
            info!("索引文件不存在，创建新索引");
            return Ok(s);
        }

        info!("从 {} 加载索引", s.index_file.display());
        s.index.load(path_str(&s.index_file)?)?;
        if s.index.dimensions() != dimensions {
            bail!("索引维数为 {}，与配置的 {} 不一致", s.index.dimensions(), dimensions);
        }
        s.paths = read_lines(&s.list_file)?;
        info!("索引向量数量: {}，图片路径数量: {}", s.index.size(), s.paths.len());

        if s.index.size() != s.paths.len() {
            warn!("索引与路径列表数量不一致，丢弃已有索引");
            s.index = Self::create_index(dimensions)?;
            s.paths.clear();
        }

        Ok(s)
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    fn check_dimensions(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimensions {
            bail!("向量维数为 {}，索引维数为 {}", vector.len(), self.dimensions);
        }
        Ok(())
    }

    /// 追加一条向量及其图片路径
    pub fn add(&mut self, vector: &[f32], path: impl Into<String>) -> Result<()> {
        self.check_dimensions(vector)?;
        let key = self.paths.len();
        if key >= self.index.capacity() {
            self.index.reserve((key * 2).max(64))?;
        }
        self.index.add(key as u64, vector)?;
        self.paths.push(path.into());
        Ok(())
    }

    /// 追加一条向量并立即保存，保存失败时撤销这次追加
    pub fn append(&mut self, vector: &[f32], path: impl Into<String>) -> Result<()> {
        self.add(vector, path)?;
        if let Err(e) = self.save() {
            self.truncate(self.len() - 1)?;
            return Err(e);
        }
        Ok(())
    }

    /// 只保留前 `len` 条向量
    fn truncate(&mut self, len: usize) -> Result<()> {
        let index = Self::create_index(self.dimensions)?;
        index.reserve(len.max(64))?;
        let mut buffer = vec![0f32; self.dimensions];
        for key in 0..len as u64 {
            self.index.get(key, &mut buffer)?;
            index.add(key, &buffer)?;
        }
        self.index = index;
        self.paths.truncate(len);
        Ok(())
    }

    /// 暴力搜索最接近的 `k` 个向量，结果数量不超过索引大小，按距离升序排列
    pub fn search(&self, vector: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        self.check_dimensions(vector)?;
        let k = k.min(self.len());
        if k == 0 {
            return Ok(vec![]);
        }

        let matches = self.index.exact_search(vector, k)?;
        let mut result = matches
            .keys
            .iter()
            .zip(&matches.distances)
            .filter_map(|(&key, &distance)| match self.paths.get(key as usize) {
                Some(path) => Some(Neighbor { path: path.clone(), distance }),
                None => {
                    warn!("索引返回了越界的 key: {key}");
                    None
                }
            })
            .collect::<Vec<_>>();
        result.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        Ok(result)
    }

    /// 保存索引与路径列表
    pub fn save(&self) -> Result<()> {
        let index_tmp = self.index_file.with_extension("index.tmp");
        let list_tmp = self.list_file.with_extension("txt.tmp");

        self.index.save(path_str(&index_tmp)?)?;
        let mut writer = BufWriter::new(File::create(&list_tmp)?);
        for path in &self.paths {
            writeln!(writer, "{path}")?;
        }
        writer.flush()?;
        drop(writer);

        fs::rename(&index_tmp, &self.index_file)?;
        fs::rename(&list_tmp, &self.list_file)?;
        info!("索引已保存，共 {} 张图片", self.len());
        Ok(())
    }

    /// 清空索引，使用图片目录中的所有图片重新构建并保存，返回添加的图片数量
    pub fn rebuild(&mut self, image_dir: &Path, extractor: &dyn FeatureExtractor) -> Result<usize> {
        info!("使用 {} 中的图片重建索引", image_dir.display());
        let re_suf = utils::suffix_regex(REBUILD_SUFFIX)?;

        let mut files = WalkDir::new(image_dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| {
                path.extension()
                    .is_some_and(|ext| re_suf.is_match(&ext.to_string_lossy()))
            })
            .filter(|path| {
                let valid = path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(utils::is_clean_filename);
                if !valid {
                    warn!("跳过文件名无法写入路径列表的图片: {}", path.display());
                }
                valid
            })
            .collect::<Vec<_>>();
        files.sort();

        let features = files
            .par_iter()
            .filter_map(|file| {
                let result = utils::imread(file).and_then(|img| extractor.extract(&img));
                match result {
                    Ok(features) => Some((file, features)),
                    Err(e) => {
                        error!("处理图片 {} 失败: {e}", file.display());
                        None
                    }
                }
            })
            .collect::<Vec<_>>();

        self.index = Self::create_index(self.dimensions)?;
        self.paths.clear();
        for (file, vector) in features {
            let name = file
                .file_name()
                .and_then(|name| name.to_str())
                .ok_or_else(|| anyhow!("无效的文件名: {}", file.display()))?;
            self.add(&vector, format!("{IMAGE_URL_PREFIX}/{name}"))?;
        }

        info!("索引重建完成，共 {} 张图片", self.len());
        self.save()?;
        Ok(self.len())
    }
}

fn path_str(path: &Path) -> Result<&str> {
    path.to_str().ok_or_else(|| anyhow!("路径不是合法的 UTF-8: {}", path.display()))
}

/// 每行一条路径，行内的空白原样保留
fn read_lines(path: &Path) -> Result<Vec<String>> {
    let reader = BufReader::new(File::open(path)?);
    Ok(reader.lines().collect::<Result<Vec<_>, _>>()?)
}
