use std::sync::Arc;
use std::time::Instant;

use anyhow::anyhow;
use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum_typed_multipart::{FieldData, TypedMultipart};
use log::{error, info};
use serde_json::json;
use tokio::task::block_in_place;

use super::error::{AppError, Result};
use super::state::AppState;
use super::types::*;
use crate::config::IMAGE_URL_PREFIX;
use crate::db::{HistoryItem, crud};
use crate::{metrics, suggest, utils};

/// 检查上传文件是否为图片，并解码为 BGR 图像
fn decode_upload(file: &FieldData<axum::body::Bytes>) -> Result<opencv::core::Mat> {
    if !utils::is_image_content_type(file.metadata.content_type.as_deref()) {
        return Err(AppError::bad_request(anyhow!("File provided is not an image.")));
    }
    utils::imdecode(&file.contents).map_err(AppError::bad_request)
}

/// 检测图片中的物体并给出建议
#[utoipa::path(
    post,
    path = "/api/analyze",
    request_body(content = AnalyzeForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, body = AnalyzeResponse),
        (status = 400, description = "没有上传图片或图片无法解码"),
    )
)]
pub async fn analyze_handler(
    State(state): State<Arc<AppState>>,
    data: TypedMultipart<AnalyzeRequest>,
) -> Result<Json<AnalyzeResponse>> {
    metrics::inc_request_count("analyze");
    let detector = state.detector()?;

    let image = utils::imdecode(&data.image.contents)
        .map_err(|e| AppError::bad_request(e.context("Invalid image file")))?;

    let detected_objects = block_in_place(|| detector.detect(&image))?;
    let suggestions = suggest::suggest(&detected_objects);
    metrics::observe_detection_count(detected_objects.len());

    let filename = data.image.metadata.file_name.clone().unwrap_or_default();
    info!("分析图片 {filename:?}，检测到 {} 个物体", detected_objects.len());

    // 保存失败不影响返回结果
    if let Err(e) = crud::add_analysis(&state.db, &filename, &detected_objects, &suggestions).await {
        error!("保存分析结果失败: {e:#}");
    }

    Ok(Json(AnalyzeResponse { detected_objects, suggestions }))
}

/// 获取历史分析记录，最新的在前
#[utoipa::path(
    get,
    path = "/api/history",
    responses(
        (status = 200, body = Vec<HistoryItem>),
    )
)]
pub async fn history_handler(State(state): State<Arc<AppState>>) -> Response {
    metrics::inc_request_count("history");
    let result = match crud::list_analyses(&state.db).await {
        Ok(records) => records
            .into_iter()
            .map(HistoryItem::try_from)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(anyhow::Error::from),
        Err(e) => Err(e.into()),
    };
    match result {
        Ok(items) => Json(items).into_response(),
        Err(e) => {
            error!("读取历史记录失败: {e:#}");
            let body = json!({ "error": "Could not fetch history from database" });
            (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
        }
    }
}

/// 上传图片到相似图片索引
#[utoipa::path(
    post,
    path = "/api/upload",
    request_body(content = ImageForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, body = UploadResponse),
        (status = 400, description = "上传的文件不是图片"),
    )
)]
pub async fn upload_handler(
    State(state): State<Arc<AppState>>,
    data: TypedMultipart<ImageRequest>,
) -> Result<Json<UploadResponse>> {
    metrics::inc_request_count("upload");
    let similarity = state.similarity()?;
    let image = decode_upload(&data.file)?;

    let filename = utils::upload_filename(data.file.metadata.file_name.as_deref());
    let save_path = state.conf_dir.image_dir().join(&filename);
    tokio::fs::write(&save_path, &data.file.contents).await?;

    let features = match block_in_place(|| similarity.extractor.extract(&image)) {
        Ok(features) => features,
        Err(e) => {
            error!("提取特征失败: {e:#}");
            if let Err(e) = tokio::fs::remove_file(&save_path).await {
                error!("删除图片 {} 失败: {e}", save_path.display());
            }
            return Err(e.context("Error processing image for feature extraction").into());
        }
    };

    let path = format!("{IMAGE_URL_PREFIX}/{filename}");
    let mut index = similarity.index.write().await;
    if let Err(e) = block_in_place(|| index.append(&features, &path)) {
        error!("保存索引失败: {e:#}");
        if let Err(e) = tokio::fs::remove_file(&save_path).await {
            error!("删除图片 {} 失败: {e}", save_path.display());
        }
        return Err(e.context("Error saving image to the index").into());
    }
    metrics::set_index_size(index.len());
    info!("已上传 {filename}，索引大小: {}", index.len());

    Ok(Json(UploadResponse {
        message: "Image uploaded and processed successfully".to_string(),
        filename,
        path,
        features_shape: vec![features.len()],
    }))
}

/// 搜索相似图片
#[utoipa::path(
    post,
    path = "/api/find_similar",
    params(("k" = Option<usize>, Query, description = "返回结果数量，默认为 5")),
    request_body(content = ImageForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, body = FindSimilarResponse),
        (status = 400, description = "上传的文件不是图片"),
        (status = 404, description = "索引为空"),
    )
)]
pub async fn find_similar_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FindSimilarQuery>,
    data: TypedMultipart<ImageRequest>,
) -> Result<Json<FindSimilarResponse>> {
    metrics::inc_request_count("find_similar");
    let similarity = state.similarity()?;
    if !utils::is_image_content_type(data.file.metadata.content_type.as_deref()) {
        return Err(AppError::bad_request(anyhow!("Query file is not an image.")));
    }
    if similarity.index.read().await.is_empty() {
        return Err(AppError::not_found(anyhow!(
            "Image database is empty. Please upload images first."
        )));
    }
    let image = decode_upload(&data.file)?;

    let start = Instant::now();
    let features = block_in_place(|| similarity.extractor.extract(&image))
        .map_err(|e| e.context("Error processing image for feature extraction"))?;

    let index = similarity.index.read().await;
    let results = block_in_place(|| index.search(&features, query.k))?;
    metrics::observe_search_duration(start.elapsed().as_secs_f32());
    info!("找到 {} 张相似图片", results.len());

    Ok(Json(FindSimilarResponse { message: "Search complete".to_string(), results }))
}
