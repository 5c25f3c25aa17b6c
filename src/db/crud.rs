use sqlx::{Executor, Sqlite, SqlitePool};

use super::AnalysisRecord;
use crate::detect::Detection;

/// 添加一条分析结果，返回记录 ID
pub async fn add_analysis<'c, E>(
    executor: E,
    filename: &str,
    detections: &[Detection],
    suggestions: &[String],
) -> anyhow::Result<i64>
where
    E: Executor<'c, Database = Sqlite>,
{
    let detected = serde_json::to_string(detections)?;
    let suggestions = serde_json::to_string(suggestions)?;
    let (id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO analysis_result (image_filename, detected_objects_json, suggestions_json)
        VALUES (?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(filename)
    .bind(detected)
    .bind(suggestions)
    .fetch_one(executor)
    .await?;

    Ok(id)
}

/// 获取所有分析结果，最新的在前
pub async fn list_analyses(executor: &SqlitePool) -> sqlx::Result<Vec<AnalysisRecord>> {
    sqlx::query_as(
        r#"
        SELECT id, image_filename, detected_objects_json, suggestions_json, created_at
        FROM analysis_result
        ORDER BY created_at DESC, id DESC
        "#,
    )
    .fetch_all(executor)
    .await
}

/// 查询分析结果数量
pub async fn count_analyses(executor: &SqlitePool) -> sqlx::Result<i64> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM analysis_result")
        .fetch_one(executor)
        .await?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{HistoryItem, init_db};

    fn det(label: &str, confidence: f32) -> Detection {
        Detection { label: label.to_string(), confidence, bbox: [1., 2., 3., 4.] }
    }

    #[tokio::test]
    async fn insert_and_list() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let pool = init_db(dir.path().join("test.db")).await?;
        assert_eq!(count_analyses(&pool).await?, 0);

        let first = add_analysis(&pool, "a.png", &[det("car", 0.9)], &["drive".to_string()]).await?;
        let second = add_analysis(&pool, "b.png", &[], &["default".to_string()]).await?;
        assert!(second > first);
        assert_eq!(count_analyses(&pool).await?, 2);

        let items = list_analyses(&pool)
            .await?
            .into_iter()
            .map(HistoryItem::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        assert_eq!(items[0].filename, "b.png");
        assert!(items[0].detected_objects.is_empty());
        assert_eq!(items[1].filename, "a.png");
        assert_eq!(items[1].detected_objects, vec![det("car", 0.9)]);
        assert_eq!(items[1].suggestions, vec!["drive".to_string()]);
        assert!(items[1].timestamp.ends_with('Z'));
        Ok(())
    }
}
