//! Raw staging and CSV export

mod helpers;

use helpers::{batch, count_rows, create_test_db, memory_pool};
use starload_etl::pipeline::{run_batch, IngestOptions};
use starload_etl::query::{fetch_denormalized, write_csv};
use starload_etl::staging::stage_csv;
use std::io::Write;

#[tokio::test]
async fn test_stage_infers_column_types() {
    let (dir, pool) = create_test_db().await.unwrap();
    let path = dir.path().join("raw.csv");
    let mut file = std::fs::File::create(&path).unwrap();
    write!(
        file,
        "mal_id,score,approved,title,genres\n\
         1,9.1,True,Berserk,\"[{{\"\"name\"\": \"\"Action\"\"}}]\"\n\
         2,,false,Monster,\n"
    )
    .unwrap();
    drop(file);

    let rows = stage_csv(&pool, &path, "raw_manga").await.unwrap();
    assert_eq!(rows, 2);
    assert_eq!(count_rows(&pool, "raw_manga").await, 2);

    let types: Vec<(String, String)> =
        sqlx::query_as("SELECT name, type FROM pragma_table_info('raw_manga') ORDER BY cid")
            .fetch_all(&pool)
            .await
            .unwrap();
    assert_eq!(
        types,
        vec![
            ("mal_id".to_string(), "INTEGER".to_string()),
            ("score".to_string(), "REAL".to_string()),
            ("approved".to_string(), "BOOLEAN".to_string()),
            ("title".to_string(), "TEXT".to_string()),
            ("genres".to_string(), "TEXT".to_string()),
        ]
    );

    let score: Option<f64> = sqlx::query_scalar("SELECT score FROM raw_manga WHERE mal_id = 2")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(score, None);
}

#[tokio::test]
async fn test_stage_replaces_table() {
    let (dir, pool) = create_test_db().await.unwrap();
    let first = dir.path().join("first.csv");
    std::fs::write(&first, "a,b\n1,x\n2,y\n3,z\n").unwrap();
    let second = dir.path().join("second.csv");
    std::fs::write(&second, "c\nonly\n").unwrap();

    stage_csv(&pool, &first, "raw").await.unwrap();
    stage_csv(&pool, &second, "raw").await.unwrap();

    assert_eq!(count_rows(&pool, "raw").await, 1);
}

#[tokio::test]
async fn test_stage_rejects_bad_table_name() {
    let (dir, pool) = create_test_db().await.unwrap();
    let path = dir.path().join("raw.csv");
    std::fs::write(&path, "a\n1\n").unwrap();

    let result = stage_csv(&pool, &path, "raw; DROP TABLE dim_genres").await;
    assert!(matches!(result, Err(starload_common::Error::InvalidInput(_))));
}

#[tokio::test]
async fn test_stage_leaves_star_tables_alone() {
    let (dir, pool) = create_test_db().await.unwrap();
    run_batch(
        &pool,
        &batch("external_id,genres\n1,\"[\"\"Action\"\"]\"\n"),
        &IngestOptions::default(),
    )
    .await
    .unwrap();

    let path = dir.path().join("raw.csv");
    std::fs::write(&path, "name\nHorror\n").unwrap();
    let result = stage_csv(&pool, &path, "dim_genres").await;

    assert!(matches!(result, Err(starload_common::Error::InvalidInput(_))));
    assert_eq!(count_rows(&pool, "dim_genres").await, 1);
    assert_eq!(count_rows(&pool, "fact_entity").await, 1);
}

#[tokio::test]
async fn test_export_writes_one_line_per_entity() {
    let pool = memory_pool().await.unwrap();
    let csv = r#"external_id,title,score,published_from,genres
2,Monster,8.9,1994-12-05,"[""Mystery"",""Drama""]"
1,Berserk,9.4,,"[""Action""]"
"#;
    run_batch(&pool, &batch(csv), &IngestOptions::default()).await.unwrap();

    let rows = fetch_denormalized(&pool).await.unwrap();
    let mut out = Vec::new();
    assert_eq!(write_csv(&rows, &mut out).unwrap(), 2);

    let text = String::from_utf8(out).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("external_id,title,"));
    assert!(lines[1].starts_with("1,Berserk,"));
    assert!(lines[2].starts_with("2,Monster,"));
    assert!(lines[2].contains("1994-12-05"));
    assert!(lines[2].contains("Mystery"));
}
