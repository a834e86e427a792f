use tempfile::TempDir;

use super::*;
use crate::generation::NO_CONTEXT_ANSWER;

fn offline_config(dir: &TempDir) -> Config {
    let mut config = Config {
        base_dir: dir.path().to_path_buf(),
        ..Config::default()
    };
    // Nothing listens on the discard port
    config.ollama.port = 9;
    config.search.endpoint = "http://127.0.0.1:9/html/".to_string();
    config.crawler.enable_js_rendering = false;
    config
}

#[tokio::test]
async fn invalid_config_is_rejected() {
    let dir = TempDir::new().expect("should create temp dir");
    let mut config = offline_config(&dir);
    config.index.top_k = 0;

    let result = Pipeline::from_config(&config).await;

    assert!(matches!(result, Err(SeekifyError::Config(_))));
}

#[tokio::test]
async fn empty_index_without_web_search_states_no_context() {
    let dir = TempDir::new().expect("should create temp dir");
    let mut pipeline = Pipeline::from_config(&offline_config(&dir))
        .await
        .expect("pipeline should build");

    let answer = pipeline
        .answer("what are mammals", false)
        .await
        .expect("answer should start")
        .collect_text()
        .await
        .expect("answer should complete");

    assert_eq!(answer, NO_CONTEXT_ANSWER);
}

#[tokio::test]
async fn unreachable_search_provider_halts_the_run() {
    let dir = TempDir::new().expect("should create temp dir");
    let mut pipeline = Pipeline::from_config(&offline_config(&dir))
        .await
        .expect("pipeline should build");

    let result = pipeline.answer("what are mammals", true).await;

    match result {
        Err(error @ SeekifyError::Discovery(_)) => {
            assert!(error.to_string().starts_with("Failed to fetch the results"));
        }
        Err(other) => panic!("expected discovery error, got {other:?}"),
        Ok(_) => panic!("expected discovery error, got an answer"),
    }
}

#[tokio::test]
async fn clear_on_fresh_index_succeeds() {
    let dir = TempDir::new().expect("should create temp dir");
    let mut pipeline = Pipeline::from_config(&offline_config(&dir))
        .await
        .expect("pipeline should build");

    pipeline.clear().await.expect("clear should succeed");

    assert_eq!(pipeline.index().count().await.expect("count should succeed"), 0);
    assert_eq!(pipeline.index().collection(), "seekify");
}
