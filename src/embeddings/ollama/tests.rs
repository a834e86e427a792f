use super::*;
use crate::config::OllamaConfig;

fn model(name: &str) -> ModelInfo {
    ModelInfo {
        name: name.to_string(),
        size: None,
        digest: None,
        details: None,
    }
}

#[test]
fn client_configuration() {
    let config = OllamaConfig {
        protocol: "http".to_string(),
        host: "test-host".to_string(),
        port: 1234,
        embedding_model: "test-model".to_string(),
        chat_model: "chat-model".to_string(),
        batch_size: 128,
    };
    let client = OllamaClient::new(&config).expect("Failed to create client");

    assert_eq!(client.model, "test-model");
    assert_eq!(client.model_name(), "test-model");
    assert_eq!(client.batch_size, 128);
    assert_eq!(client.base_url.host_str(), Some("test-host"));
    assert_eq!(client.base_url.port(), Some(1234));
    assert_eq!(client.retry_attempts, DEFAULT_RETRY_ATTEMPTS);
}

#[test]
fn client_builder_methods() {
    let client = OllamaClient::new(&OllamaConfig::default())
        .expect("Failed to create client")
        .with_timeout(Duration::from_secs(60))
        .with_retry_attempts(5);
    assert_eq!(client.retry_attempts, 5);

    let client = client.with_retry_attempts(0);
    assert_eq!(client.retry_attempts, 1);
}

#[test]
fn untagged_model_names_mean_latest() {
    let installed = vec![model("nomic-embed-text:latest"), model("llama3.2:3b")];

    assert!(has_model(&installed, "nomic-embed-text"));
    assert!(has_model(&installed, "nomic-embed-text:latest"));
    assert!(has_model(&installed, "llama3.2:3b"));
    assert!(!has_model(&installed, "llama3.2"));
    assert!(!has_model(&installed, "mistral"));
}

#[test]
fn empty_input_needs_no_server() {
    let config = OllamaConfig {
        port: 9,
        ..OllamaConfig::default()
    };
    let client = OllamaClient::new(&config).expect("Failed to create client");

    let embeddings = client
        .generate_embeddings_batch(&[])
        .expect("empty batch should succeed");

    assert!(embeddings.is_empty());
}

mod integration_tests {
    use std::sync::Arc;

    use wiremock::{
        Mock, MockServer, Request, Respond, ResponseTemplate,
        matchers::{body_partial_json, method, path},
    };

    use super::*;
    use crate::embeddings::embed_blocking;

    /// Answers `/api/embed` with one `[length, 1.0]` vector per input
    struct LengthEmbeddings;

    impl Respond for LengthEmbeddings {
        fn respond(&self, request: &Request) -> ResponseTemplate {
            let body: serde_json::Value =
                serde_json::from_slice(&request.body).expect("request body should be JSON");
            let embeddings: Vec<Vec<f32>> = body["input"]
                .as_array()
                .expect("input should be an array")
                .iter()
                .map(|input| vec![input.as_str().unwrap_or_default().len() as f32, 1.0])
                .collect();
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "embeddings": embeddings }))
        }
    }

    fn client_for(server: &MockServer, batch_size: u32) -> OllamaClient {
        let config = OllamaConfig {
            host: server.address().ip().to_string(),
            port: server.address().port(),
            batch_size,
            ..OllamaConfig::default()
        };
        OllamaClient::new(&config).expect("Failed to create client")
    }

    fn texts(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[tokio::test]
    async fn embeddings_are_batched_and_ordered() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .and(body_partial_json(serde_json::json!({ "model": "nomic-embed-text:latest" })))
            .respond_with(LengthEmbeddings)
            .expect(3)
            .mount(&server)
            .await;

        let provider: Arc<dyn EmbeddingProvider> = Arc::new(client_for(&server, 2));
        let embeddings = embed_blocking(&provider, texts(&["a", "bb", "ccc", "dddd", "eeeee"]))
            .await
            .expect("embedding should succeed");

        let lengths: Vec<f32> = embeddings.iter().map(|embedding| embedding[0]).collect();
        assert_eq!(lengths, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[tokio::test]
    async fn count_mismatch_is_an_embedding_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "embeddings": [[0.1, 0.2]] })),
            )
            .mount(&server)
            .await;

        let provider: Arc<dyn EmbeddingProvider> = Arc::new(client_for(&server, 16));
        let result = embed_blocking(&provider, texts(&["one", "two"])).await;

        match result {
            Err(SeekifyError::Embedding(message)) => {
                assert!(message.contains("Mismatch"), "{message}");
            }
            other => panic!("expected embedding error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn inconsistent_dimensions_are_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "embeddings": [[0.1, 0.2], [0.3]] })),
            )
            .mount(&server)
            .await;

        let provider: Arc<dyn EmbeddingProvider> = Arc::new(client_for(&server, 16));
        let result = embed_blocking(&provider, texts(&["one", "two"])).await;

        assert!(matches!(result, Err(SeekifyError::Embedding(_))));
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let provider: Arc<dyn EmbeddingProvider> = Arc::new(client_for(&server, 16));
        let result = embed_blocking(&provider, texts(&["one"])).await;

        match result {
            Err(SeekifyError::Embedding(message)) => {
                assert!(message.contains("HTTP 404"), "{message}");
            }
            other => panic!("expected embedding error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn server_errors_are_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .respond_with(ResponseTemplate::new(503))
            .expect(2)
            .mount(&server)
            .await;

        let provider: Arc<dyn EmbeddingProvider> =
            Arc::new(client_for(&server, 16).with_retry_attempts(2));
        let result = embed_blocking(&provider, texts(&["one"])).await;

        assert!(matches!(result, Err(SeekifyError::Embedding(_))));
    }

    #[tokio::test]
    async fn health_check_requires_every_model() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "models": [
                    { "name": "nomic-embed-text:latest", "size": 274302450 },
                    { "name": "llama3.2:3b" }
                ]
            })))
            .mount(&server)
            .await;

        let client = client_for(&server, 16);
        let result = tokio::task::spawn_blocking(move || {
            (
                client.health_check(&["nomic-embed-text", "llama3.2:3b"]),
                client.health_check(&["mistral"]),
            )
        })
        .await
        .expect("health check task should not panic");

        assert!(result.0.is_ok());
        let error = result.1.expect_err("missing model should fail");
        assert!(error.to_string().contains("mistral"));
    }

    #[tokio::test]
    async fn health_check_fails_when_server_is_down() {
        let config = OllamaConfig {
            port: 9,
            ..OllamaConfig::default()
        };
        let client = OllamaClient::new(&config)
            .expect("Failed to create client")
            .with_retry_attempts(1);

        let result = tokio::task::spawn_blocking(move || client.health_check(&["llama3.2:3b"]))
            .await
            .expect("health check task should not panic");

        assert!(result.is_err());
    }
}
