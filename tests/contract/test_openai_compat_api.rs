// Contract tests for the OpenAI-compatible chat completions and embeddings endpoints

use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ragsession::services::llm::{
    GenerateRequest, LlmError, OpenAiCompatClient, OpenAiCompatConfig, TextGenerator,
};
use ragsession::services::Embedder;

fn client(server: &MockServer) -> OpenAiCompatClient {
    let config = OpenAiCompatConfig::new(format!("{}/v1", server.uri()))
        .with_model("test-model")
        .with_timeout(Duration::from_secs(5))
        .with_max_retries(1);
    OpenAiCompatClient::new(config).unwrap()
}

fn completion(content: serde_json::Value) -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "model": "test-model",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 12, "completion_tokens": 5, "total_tokens": 17}
    })
}

#[tokio::test]
async fn test_chat_completion_contract() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({
            "model": "test-model",
            "max_tokens": 64,
            "messages": [
                {"role": "system", "content": "be brief"},
                {"role": "user", "content": "열차 정비 절차가 뭐야?"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(json!("일상점검입니다."))))
        .expect(1)
        .mount(&server)
        .await;

    let response = client(&server)
        .generate(
            GenerateRequest::new("열차 정비 절차가 뭐야?")
                .with_system_prompt("be brief")
                .with_max_tokens(64),
        )
        .await
        .unwrap();

    assert_eq!(response.text, "일상점검입니다.");
    assert_eq!(response.finish_reason.as_deref(), Some("stop"));
    assert_eq!(response.token_usage.unwrap().total_tokens, Some(17));
}

#[tokio::test]
async fn test_bearer_token_is_sent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer secret-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(json!("ok"))))
        .expect(1)
        .mount(&server)
        .await;

    let config = OpenAiCompatConfig::new(format!("{}/v1", server.uri()))
        .with_api_key("secret-key")
        .with_max_retries(0);
    let client = OpenAiCompatClient::new(config).unwrap();

    assert_eq!(client.generate(GenerateRequest::new("hi")).await.unwrap().text, "ok");
}

#[tokio::test]
async fn test_null_content_is_invalid_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(serde_json::Value::Null)))
        .mount(&server)
        .await;

    let err = client(&server)
        .generate(GenerateRequest::new("hi"))
        .await
        .unwrap_err();
    assert!(matches!(err, LlmError::InvalidResponse { .. }));
}

#[tokio::test]
async fn test_auth_failure_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server)
        .generate(GenerateRequest::new("hi"))
        .await
        .unwrap_err();
    assert!(matches!(err, LlmError::AuthenticationFailed { .. }));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_unavailable_is_retried_then_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("loading model"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(json!("ready"))))
        .expect(1)
        .mount(&server)
        .await;

    let response = client(&server)
        .generate(GenerateRequest::new("hi"))
        .await
        .unwrap();
    assert_eq!(response.text, "ready");
}

#[tokio::test]
async fn test_embeddings_are_batched_and_ordered() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .and(body_partial_json(json!({"input": ["a", "b"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {"index": 1, "embedding": [0.0, 1.0]},
                {"index": 0, "embedding": [1.0, 0.0]}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .and(body_partial_json(json!({"input": ["c"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"index": 0, "embedding": [0.5, 0.5]}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = OpenAiCompatConfig::new(format!("{}/v1", server.uri()))
        .with_embedding("embed-model", 2)
        .with_max_retries(0);
    config.embedding_batch_size = 2;
    let client = OpenAiCompatClient::new(config).unwrap();

    let texts = vec!["a".to_string(), "b".to_string(), "c".to_string()];
    let vectors = client.embed(&texts).await.unwrap();
    assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.5, 0.5]]);
}

#[tokio::test]
async fn test_embedding_dimension_mismatch_is_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"index": 0, "embedding": [1.0, 0.0, 0.0]}]
        })))
        .mount(&server)
        .await;

    let config = OpenAiCompatConfig::new(format!("{}/v1", server.uri()))
        .with_embedding("embed-model", 2)
        .with_max_retries(0);
    let client = OpenAiCompatClient::new(config).unwrap();

    let err = client.embed(&["x".to_string()]).await.unwrap_err();
    assert_eq!(err.category(), "embedding");
}
