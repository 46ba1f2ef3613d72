//! Integration tests for the chat-completion providers
//!
//! Every provider is exercised against a wiremock server; no real model
//! service is contacted.

use serde_json::json;
use wiremock::{
    matchers::{body_partial_json, header, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

use legal_mind_engine::config::{AzureOpenAIConfig, OpenAIConfig};
use legal_mind_engine::llm::{
    AzureOpenAIProvider, ChatProvider, Message, OllamaProvider, OpenAIProvider,
};
use legal_mind_engine::secrets::SecretString;
use sdk::errors::InvocationError;

fn chat_completion(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }]
    })
}

fn openai(server: &MockServer) -> OpenAIProvider {
    let config = OpenAIConfig {
        base_url: server.uri(),
        model: "gpt-4o-mini".to_string(),
        api_key_env: "OPENAI_API_KEY".to_string(),
    };
    OpenAIProvider::new(config, SecretString::new("sk-test-key"))
}

fn azure(server: &MockServer) -> AzureOpenAIProvider {
    let config = AzureOpenAIConfig {
        endpoint: server.uri(),
        deployment: "gpt-4o".to_string(),
        api_version: "2024-02-15-preview".to_string(),
        api_key_env: "AZURE_OPENAI_API_KEY".to_string(),
    };
    AzureOpenAIProvider::new(config, SecretString::new("azure-key"))
}

#[tokio::test]
async fn test_openai_generate_sends_model_and_bearer_key() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test-key"))
        .and(body_partial_json(json!({
            "model": "gpt-4o-mini",
            "messages": [{ "role": "user", "content": "Is a DPIA required?" }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_completion("Yes, under Article 35.")))
        .expect(1)
        .mount(&server)
        .await;

    let text = openai(&server)
        .generate(&[Message::user("Is a DPIA required?")])
        .await
        .unwrap();

    assert_eq!(text, "Yes, under Article 35.");
}

#[tokio::test]
async fn test_openai_maps_auth_and_rate_limit_statuses() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid key sk-test-key-abcdefghijk"))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .mount(&server)
        .await;

    let provider = openai(&server);
    let messages = [Message::user("q")];

    match provider.generate(&messages).await.unwrap_err() {
        InvocationError::Authentication(body) => assert!(!body.contains("sk-test-key-abc")),
        other => panic!("Expected Authentication, got: {:?}", other),
    }
    assert!(matches!(
        provider.generate(&messages).await.unwrap_err(),
        InvocationError::RateLimited(_)
    ));
}

#[tokio::test]
async fn test_openai_malformed_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
        .mount(&server)
        .await;

    let err = openai(&server)
        .generate(&[Message::user("q")])
        .await
        .unwrap_err();
    assert!(matches!(err, InvocationError::MalformedResponse(_)));
}

#[tokio::test]
async fn test_openai_health_check() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
        .mount(&server)
        .await;

    assert!(openai(&server).check_health().await);
}

#[tokio::test]
async fn test_azure_generate_uses_deployment_url_and_api_key_header() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/openai/deployments/gpt-4o/chat/completions"))
        .and(query_param("api-version", "2024-02-15-preview"))
        .and(header("api-key", "azure-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_completion("Compliance assessment complete.")))
        .expect(1)
        .mount(&server)
        .await;

    let text = azure(&server)
        .generate(&[Message::user("Assess our retention policy")])
        .await
        .unwrap();

    assert_eq!(text, "Compliance assessment complete.");
}

#[tokio::test]
async fn test_azure_server_error_is_provider_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/openai/deployments/gpt-4o/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let err = azure(&server)
        .generate(&[Message::user("q")])
        .await
        .unwrap_err();
    assert_eq!(
        err,
        InvocationError::Provider {
            status: 503,
            message: "overloaded".to_string()
        }
    );
}

#[tokio::test]
async fn test_ollama_generate_disables_streaming() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(json!({ "model": "llama3.1:8b", "stream": false })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "llama3.1:8b",
            "created_at": "2024-08-04T19:22:45.499127Z",
            "message": { "role": "assistant", "content": "Legal research complete." },
            "done": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let text = OllamaProvider::new(server.uri(), "llama3.1:8b")
        .generate(&[Message::user("Find precedent")])
        .await
        .unwrap();

    assert_eq!(text, "Legal research complete.");
}

#[tokio::test]
async fn test_ollama_server_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = OllamaProvider::new(server.uri(), "llama3.1:8b")
        .generate(&[Message::user("q")])
        .await
        .unwrap_err();
    assert!(matches!(err, InvocationError::Provider { status: 500, .. }));
}

#[tokio::test]
async fn test_ollama_connection_error() {
    // Nothing listens on port 9 locally
    let provider = OllamaProvider::new("http://127.0.0.1:9", "llama3.1:8b");

    let err = provider.generate(&[Message::user("Hello")]).await.unwrap_err();
    assert!(
        matches!(
            err,
            InvocationError::Unavailable(_) | InvocationError::Network(_)
        ),
        "Expected Unavailable or Network, got: {:?}",
        err
    );
    assert!(!provider.check_health().await);
}
