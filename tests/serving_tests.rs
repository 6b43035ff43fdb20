//! Serving Integration Tests
//!
//! Jobs submitted over HTTP to a worker whose engine is a stub
//! OpenAI-compatible server.

mod common;

use common::fixtures::{plain_tokenizer, templated_tokenizer};
use common::{start_engine, TestApp};
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, ResponseTemplate};

fn tokens(batch: &Value) -> Vec<String> {
    batch["choices"][0]["tokens"]
        .as_array()
        .map(|tokens| {
            tokens
                .iter()
                .filter_map(|t| t.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

#[tokio::test]
async fn test_prompt_job_returns_single_batch() {
    let engine = start_engine(&["Hello", ",", " world"], (4, 3)).await;
    let app = TestApp::new(&engine.uri(), templated_tokenizer()).await;

    let batches = app.run_sync(json!({"prompt": "Say hello"})).await;

    assert_eq!(batches.len(), 1);
    assert_eq!(tokens(&batches[0]), vec!["Hello, world"]);
    assert_eq!(batches[0]["usage"], json!({"input": 4, "output": 3}));
}

#[tokio::test]
async fn test_messages_are_formatted_with_template() {
    let engine = start_engine(&["ok"], (6, 1)).await;
    Mock::given(method("POST"))
        .and(path("/v1/completions"))
        .and(body_partial_json(json!({
            "prompt": "system: be brief\nuser: hi\nassistant:",
            "max_tokens": 8,
        })))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            common::fixtures::completion_sse(&["formatted"], (6, 1)),
            "text/event-stream",
        ))
        .with_priority(1)
        .mount(&engine)
        .await;
    let app = TestApp::new(&engine.uri(), templated_tokenizer()).await;

    let batches = app
        .run_sync(json!({
            "messages": [
                {"role": "system", "content": "be brief"},
                {"role": "user", "content": "hi"}
            ],
            "sampling_params": {"max_tokens": 8}
        }))
        .await;

    assert_eq!(tokens(&batches[0]), vec!["formatted"]);
}

#[tokio::test]
async fn test_streaming_batches_grow() {
    let deltas = ["a", "b", "c", "d", "e", "f", "g"];
    let engine = start_engine(&deltas, (1, 7)).await;
    let app = TestApp::new(&engine.uri(), templated_tokenizer()).await;

    let batches = app
        .run_sync(json!({
            "prompt": "count",
            "stream": true,
            "min_batch_size": 1,
            "max_batch_size": 4,
            "batch_size_growth_factor": 2.0
        }))
        .await;

    let sizes: Vec<usize> = batches.iter().map(|b| tokens(b).len()).collect();
    assert_eq!(sizes, vec![1, 2, 4]);
    let text: String = batches.iter().flat_map(tokens).collect();
    assert_eq!(text, "abcdefg");
    assert_eq!(batches.last().unwrap()["usage"]["output"], 7);
}

#[tokio::test]
async fn test_run_streams_ndjson() {
    let engine = start_engine(&["x", "y"], (1, 2)).await;
    let app = TestApp::new(&engine.uri(), templated_tokenizer()).await;

    let response = app
        .client()
        .post(format!("{}/run", app.url()))
        .json(&json!({"input": {"prompt": "go", "stream": true, "max_batch_size": 1}}))
        .send()
        .await
        .expect("Failed to send request");
    assert!(response.status().is_success());
    assert_eq!(response.headers()["content-type"], "application/x-ndjson");

    let body = response.text().await.expect("Failed to read body");
    let batches: Vec<Value> = body
        .lines()
        .map(|line| serde_json::from_str(line).expect("Invalid batch line"))
        .collect();
    assert_eq!(batches.len(), 2);
    assert_eq!(tokens(&batches[0]), vec!["x"]);
    assert_eq!(tokens(&batches[1]), vec!["y"]);
}

#[tokio::test]
async fn test_messages_without_template_fail_the_job() {
    let engine = start_engine(&["unused"], (0, 0)).await;
    let app = TestApp::new(&engine.uri(), plain_tokenizer()).await;

    let batches = app
        .run_sync(json!({"messages": [{"role": "user", "content": "hi"}]}))
        .await;

    assert_eq!(batches.len(), 1);
    let error = batches[0]["error"].as_str().expect("Expected an error batch");
    assert!(error.starts_with("Chat template does not exist for this model"));
}

#[tokio::test]
async fn test_string_prompt_without_template_still_formats() {
    let engine = start_engine(&["fine"], (3, 1)).await;
    let app = TestApp::new(&engine.uri(), plain_tokenizer()).await;

    let batches = app
        .run_sync(json!({"prompt": "hi", "apply_chat_template": true}))
        .await;

    assert_eq!(tokens(&batches[0]), vec!["fine"]);
}

#[tokio::test]
async fn test_engine_failure_becomes_error_batch() {
    let engine = wiremock::MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&engine)
        .await;
    let app = TestApp::new(&engine.uri(), templated_tokenizer()).await;

    let batches = app.run_sync(json!({"prompt": "hi"})).await;

    assert_eq!(batches.len(), 1);
    let error = batches[0]["error"].as_str().unwrap_or_default();
    assert!(error.contains("503"));
    assert!(error.contains("overloaded"));
}

#[tokio::test]
async fn test_openai_routes() {
    let engine = start_engine(&[], (0, 0)).await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({"model": "served-model"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "chat.completion",
            "choices": [{"message": {"role": "assistant", "content": "pong"}}]
        })))
        .mount(&engine)
        .await;
    let app = TestApp::new(&engine.uri(), templated_tokenizer()).await;

    let models = app.run_sync(json!({"openai_route": "/v1/models"})).await;
    assert_eq!(models[0]["data"][0]["id"], "served-model");

    let chat = app
        .run_sync(json!({
            "openai_route": "/v1/chat/completions",
            "openai_input": {"messages": [{"role": "user", "content": "ping"}]}
        }))
        .await;
    assert_eq!(chat[0]["choices"][0]["message"]["content"], "pong");

    let unknown = app.run_sync(json!({"openai_route": "/v1/embeddings"})).await;
    assert_eq!(unknown, vec![json!({"error": "Invalid route: /v1/embeddings"})]);
}

async fn read_concurrency(app: &TestApp) -> Option<u64> {
    let body: Value = app
        .client()
        .get(format!("{}/concurrency", app.url()))
        .send()
        .await
        .expect("Failed to send request")
        .json()
        .await
        .expect("Failed to parse JSON");
    body["max_concurrency"].as_u64()
}

#[tokio::test]
async fn test_concurrency_reflects_runtime_changes() {
    let engine = start_engine(&[], (0, 0)).await;
    let app = TestApp::new(&engine.uri(), templated_tokenizer()).await;

    assert_eq!(read_concurrency(&app).await, Some(8));
    app.ceiling.set(2);
    assert_eq!(read_concurrency(&app).await, Some(2));
}

#[tokio::test]
async fn test_invalid_job_is_rejected() {
    let engine = start_engine(&[], (0, 0)).await;
    let app = TestApp::new(&engine.uri(), templated_tokenizer()).await;

    let response = app
        .client()
        .post(format!("{}/runsync", app.url()))
        .json(&json!({"input": {"sampling_params": {}}}))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["code"], "INVALID_INPUT");
}
