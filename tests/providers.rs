use std::sync::Arc;

use ana_router::agent_core::{Router, RouterRequest, TaskType};
use ana_router::inference::config::{ProviderConfig, ProviderKind, RouterConfig, ToolResultRole, WireProtocol};
use ana_router::inference::{
    build_chain, build_provider, FallbackChain, GenerationOptions, InferenceError, Message, ToolCall,
    ToolDefinition,
};
use ana_router::tools::builtin_registry;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn provider_config(name: &str, protocol: WireProtocol, endpoint: &str) -> ProviderConfig {
    ProviderConfig {
        name: name.into(),
        model_id: "test-model".into(),
        kind: ProviderKind::Cloud,
        protocol,
        endpoint: endpoint.into(),
        api_key: None,
        timeout_secs: 5,
        temperature: 0.3,
        max_tokens: 256,
        tool_result_role: ToolResultRole::Tool,
        accepts_model_hint: false,
        hint_models: Vec::new(),
    }
}

fn openai_text_body(text: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "model": "test-model",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": text},
            "finish_reason": "stop"
        }]
    })
}

fn openai_tool_body(tool_id: &str, tool_name: &str, args_json: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "model": "test-model",
        "choices": [{
            "index": 0,
            "message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": tool_id,
                    "type": "function",
                    "function": {"name": tool_name, "arguments": args_json}
                }]
            },
            "finish_reason": "tool_calls"
        }]
    })
}

fn time_tool() -> ToolDefinition {
    ToolDefinition::new(
        "get_time",
        "Get the current date and time",
        json!({"type": "object", "properties": {}}),
    )
}

// ─── OpenAI-compatible ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_openai_text_response_with_bearer() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({"model": "test-model", "stream": false})))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_text_body("Bonjour!")))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = provider_config("groq", WireProtocol::Openai, &format!("{}/v1", server.uri()));
    config.api_key = Some("test-key".into());
    let provider = build_provider(&config).unwrap();

    let reply = provider
        .complete(&[Message::user("salut")], &[], &GenerationOptions::default())
        .await
        .unwrap();
    assert_eq!(reply.content.as_deref(), Some("Bonjour!"));
    assert!(reply.tool_calls.is_empty());
    assert_eq!(reply.model, "test-model");
}

#[tokio::test]
async fn test_openai_tool_call_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({"tool_choice": "auto"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_tool_body(
            "call_01",
            "get_time",
            r#"{"utc":true}"#,
        )))
        .mount(&server)
        .await;

    let config = provider_config("groq", WireProtocol::Openai, &format!("{}/v1", server.uri()));
    let provider = build_provider(&config).unwrap();
    let reply = provider
        .complete(&[Message::user("quelle heure?")], &[time_tool()], &GenerationOptions::default())
        .await
        .unwrap();

    assert_eq!(reply.tool_calls.len(), 1);
    assert_eq!(reply.tool_calls[0].id, "call_01");
    assert_eq!(reply.tool_calls[0].name, "get_time");
    assert_eq!(reply.tool_calls[0].arguments, json!({"utc": true}));
}

#[tokio::test]
async fn test_openai_tool_result_sent_with_tool_role() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({
            "messages": [
                {"role": "user", "content": "quelle heure?"},
                {"role": "assistant", "content": ""},
                {"role": "tool", "content": "14:05", "tool_call_id": "call_01"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_text_body("Il est 14:05.")))
        .expect(1)
        .mount(&server)
        .await;

    let call = ToolCall {
        id: "call_01".into(),
        name: "get_time".into(),
        arguments: json!({}),
    };
    let messages = vec![
        Message::user("quelle heure?"),
        Message::assistant_with_tool_calls("", vec![call.clone()]),
        Message::tool_result(&call, "14:05"),
    ];

    let config = provider_config("groq", WireProtocol::Openai, &format!("{}/v1", server.uri()));
    let reply = build_provider(&config)
        .unwrap()
        .complete(&messages, &[time_tool()], &GenerationOptions::default())
        .await
        .unwrap();
    assert_eq!(reply.content.as_deref(), Some("Il est 14:05."));
}

#[tokio::test]
async fn test_openai_server_error_is_http_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream overloaded"))
        .mount(&server)
        .await;

    let config = provider_config("groq", WireProtocol::Openai, &format!("{}/v1", server.uri()));
    let err = build_provider(&config)
        .unwrap()
        .complete(&[Message::user("salut")], &[], &GenerationOptions::default())
        .await
        .unwrap_err();

    match err {
        InferenceError::HttpError { status, body, .. } => {
            assert_eq!(status, 500);
            assert!(body.contains("overloaded"));
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[tokio::test]
async fn test_openai_garbage_body_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
        .mount(&server)
        .await;

    let config = provider_config("groq", WireProtocol::Openai, &format!("{}/v1", server.uri()));
    let err = build_provider(&config)
        .unwrap()
        .complete(&[Message::user("salut")], &[], &GenerationOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, InferenceError::MalformedResponse { .. }));
}

// ─── Ollama ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_ollama_native_tool_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(json!({"stream": false, "options": {"num_predict": 256}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "qwen2.5-coder:7b",
            "message": {
                "role": "assistant",
                "content": "",
                "tool_calls": [{"function": {"name": "get_time", "arguments": {}}}]
            },
            "done": true
        })))
        .mount(&server)
        .await;

    let config = provider_config("ollama", WireProtocol::Ollama, &server.uri());
    let reply = build_provider(&config)
        .unwrap()
        .complete(&[Message::user("quelle heure?")], &[time_tool()], &GenerationOptions::default())
        .await
        .unwrap();

    assert_eq!(reply.model, "qwen2.5-coder:7b");
    assert_eq!(reply.tool_calls.len(), 1);
    assert_eq!(reply.tool_calls[0].name, "get_time");
    assert!(!reply.tool_calls[0].id.is_empty());
}

#[tokio::test]
async fn test_ollama_model_hint_used_when_accepted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(json!({"model": "llama3.2-vision:11b"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "llama3.2-vision:11b",
            "message": {"role": "assistant", "content": "Un chat."},
            "done": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = provider_config("ollama", WireProtocol::Ollama, &server.uri());
    config.accepts_model_hint = true;
    let options = GenerationOptions {
        model_hint: Some("llama3.2-vision:11b".into()),
        ..Default::default()
    };
    let reply = build_provider(&config)
        .unwrap()
        .complete(&[Message::user("décris l'image")], &[], &options)
        .await
        .unwrap();
    assert_eq!(reply.content.as_deref(), Some("Un chat."));
}

// ─── Chain ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_chain_falls_back_to_second_server() {
    let broken = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
        .expect(1)
        .mount(&broken)
        .await;

    let healthy = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_text_body("Salut!")))
        .expect(1)
        .mount(&healthy)
        .await;

    let providers = build_chain(&[
        provider_config("first", WireProtocol::Openai, &format!("{}/v1", broken.uri())),
        provider_config("second", WireProtocol::Openai, &format!("{}/v1", healthy.uri())),
    ])
    .unwrap();
    let chain = FallbackChain::new(providers);

    let resp = chain
        .call_with_fallback(&[Message::user("bonjour")], &[], &GenerationOptions::default())
        .await
        .unwrap();
    assert_eq!(resp.provider, "second");
    assert_eq!(resp.reply.content.as_deref(), Some("Salut!"));
    assert_eq!(resp.failed_attempts.len(), 1);
    assert_eq!(resp.failed_attempts[0].provider, "first");
}

#[tokio::test]
async fn test_unreachable_chain_reports_every_provider() {
    let providers = build_chain(&[
        provider_config("a", WireProtocol::Openai, "http://127.0.0.1:9/v1"),
        provider_config("b", WireProtocol::Ollama, "http://127.0.0.1:9"),
    ])
    .unwrap();
    let err = FallbackChain::new(providers)
        .call_with_fallback(&[Message::user("bonjour")], &[], &GenerationOptions::default())
        .await
        .unwrap_err();

    match err {
        InferenceError::AllProvidersFailed { attempted, .. } => assert_eq!(attempted, vec!["a", "b"]),
        other => panic!("unexpected: {other:?}"),
    }
}

// ─── End to end ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_router_time_question_over_http() {
    let server = MockServer::start().await;
    // Second round and synthesis both see the tool result.
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({
            "messages": [{"role": "system"}, {"role": "user"}, {"role": "assistant"}, {"role": "tool"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_text_body("Il est l'heure du goûter.")))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_tool_body("call_01", "get_time", "{}")))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    let config = RouterConfig {
        providers: vec![provider_config("local", WireProtocol::Openai, &format!("{}/v1", server.uri()))],
        ..RouterConfig::default()
    };
    let chain = FallbackChain::new(build_chain(&config.providers).unwrap());
    let router = Router::new(config, chain, builtin_registry().unwrap()).unwrap();

    let resp = router.handle(RouterRequest::new("quelle heure est-il?")).await;
    assert!(resp.success, "{:?}", resp.error);
    assert_eq!(resp.task_type, TaskType::Tools);
    assert_eq!(resp.tool_invocations.len(), 1);
    assert!(resp.tool_invocations[0].success);
    assert_eq!(resp.response.as_deref(), Some("Il est l'heure du goûter."));
    assert_eq!(resp.provider.as_deref(), Some("local"));
}

#[tokio::test]
async fn test_offline_echo_chain() {
    let chain = FallbackChain::new(vec![Arc::new(ana_router::inference::mock::MockProvider::echo("offline"))]);
    let router = Router::new(RouterConfig::default(), chain, builtin_registry().unwrap()).unwrap();
    let resp = router.handle(RouterRequest::new("raconte une histoire")).await;
    assert_eq!(resp.task_type, TaskType::Creative);
    assert_eq!(resp.response.as_deref(), Some("raconte une histoire"));
}
