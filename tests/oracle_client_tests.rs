//! Chat-completions client against a mock inference endpoint

use std::collections::HashMap;

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use nanny_diagnostics::config::OracleConfig;
use nanny_diagnostics::diagnostic::DiagnosticRequest;
use nanny_diagnostics::oracle::{ChatCompletionsClient, Oracle, OracleError};

fn client_for(server: &MockServer) -> ChatCompletionsClient {
    ChatCompletionsClient::new(OracleConfig {
        base_url: server.uri(),
        api_key: "test-key".to_string(),
        ..OracleConfig::default()
    })
}

fn completion(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [
            {"index": 0, "message": {"role": "assistant", "content": content}, "finish_reason": "stop"}
        ],
        "usage": {"prompt_tokens": 120, "completion_tokens": 80, "total_tokens": 200}
    })
}

const FENCED_REPLY: &str = "Here is the plan:\n```json\n{\"diagnosis_type\": \"memory\", \"commands\": [{\"command\": \"free -m\", \"timeout_seconds\": 5}], \"log_checks\": [{\"log_path\": \"/var/log/kern.log\", \"grep_pattern\": \"Out of memory\"}], \"next_step\": \"Inspect swap usage\"}\n```";

/// Opening round decodes a reply wrapped in a markdown fence
#[tokio::test]
async fn test_initial_round_decodes_fenced_reply() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({
            "model": "deepseek-chat",
            "max_tokens": 500,
            "stream": false
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(FENCED_REPLY)))
        .expect(1)
        .mount(&server)
        .await;

    let info = HashMap::from([("OS".to_string(), "Debian 12".to_string())]);
    let turn = client_for(&server)
        .diagnose(&DiagnosticRequest::initial("Host is swapping", info))
        .await
        .unwrap();

    assert_eq!(turn.diagnosis_type, "memory");
    assert_eq!(turn.iteration_count, 0);
    assert_eq!(turn.commands[0].command, "free -m");
    assert_eq!(turn.commands[0].timeout_seconds, 5);
    assert_eq!(turn.log_checks[0].grep_pattern, "Out of memory");
    assert_eq!(turn.next_step, "Inspect swap usage");
}

/// Follow-up rounds request the larger token budget
#[tokio::test]
async fn test_follow_up_round_uses_larger_budget() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({"max_tokens": 2048})))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(
            r#"{"diagnosis_type": "memory", "commands": [], "log_checks": [], "next_step": "done"}"#,
        )))
        .expect(1)
        .mount(&server)
        .await;

    let request = DiagnosticRequest::follow_up(
        "Host is swapping",
        vec!["Mem: 7982 7801 181".to_string()],
        2,
    );
    let turn = client_for(&server).diagnose(&request).await.unwrap();
    assert_eq!(turn.iteration_count, 2);
    assert!(turn.commands.is_empty());
}

/// Non-2xx responses become status errors
#[tokio::test]
async fn test_error_status_is_call_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .diagnose(&DiagnosticRequest::initial("x", HashMap::new()))
        .await
        .unwrap_err();
    match err {
        OracleError::Status { status, body } => {
            assert_eq!(status, 500);
            assert_eq!(body, "internal error");
        }
        other => panic!("expected status error, got {:?}", other),
    }
}

/// Refusal text is a parse failure, not a call failure
#[tokio::test]
async fn test_refusal_text_is_parse_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(completion("[ERROR] Non-Linux input.")),
        )
        .mount(&server)
        .await;

    let err = client_for(&server)
        .diagnose(&DiagnosticRequest::initial("What is the weather?", HashMap::new()))
        .await
        .unwrap_err();
    assert!(err.is_parse_error());
    assert!(err.to_string().contains("[ERROR] Non-Linux input."));
}

/// A reply with no choices is an empty response
#[tokio::test]
async fn test_missing_choices_is_empty_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .diagnose(&DiagnosticRequest::initial("x", HashMap::new()))
        .await
        .unwrap_err();
    assert!(matches!(err, OracleError::EmptyResponse));
}

/// A non-JSON body is an envelope error
#[tokio::test]
async fn test_non_json_envelope_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .diagnose(&DiagnosticRequest::initial("x", HashMap::new()))
        .await
        .unwrap_err();
    assert!(matches!(err, OracleError::Envelope(_)));
    assert!(!err.is_parse_error());
}
