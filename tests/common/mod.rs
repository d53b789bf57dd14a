//! Shared helpers for the wiremock-backed integration tests: a scripted
//! OpenAI-compatible chat-completions mock and the SSE body builders that
//! feed it.

use open_agent_rt::llm::endpoints::{Backend, EndpointPool};
use open_agent_rt::LlmClient;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// One `data: {...}\n\n` frame's worth of delta content.
pub struct Delta {
    pub content: Option<&'static str>,
    pub tool_call: Option<(u32, &'static str, &'static str, &'static str)>,
    pub finish_reason: Option<&'static str>,
}

impl Delta {
    pub fn text(content: &'static str) -> Self {
        Self {
            content: Some(content),
            tool_call: None,
            finish_reason: None,
        }
    }

    pub fn tool_call(index: u32, id: &'static str, name: &'static str, arguments: &'static str) -> Self {
        Self {
            content: None,
            tool_call: Some((index, id, name, arguments)),
            finish_reason: None,
        }
    }

    pub fn finish(reason: &'static str) -> Self {
        Self {
            content: None,
            tool_call: None,
            finish_reason: Some(reason),
        }
    }
}

/// Renders a sequence of [`Delta`]s into the raw SSE body a real
/// OpenAI-compatible backend would stream back.
pub fn sse_body(deltas: &[Delta]) -> String {
    let mut out = String::new();
    for delta in deltas {
        let mut fields = Vec::new();
        if let Some(content) = delta.content {
            fields.push(format!(r#""content":{}"#, serde_json::Value::String(content.to_string())));
        }
        if let Some((index, id, name, arguments)) = delta.tool_call {
            fields.push(format!(
                r#""tool_calls":[{{"index":{index},"id":{},"function":{{"name":{},"arguments":{}}}}}]"#,
                serde_json::Value::String(id.to_string()),
                serde_json::Value::String(name.to_string()),
                serde_json::Value::String(arguments.to_string()),
            ));
        }
        let delta_json = format!("{{{}}}", fields.join(","));
        let finish = match delta.finish_reason {
            Some(reason) => format!(r#""{reason}""#),
            None => "null".to_string(),
        };
        out.push_str(&format!(
            r#"data: {{"id":"chatcmpl-1","choices":[{{"delta":{delta_json},"finish_reason":{finish}}}]}}"#
        ));
        out.push_str("\n\n");
    }
    out.push_str("data: [DONE]\n\n");
    out
}

/// Starts a mock server that answers every `POST /chat/completions` call
/// with `body`, in order, one response per call (a fresh mock expectation
/// per scripted turn — the ReAct loop's continuation calls are separate
/// HTTP requests).
pub async fn mock_chat_completions(bodies: Vec<String>) -> MockServer {
    let server = MockServer::start().await;
    for body in bodies {
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
    }
    server
}

/// An [`LlmClient`] pointed at `server`.
pub fn client_for(server: &MockServer) -> LlmClient {
    LlmClient::new(EndpointPool::single(Backend::new(server.uri(), "not-needed", "test-model")))
}
