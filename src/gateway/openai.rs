//! OpenAI-compatible chat-completions gateway (the default provider).

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::Deserialize;
use tracing::debug;

use super::http::{bearer_headers, parse_sse_data, shared_client, status_to_error};
use super::{GatewayRequest, ModelGateway};
use crate::error::{MaestroError, Result};
use crate::types::{GatewayEvent, RawUsage, Role, Turn};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Gateway speaking the OpenAI chat-completions streaming protocol.
pub struct OpenAiGateway {
    model_id: String,
    api_key: String,
    base_url: String,
}

impl OpenAiGateway {
    pub fn new(model_id: impl Into<String>, api_key: String, base_url: Option<String>) -> Self {
        Self {
            model_id: model_id.into(),
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        }
    }

    fn build_request_body(&self, request: &GatewayRequest) -> serde_json::Value {
        let mut messages = Vec::new();
        if !request.system_prompt.is_empty() {
            messages.push(serde_json::json!({
                "role": "system",
                "content": request.system_prompt,
            }));
        }
        for turn in &request.turns {
            messages.extend(encode_turn(turn));
        }

        let mut body = serde_json::json!({
            "model": self.model_id,
            "messages": messages,
            "stream": true,
            "stream_options": { "include_usage": true },
        });
        if let Some(temperature) = request.temperature {
            body["temperature"] = serde_json::json!(temperature);
        }
        if let Some(max_tokens) = request.max_output_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        if let Some(effort) = request.reasoning_effort {
            body["reasoning_effort"] = serde_json::json!(effort);
        }
        if !request.tools.is_empty() {
            let tools: Vec<serde_json::Value> = request
                .tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        },
                    })
                })
                .collect();
            body["tools"] = serde_json::Value::Array(tools);
        }
        body
    }
}

/// Encode one canonical turn into chat-completions messages.
fn encode_turn(turn: &Turn) -> Vec<serde_json::Value> {
    match turn.role {
        Role::User => vec![serde_json::json!({
            "role": "user",
            "content": turn.content,
        })],
        Role::Assistant => {
            let mut msg = serde_json::json!({
                "role": "assistant",
                "content": turn.content,
            });
            if !turn.invocations.is_empty() {
                let calls: Vec<serde_json::Value> = turn
                    .invocations
                    .iter()
                    .map(|inv| {
                        serde_json::json!({
                            "id": inv.id,
                            "type": "function",
                            "function": {
                                "name": inv.name,
                                "arguments": inv.arguments.to_string(),
                            },
                        })
                    })
                    .collect();
                msg["tool_calls"] = serde_json::Value::Array(calls);
            }
            vec![msg]
        }
        Role::ToolResult => turn
            .invocations
            .iter()
            .map(|inv| {
                serde_json::json!({
                    "role": "tool",
                    "tool_call_id": inv.id,
                    "content": inv
                        .result
                        .as_ref()
                        .map(|r| r.to_string())
                        .unwrap_or_default(),
                })
            })
            .collect(),
    }
}

#[async_trait]
impl ModelGateway for OpenAiGateway {
    fn provider_name(&self) -> &str {
        "openai"
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn stream_step(
        &self,
        request: &GatewayRequest,
    ) -> Result<BoxStream<'static, Result<GatewayEvent>>> {
        let body = self.build_request_body(request);
        let url = format!("{}/chat/completions", self.base_url);

        debug!(model = %self.model_id, "openai stream_step");

        let resp = shared_client()
            .post(&url)
            .headers(bearer_headers(&self.api_key))
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if status != 200 {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(status_to_error(status, &body_text));
        }

        let byte_stream = resp.bytes_stream();

        let stream = async_stream::stream! {
            let mut buffer = String::new();
            // (index, id) of tool calls announced so far, in wire order.
            let mut open_calls: Vec<(u64, String)> = Vec::new();
            // Terminal event held back until the stream drains; the usage
            // chunk arrives after the finish_reason chunk.
            let mut pending_terminal: Option<GatewayEvent> = None;
            futures::pin_mut!(byte_stream);

            while let Some(chunk_result) = byte_stream.next().await {
                let chunk = match chunk_result {
                    Ok(c) => c,
                    Err(e) => {
                        yield Err(MaestroError::Network(e));
                        break;
                    }
                };

                buffer.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(line_end) = buffer.find('\n') {
                    let line = buffer[..line_end].trim().to_string();
                    buffer = buffer[line_end + 1..].to_string();

                    if line.is_empty() || line.starts_with(':') {
                        continue;
                    }

                    let Some(data) = parse_sse_data(&line) else { continue; };
                    let Ok(chunk) = serde_json::from_str::<ChatChunk>(data) else {
                        continue; // skip unparseable chunks
                    };

                    if let Some(u) = chunk.usage {
                        yield Ok(GatewayEvent::Usage {
                            usage: RawUsage {
                                prompt_tokens: u.prompt_tokens,
                                completion_tokens: u.completion_tokens,
                            },
                        });
                    }

                    let Some(choice) = chunk.choices.into_iter().next() else { continue; };

                    if let Some(text) = choice.delta.content {
                        if !text.is_empty() {
                            yield Ok(GatewayEvent::TextDelta { text });
                        }
                    }

                    for tc in choice.delta.tool_calls.unwrap_or_default() {
                        if let Some(id) = tc.id {
                            let name = tc
                                .function
                                .as_ref()
                                .and_then(|f| f.name.clone())
                                .unwrap_or_default();
                            open_calls.push((tc.index, id.clone()));
                            yield Ok(GatewayEvent::ToolCallBegin { id: id.clone(), name });
                            if let Some(fragment) =
                                tc.function.and_then(|f| f.arguments).filter(|a| !a.is_empty())
                            {
                                yield Ok(GatewayEvent::ToolCallDelta { id, fragment });
                            }
                        } else if let Some(fragment) =
                            tc.function.and_then(|f| f.arguments).filter(|a| !a.is_empty())
                        {
                            let known = open_calls
                                .iter()
                                .find(|(index, _)| *index == tc.index)
                                .map(|(_, id)| id.clone());
                            if let Some(id) = known {
                                yield Ok(GatewayEvent::ToolCallDelta { id, fragment });
                            }
                        }
                    }

                    match choice.finish_reason.as_deref() {
                        Some("tool_calls") => {
                            for (_, id) in open_calls.drain(..) {
                                yield Ok(GatewayEvent::ToolCallComplete { id });
                            }
                            pending_terminal = Some(GatewayEvent::StepFinished);
                        }
                        Some(_) => {
                            pending_terminal = Some(GatewayEvent::RunFinished);
                        }
                        None => {}
                    }
                }
            }

            if let Some(terminal) = pending_terminal {
                yield Ok(terminal);
            }
        };

        Ok(Box::pin(stream))
    }
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    #[serde(default)]
    delta: ChatDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ChatDelta {
    content: Option<String>,
    tool_calls: Option<Vec<ChatToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatToolCallDelta {
    #[serde(default)]
    index: u64,
    id: Option<String>,
    function: Option<ChatFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct ChatFunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ToolInvocation;

    #[test]
    fn encodes_tool_result_turn_as_tool_message() {
        let turn = Turn::tool_result("c1", "tc-1", "lookup", serde_json::json!({"hits": 3}));
        let messages = encode_turn(&turn);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "tool");
        assert_eq!(messages[0]["tool_call_id"], "tc-1");
    }

    #[test]
    fn usage_chunk_deserializes() {
        let chunk: ChatChunk = serde_json::from_str(
            r#"{"choices":[],"usage":{"prompt_tokens":20,"completion_tokens":8}}"#,
        )
        .unwrap();
        let usage = chunk.usage.unwrap();
        assert_eq!(usage.prompt_tokens, 20);
        assert_eq!(usage.completion_tokens, 8);
    }

    #[test]
    fn encodes_assistant_tool_calls() {
        let turn = Turn::assistant(
            "c1",
            "checking",
            vec![ToolInvocation::new("tc-1", "lookup", serde_json::json!({"q": "x"}))],
        );
        let messages = encode_turn(&turn);
        let calls = messages[0]["tool_calls"].as_array().unwrap();
        assert_eq!(calls[0]["function"]["name"], "lookup");
    }
}
