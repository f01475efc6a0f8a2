//! Anthropic messages gateway.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use tracing::debug;

use super::http::{anthropic_headers, parse_sse_data, shared_client, status_to_error};
use super::{GatewayRequest, ModelGateway};
use crate::error::{MaestroError, Result};
use crate::types::{GatewayEvent, RawUsage, Role, Turn};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Gateway speaking the Anthropic messages streaming protocol.
pub struct AnthropicGateway {
    model_id: String,
    api_key: String,
    base_url: String,
}

impl AnthropicGateway {
    pub fn new(model_id: impl Into<String>, api_key: String, base_url: Option<String>) -> Self {
        Self {
            model_id: model_id.into(),
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        }
    }

    fn build_request_body(&self, request: &GatewayRequest) -> serde_json::Value {
        let messages: Vec<serde_json::Value> =
            request.turns.iter().map(encode_turn).collect();

        let mut body = serde_json::json!({
            "model": self.model_id,
            "messages": messages,
            "max_tokens": request.max_output_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "stream": true,
        });
        if !request.system_prompt.is_empty() {
            body["system"] = serde_json::json!(request.system_prompt);
        }
        if let Some(temperature) = request.temperature {
            body["temperature"] = serde_json::json!(temperature);
        }
        if !request.tools.is_empty() {
            let tools: Vec<serde_json::Value> = request
                .tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "name": t.name,
                        "description": t.description,
                        "input_schema": t.parameters,
                    })
                })
                .collect();
            body["tools"] = serde_json::Value::Array(tools);
        }
        body
    }
}

/// Encode one canonical turn into an Anthropic message.
fn encode_turn(turn: &Turn) -> serde_json::Value {
    match turn.role {
        Role::User => serde_json::json!({
            "role": "user",
            "content": turn.content,
        }),
        Role::Assistant => {
            let mut blocks = Vec::new();
            if !turn.content.is_empty() {
                blocks.push(serde_json::json!({ "type": "text", "text": turn.content }));
            }
            for inv in &turn.invocations {
                blocks.push(serde_json::json!({
                    "type": "tool_use",
                    "id": inv.id,
                    "name": inv.name,
                    "input": inv.arguments,
                }));
            }
            serde_json::json!({ "role": "assistant", "content": blocks })
        }
        // Tool results ride in a user-role message per the messages API.
        Role::ToolResult => {
            let blocks: Vec<serde_json::Value> = turn
                .invocations
                .iter()
                .map(|inv| {
                    serde_json::json!({
                        "type": "tool_result",
                        "tool_use_id": inv.id,
                        "content": inv
                            .result
                            .as_ref()
                            .map(|r| r.to_string())
                            .unwrap_or_default(),
                    })
                })
                .collect();
            serde_json::json!({ "role": "user", "content": blocks })
        }
    }
}

#[async_trait]
impl ModelGateway for AnthropicGateway {
    fn provider_name(&self) -> &str {
        "anthropic"
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn stream_step(
        &self,
        request: &GatewayRequest,
    ) -> Result<BoxStream<'static, Result<GatewayEvent>>> {
        let body = self.build_request_body(request);
        let url = format!("{}/v1/messages", self.base_url);

        debug!(model = %self.model_id, "anthropic stream_step");

        let resp = shared_client()
            .post(&url)
            .headers(anthropic_headers(&self.api_key, API_VERSION))
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
            let mut current_block_type: Option<String> = None;
            let mut current_tool_id: Option<String> = None;
            let mut saw_tool_use = false;
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
                    let Ok(event) = serde_json::from_str::<serde_json::Value>(data) else {
                        continue;
                    };
                    let event_type = event.get("type").and_then(|t| t.as_str()).unwrap_or("");

                    match event_type {
                        "message_start" => {
                            let input = event
                                .pointer("/message/usage/input_tokens")
                                .and_then(|v| v.as_u64());
                            if let Some(input) = input {
                                yield Ok(GatewayEvent::Usage {
                                    usage: RawUsage {
                                        prompt_tokens: input as u32,
                                        completion_tokens: 0,
                                    },
                                });
                            }
                        }
                        "content_block_start" => {
                            if let Some(block) = event.get("content_block") {
                                let btype =
                                    block.get("type").and_then(|t| t.as_str()).unwrap_or("");
                                current_block_type = Some(btype.to_string());
                                if btype == "tool_use" {
                                    let id = block
                                        .get("id")
                                        .and_then(|v| v.as_str())
                                        .unwrap_or_default()
                                        .to_string();
                                    let name = block
                                        .get("name")
                                        .and_then(|v| v.as_str())
                                        .unwrap_or_default()
                                        .to_string();
                                    current_tool_id = Some(id.clone());
                                    yield Ok(GatewayEvent::ToolCallBegin { id, name });
                                }
                            }
                        }
                        "content_block_delta" => {
                            if let Some(delta) = event.get("delta") {
                                let delta_type =
                                    delta.get("type").and_then(|t| t.as_str()).unwrap_or("");
                                match delta_type {
                                    "text_delta" => {
                                        if let Some(text) =
                                            delta.get("text").and_then(|t| t.as_str())
                                        {
                                            yield Ok(GatewayEvent::TextDelta {
                                                text: text.to_string(),
                                            });
                                        }
                                    }
                                    "input_json_delta" => {
                                        if let (Some(id), Some(fragment)) = (
                                            current_tool_id.clone(),
                                            delta.get("partial_json").and_then(|t| t.as_str()),
                                        ) {
                                            yield Ok(GatewayEvent::ToolCallDelta {
                                                id,
                                                fragment: fragment.to_string(),
                                            });
                                        }
                                    }
                                    _ => {}
                                }
                            }
                        }
                        "content_block_stop" => {
                            if current_block_type.as_deref() == Some("tool_use") {
                                if let Some(id) = current_tool_id.take() {
                                    saw_tool_use = true;
                                    yield Ok(GatewayEvent::ToolCallComplete { id });
                                }
                            }
                            current_block_type = None;
                        }
                        "message_delta" => {
                            let output = event
                                .pointer("/usage/output_tokens")
                                .and_then(|v| v.as_u64());
                            if let Some(output) = output {
                                yield Ok(GatewayEvent::Usage {
                                    usage: RawUsage {
                                        prompt_tokens: 0,
                                        completion_tokens: output as u32,
                                    },
                                });
                            }
                        }
                        "message_stop" => {
                            if saw_tool_use {
                                yield Ok(GatewayEvent::StepFinished);
                            } else {
                                yield Ok(GatewayEvent::RunFinished);
                            }
                        }
                        _ => {}
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ToolInvocation;

    #[test]
    fn tool_results_ride_in_user_role() {
        let turn = Turn::tool_result("c1", "tu-1", "lookup", serde_json::json!("ok"));
        let msg = encode_turn(&turn);
        assert_eq!(msg["role"], "user");
        assert_eq!(msg["content"][0]["type"], "tool_result");
        assert_eq!(msg["content"][0]["tool_use_id"], "tu-1");
    }

    #[test]
    fn assistant_turn_becomes_content_blocks() {
        let turn = Turn::assistant(
            "c1",
            "let me check",
            vec![ToolInvocation::new("tu-2", "lookup", serde_json::json!({"q": 1}))],
        );
        let msg = encode_turn(&turn);
        let blocks = msg["content"].as_array().unwrap();
        assert_eq!(blocks[0]["type"], "text");
        assert_eq!(blocks[1]["type"], "tool_use");
    }
}
