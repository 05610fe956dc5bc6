//! Conversation message types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelMessage {
    pub role: Role,
    pub content: Vec<ContentPart>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ModelMessage {
    fn with_parts(role: Role, content: Vec<ContentPart>) -> Self {
        Self {
            role,
            content,
            timestamp: Some(Utc::now()),
        }
    }

    /// Create a system message.
    pub fn system(text: impl Into<String>) -> Self {
        Self::with_parts(Role::System, vec![ContentPart::Text { text: text.into() }])
    }

    /// Create a user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self::with_parts(Role::User, vec![ContentPart::Text { text: text.into() }])
    }

    /// Create a user message with a trailing image part.
    pub fn user_with_image(text: impl Into<String>, image: ImageContent) -> Self {
        Self::with_parts(
            Role::User,
            vec![ContentPart::Text { text: text.into() }, ContentPart::Image(image)],
        )
    }

    /// Create an assistant message.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::with_parts(Role::Assistant, vec![ContentPart::Text { text: text.into() }])
    }

    /// Create an assistant message recording the tool calls the model asked for.
    ///
    /// Any text the model produced alongside the calls is kept first.
    pub fn assistant_tool_calls(text: impl Into<String>, calls: Vec<ToolCallRequest>) -> Self {
        let text = text.into();
        let mut content = Vec::with_capacity(calls.len() + 1);
        if !text.is_empty() {
            content.push(ContentPart::Text { text });
        }
        content.extend(calls.into_iter().map(ContentPart::ToolCall));
        Self::with_parts(Role::Assistant, content)
    }

    /// Create a tool result message.
    pub fn tool_result(result: ToolCallResult) -> Self {
        Self::with_parts(Role::Tool, vec![ContentPart::ToolResult(result)])
    }

    /// Extract the text content, concatenating all text parts.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// Extract tool calls from this message.
    pub fn tool_calls(&self) -> Vec<&ToolCallRequest> {
        self.content
            .iter()
            .filter_map(|part| match part {
                ContentPart::ToolCall(call) => Some(call),
                _ => None,
            })
            .collect()
    }

    /// The tool result carried by a `Role::Tool` message.
    pub fn as_tool_result(&self) -> Option<&ToolCallResult> {
        self.content.iter().find_map(|part| match part {
            ContentPart::ToolResult(result) => Some(result),
            _ => None,
        })
    }
}

/// Conversation role.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A single part of message content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    Image(ImageContent),
    ToolCall(ToolCallRequest),
    ToolResult(ToolCallResult),
}

/// Image content embedded in a message as base64 data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageContent {
    pub data: String,
    pub mime_type: String,
}

impl ImageContent {
    /// Render as a `data:` URL.
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

/// A tool call requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// The outcome of one tool call, as fed back to the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallResult {
    pub tool_call_id: String,
    pub content: String,
    #[serde(default)]
    pub is_error: bool,
}

impl ToolCallResult {
    pub fn success(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
            is_error: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn assistant_tool_calls_keeps_emission_order() {
        let message = ModelMessage::assistant_tool_calls(
            "",
            vec![
                ToolCallRequest {
                    id: "call_1".into(),
                    name: "first".into(),
                    arguments: json!({}),
                },
                ToolCallRequest {
                    id: "call_2".into(),
                    name: "second".into(),
                    arguments: json!({"q": 1}),
                },
            ],
        );

        assert_eq!(message.role, Role::Assistant);
        let names: Vec<_> = message.tool_calls().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["first", "second"]);
        assert_eq!(message.text(), "");
    }

    #[test]
    fn user_with_image_has_text_then_image() {
        let message = ModelMessage::user_with_image(
            "what is this?",
            ImageContent {
                data: "AAAA".into(),
                mime_type: "image/png".into(),
            },
        );
        assert_eq!(message.content.len(), 2);
        assert!(matches!(&message.content[0], ContentPart::Text { text } if text == "what is this?"));
        assert!(matches!(&message.content[1], ContentPart::Image(img) if img.data_url() == "data:image/png;base64,AAAA"));
    }

    #[test]
    fn tool_result_message_exposes_result() {
        let message = ModelMessage::tool_result(ToolCallResult::error("call_9", "no such tool"));
        let result = message.as_tool_result().expect("tool message carries a result");
        assert_eq!(result.tool_call_id, "call_9");
        assert!(result.is_error);
        assert_eq!(message.role, Role::Tool);
    }

    #[test]
    fn content_part_serializes_with_type_tag() {
        let part = ContentPart::Text { text: "hi".into() };
        assert_eq!(serde_json::to_value(&part).unwrap(), json!({"type": "text", "text": "hi"}));
    }
}
