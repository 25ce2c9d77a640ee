// src/services/language_model.rs

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::internal::Message;

/// Model-call errors
#[derive(Debug, Error, Clone)]
pub enum ModelError {
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// One prior turn handed to the model as chat history.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

impl From<&Message> for ChatTurn {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role.clone(),
            content: message.content.clone(),
        }
    }
}

/// Completed model call with token accounting. `model` is the identifier
/// the backend reports, not the caller's hint.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub tokens_used: u32,
    pub model: String,
}

/// Trait for chat models (OpenAI, compatible gateways, etc.)
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Run a chat completion over the system prompt, prior turns, and the
    /// new user message.
    async fn generate(
        &self,
        system_prompt: &str,
        history: &[ChatTurn],
        user_message: &str,
        model_hint: Option<&str>,
    ) -> Result<Completion, ModelError>;

    /// Extract durable user preferences from one exchange. Output that is
    /// not a JSON object yields an empty map, not an error.
    async fn extract_facts(
        &self,
        user_message: &str,
        assistant_message: &str,
    ) -> Result<serde_json::Map<String, serde_json::Value>, ModelError>;

    /// Condense a message window into a short prose summary.
    async fn summarize(&self, turns: &[ChatTurn], max_words: u32)
        -> Result<String, ModelError>;
}

// ============================================
// OpenAI-compatible HTTP client
// ============================================

#[derive(Debug, Serialize)]
struct WireChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    model: String,
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    total_tokens: u32,
}

pub struct OpenAiChatClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    default_model: String,
}

impl OpenAiChatClient {
    pub fn new(base_url: String, api_key: String, default_model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            default_model,
        }
    }

    async fn chat_completion(
        &self,
        model: &str,
        messages: Vec<WireChatMessage<'_>>,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<Completion, ModelError> {
        let request = ChatCompletionRequest {
            model,
            messages,
            temperature,
            max_tokens,
        };

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ModelError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ModelError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ModelError::InvalidResponse(e.to_string()))?;

        let text = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ModelError::InvalidResponse("no choices returned".to_string()))?;

        Ok(Completion {
            text,
            tokens_used: body.usage.map(|u| u.total_tokens).unwrap_or(0),
            model: body.model,
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAiChatClient {
    async fn generate(
        &self,
        system_prompt: &str,
        history: &[ChatTurn],
        user_message: &str,
        model_hint: Option<&str>,
    ) -> Result<Completion, ModelError> {
        let model = model_hint.unwrap_or(&self.default_model);

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(WireChatMessage {
            role: "system",
            content: system_prompt,
        });
        for turn in history {
            messages.push(WireChatMessage {
                role: &turn.role,
                content: &turn.content,
            });
        }
        messages.push(WireChatMessage {
            role: "user",
            content: user_message,
        });

        self.chat_completion(model, messages, 0.7, 2000).await
    }

    async fn extract_facts(
        &self,
        user_message: &str,
        assistant_message: &str,
    ) -> Result<serde_json::Map<String, serde_json::Value>, ModelError> {
        let extraction_prompt = format!(
            "\nAnalyze this conversation and extract key user preferences or context.\n\
             Return ONLY a JSON object with these keys (if applicable):\n\
             - writing_style: (casual, professional, technical, etc.)\n\
             - tone_preference: (friendly, formal, conversational, etc.)\n\
             - industry: (tech, finance, healthcare, etc.)\n\
             - target_audience: (developers, marketers, students, etc.)\n\
             - specific_preferences: (any other notable preferences)\n\n\
             User: {}\nAssistant: {}\n\n\
             Return ONLY valid JSON, no other text.\n",
            user_message, assistant_message
        );

        let messages = vec![
            WireChatMessage {
                role: "system",
                content: "You are a context extraction assistant. Return only valid JSON.",
            },
            WireChatMessage {
                role: "user",
                content: &extraction_prompt,
            },
        ];

        let completion = self
            .chat_completion(&self.default_model, messages, 0.3, 500)
            .await?;

        // Non-JSON model output is an empty extraction, not a failure
        match serde_json::from_str::<serde_json::Value>(completion.text.trim()) {
            Ok(serde_json::Value::Object(map)) => Ok(map),
            _ => Ok(serde_json::Map::new()),
        }
    }

    async fn summarize(
        &self,
        turns: &[ChatTurn],
        max_words: u32,
    ) -> Result<String, ModelError> {
        let conversation_text = turns
            .iter()
            .map(|t| format!("{}: {}", t.role, t.content))
            .collect::<Vec<_>>()
            .join("\n");

        let summary_prompt = format!(
            "\nSummarize this conversation in {} words or less. \n\
             Focus on key topics, decisions, and outputs generated.\n\n{}\n",
            max_words, conversation_text
        );

        let messages = vec![
            WireChatMessage {
                role: "system",
                content: "You are a summarization expert.",
            },
            WireChatMessage {
                role: "user",
                content: &summary_prompt,
            },
        ];

        let completion = self
            .chat_completion(&self.default_model, messages, 0.5, 300)
            .await?;

        Ok(completion.text)
    }
}

// ============================================
// Mock model for testing
// ============================================

/// Scripted model double. Each call clones the configured response.
pub struct MockModel {
    pub completion: Result<Completion, ModelError>,
    pub facts: serde_json::Map<String, serde_json::Value>,
    pub summary: String,
    pub generate_calls: std::sync::Arc<std::sync::Mutex<usize>>,
    pub extract_calls: std::sync::Arc<std::sync::Mutex<usize>>,
}

impl MockModel {
    pub fn new_success(text: &str, tokens_used: u32, model: &str) -> Self {
        Self {
            completion: Ok(Completion {
                text: text.to_string(),
                tokens_used,
                model: model.to_string(),
            }),
            facts: serde_json::Map::new(),
            summary: String::new(),
            generate_calls: std::sync::Arc::new(std::sync::Mutex::new(0)),
            extract_calls: std::sync::Arc::new(std::sync::Mutex::new(0)),
        }
    }

    pub fn new_error(error: ModelError) -> Self {
        Self {
            completion: Err(error),
            facts: serde_json::Map::new(),
            summary: String::new(),
            generate_calls: std::sync::Arc::new(std::sync::Mutex::new(0)),
            extract_calls: std::sync::Arc::new(std::sync::Mutex::new(0)),
        }
    }

    pub fn with_facts(mut self, facts: serde_json::Value) -> Self {
        if let serde_json::Value::Object(map) = facts {
            self.facts = map;
        }
        self
    }

    pub fn with_summary(mut self, summary: &str) -> Self {
        self.summary = summary.to_string();
        self
    }
}

#[async_trait]
impl LanguageModel for MockModel {
    async fn generate(
        &self,
        _system_prompt: &str,
        _history: &[ChatTurn],
        _user_message: &str,
        _model_hint: Option<&str>,
    ) -> Result<Completion, ModelError> {
        *self.generate_calls.lock().unwrap() += 1;
        self.completion.clone()
    }

    async fn extract_facts(
        &self,
        _user_message: &str,
        _assistant_message: &str,
    ) -> Result<serde_json::Map<String, serde_json::Value>, ModelError> {
        *self.extract_calls.lock().unwrap() += 1;
        match &self.completion {
            Ok(_) => Ok(self.facts.clone()),
            Err(e) => Err(e.clone()),
        }
    }

    async fn summarize(
        &self,
        _turns: &[ChatTurn],
        _max_words: u32,
    ) -> Result<String, ModelError> {
        match &self.completion {
            Ok(_) => Ok(self.summary.clone()),
            Err(e) => Err(e.clone()),
        }
    }
}
