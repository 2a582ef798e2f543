use crate::error::AIServiceError;
use crate::traits::LanguageModel;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// LLM client for an OpenAI-compatible `/v1/chat/completions` endpoint. The
/// response shape is normalized into a plain string at this boundary; the
/// rest of the pipeline never sees the wire format.
pub struct OpenAiCompatClient {
    endpoint: String,
    api_key: Option<String>,
    model: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Option<Vec<ChatChoice>>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

impl OpenAiCompatClient {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: None,
            model: model.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl LanguageModel for OpenAiCompatClient {
    async fn generate(
        &self,
        prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, AIServiceError> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature,
            max_tokens,
        };

        let mut request = self
            .client
            .post(format!("{}/v1/chat/completions", self.endpoint))
            .json(&body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(AIServiceError::Llm(format!(
                "llm endpoint returned {}",
                response.status()
            )));
        }

        let parsed: ChatResponse = response.json().await?;
        answer_text(parsed)
    }
}

fn answer_text(response: ChatResponse) -> Result<String, AIServiceError> {
    let text = response
        .choices
        .and_then(|choices| choices.into_iter().next())
        .and_then(|choice| choice.message)
        .and_then(|message| message.content)
        .map(|content| content.trim().to_string());

    match text {
        Some(text) if !text.is_empty() => Ok(text),
        _ => Err(AIServiceError::InvalidResponse {
            backend: "llm".to_string(),
            details: "response carried no answer text".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answer_text_is_extracted_and_trimmed() {
        let response = ChatResponse {
            choices: Some(vec![ChatChoice {
                message: Some(ChatResponseMessage {
                    content: Some("  the answer  ".to_string()),
                }),
            }]),
        };
        assert_eq!(answer_text(response).unwrap(), "the answer");
    }

    #[test]
    fn missing_content_is_an_invalid_response() {
        let empty = ChatResponse { choices: None };
        assert!(matches!(
            answer_text(empty),
            Err(AIServiceError::InvalidResponse { .. })
        ));

        let blank = ChatResponse {
            choices: Some(vec![ChatChoice {
                message: Some(ChatResponseMessage {
                    content: Some("   ".to_string()),
                }),
            }]),
        };
        assert!(matches!(
            answer_text(blank),
            Err(AIServiceError::InvalidResponse { .. })
        ));
    }
}
