//! Bottle classifier backed by an OpenAI-compatible chat-completions API.
//!
//! Sends the configured prompt plus the photo as a `data:` URL and reads a
//! TRUE/FALSE answer back.

use crate::domain::config::ClassifierConfig;
use crate::domain::types::EncodedImage;
use crate::domain::GatewayError;
use crate::ports::outbound::{BottleClassifier, ClassifierError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: [ContentPart<'a>; 2],
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Chat-completions [`BottleClassifier`]
pub struct OpenAiClassifier {
    http_client: reqwest::Client,
    config: ClassifierConfig,
}

impl OpenAiClassifier {
    pub fn new(config: ClassifierConfig) -> Result<Self, GatewayError> {
        if config.api_key.is_none() {
            warn!("No classifier API key configured; /bottle requests will be rejected upstream");
        }

        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| GatewayError::Client(format!("classifier client: {}", e)))?;

        Ok(Self {
            http_client,
            config,
        })
    }

    fn request_body<'a>(&'a self, image: &EncodedImage) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.config.model,
            messages: [ChatMessage {
                role: "user",
                content: [
                    ContentPart::Text {
                        text: &self.config.prompt,
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: image.to_data_url(),
                        },
                    },
                ],
            }],
        }
    }
}

#[async_trait]
impl BottleClassifier for OpenAiClassifier {
    async fn classify(&self, image: &EncodedImage) -> Result<bool, ClassifierError> {
        let mut request = self
            .http_client
            .post(&self.config.endpoint)
            .json(&self.request_body(image));
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(map_transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClassifierError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response.json().await.map_err(map_transport)?;
        let answer = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(ClassifierError::EmptyAnswer)?;

        debug!(answer = %answer, "Classifier answered");
        parse_answer(&answer)
    }
}

fn map_transport(err: reqwest::Error) -> ClassifierError {
    if err.is_timeout() {
        ClassifierError::Timeout
    } else {
        ClassifierError::Http(err)
    }
}

/// Read a TRUE/FALSE answer, ignoring case, whitespace and trailing text
pub fn parse_answer(answer: &str) -> Result<bool, ClassifierError> {
    let normalized = answer.trim().to_ascii_uppercase();
    if normalized.starts_with("TRUE") {
        Ok(true)
    } else if normalized.starts_with("FALSE") {
        Ok(false)
    } else if normalized.is_empty() {
        Err(ClassifierError::EmptyAnswer)
    } else {
        Err(ClassifierError::UnexpectedAnswer(answer.trim().to_string()))
    }
}
