use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::types::{Assistant, AssistantRequest, Speaker};
use crate::configuration::types::AssistantSettings;
use crate::error_handling::types::AssistantError;

/// Barista backed by the Gemini `generateContent` REST endpoint.
pub struct GeminiAssistant {
    http: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    system_instruction: Content<'a>,
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl GeminiAssistant {
    pub fn new(settings: &AssistantSettings) -> Result<Self, AssistantError> {
        let api_key = settings
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or(AssistantError::MissingApiKey)?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| AssistantError::Request(e.to_string()))?;

        Ok(Self {
            http,
            api_key,
            model: settings.model.clone(),
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }

    fn body<'a>(request: &'a AssistantRequest) -> GenerateRequest<'a> {
        let mut contents: Vec<Content<'a>> = request
            .history
            .iter()
            .map(|turn| Content {
                role: Some(match turn.speaker {
                    Speaker::User => "user",
                    Speaker::Assistant => "model",
                }),
                parts: vec![Part { text: &turn.text }],
            })
            .collect();
        contents.push(Content {
            role: Some("user"),
            parts: vec![Part { text: &request.message }],
        });

        GenerateRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part { text: &request.context }],
            },
            contents,
        }
    }

    fn extract_text(response: GenerateResponse) -> Result<String, AssistantError> {
        let candidate = response
            .candidates
            .into_iter()
            .next()
            .ok_or(AssistantError::EmptyResponse)?;
        // A candidate without text is still a reply; callers substitute their own filler.
        let text: String = candidate
            .content
            .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();
        Ok(text.trim().to_string())
    }
}

#[async_trait]
impl Assistant for GeminiAssistant {
    async fn reply(&self, request: AssistantRequest) -> Result<String, AssistantError> {
        debug!("Requesting barista reply ({} prior turn(s))", request.history.len());
        let response = self
            .http
            .post(self.url())
            .header("x-goog-api-key", &self.api_key)
            .json(&Self::body(&request))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AssistantError::Timeout
                } else {
                    AssistantError::Request(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AssistantError::Status(status.as_u16()));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| AssistantError::Request(e.to_string()))?;
        Self::extract_text(parsed)
    }
}
