use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::DependencyError;
use super::advisory::TextGenerator;

const SERVICE: &str = "Gemini";

#[derive(Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
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

impl GeminiClient {
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        model: String,
        api_key: Option<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            api_key,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, DependencyError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(DependencyError::MissingCredentials(SERVICE))?;

        let body = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
        };

        let response = self
            .client
            .post(self.endpoint())
            .query(&[("key", api_key)])
            .json(&body)
            .send()
            .await
            .map_err(|e| DependencyError::Transport {
                service: SERVICE,
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let err = upstream_error(status.as_u16(), response.text().await);
            log::error!("{}", err);
            return Err(err);
        }

        let parsed: GenerateContentResponse =
            response
                .json()
                .await
                .map_err(|e| DependencyError::MalformedPayload {
                    service: SERVICE,
                    message: e.to_string(),
                })?;

        first_candidate_text(parsed)
    }
}

/// Error for a non-success status. A body that cannot be read is reported in its place.
fn upstream_error(status: u16, body: Result<String, impl std::fmt::Display>) -> DependencyError {
    let body = body.unwrap_or_else(|e| format!("<failed to read response body: {e}>"));
    DependencyError::Upstream {
        service: SERVICE,
        status,
        body,
    }
}

fn first_candidate_text(response: GenerateContentResponse) -> Result<String, DependencyError> {
    response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<String>()
        })
        .filter(|text| !text.trim().is_empty())
        .ok_or_else(|| DependencyError::MalformedPayload {
            service: SERVICE,
            message: "response contained no text candidate".into(),
        })
}
