use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use shared::Suggestion;

use super::DependencyError;
use super::model::Identification;

const SERVICE: &str = "Kindwise";

/// One synchronous identification call per image.
#[async_trait]
pub trait ClassificationClient: Send + Sync {
    async fn identify(&self, image: &[u8]) -> Result<Identification, DependencyError>;
}

#[derive(Clone)]
pub struct KindwiseClient {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct IdentificationRequest {
    images: Vec<String>,
    similar_images: bool,
}

#[derive(Deserialize, Default)]
struct IdentificationResponse {
    #[serde(default)]
    result: Option<IdentificationResult>,
}

#[derive(Deserialize, Default)]
struct IdentificationResult {
    #[serde(default)]
    disease: Option<DiseaseResult>,
}

#[derive(Deserialize, Default)]
struct DiseaseResult {
    #[serde(default)]
    suggestions: Option<Vec<RawSuggestion>>,
}

#[derive(Deserialize)]
struct RawSuggestion {
    name: Option<String>,
    probability: Option<f32>,
}

impl KindwiseClient {
    pub fn new(client: reqwest::Client, api_url: String, api_key: Option<String>) -> Self {
        Self {
            client,
            api_url,
            api_key,
        }
    }
}

#[async_trait]
impl ClassificationClient for KindwiseClient {
    async fn identify(&self, image: &[u8]) -> Result<Identification, DependencyError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(DependencyError::MissingCredentials(SERVICE))?;

        let body = IdentificationRequest {
            images: vec![STANDARD.encode(image)],
            similar_images: true,
        };

        log::info!("Sending request to Kindwise API ({} bytes)", image.len());
        let response = self
            .client
            .post(&self.api_url)
            .header("Api-Key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| DependencyError::Transport {
                service: SERVICE,
                message: e.to_string(),
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| DependencyError::Transport {
            service: SERVICE,
            message: e.to_string(),
        })?;
        if !status.is_success() {
            log::error!("Kindwise returned {}: {}", status, text);
            return Err(DependencyError::Upstream {
                service: SERVICE,
                status: status.as_u16(),
                body: text,
            });
        }

        log::debug!("Kindwise response: {}", text);
        parse_identification(&text)
    }
}

fn parse_identification(text: &str) -> Result<Identification, DependencyError> {
    let parsed: IdentificationResponse =
        serde_json::from_str(text).map_err(|e| DependencyError::MalformedPayload {
            service: SERVICE,
            message: e.to_string(),
        })?;

    let suggestions = parsed
        .result
        .and_then(|r| r.disease)
        .and_then(|d| d.suggestions)
        .unwrap_or_default()
        .into_iter()
        .map(|raw| Suggestion {
            name: raw.name.unwrap_or_else(|| "Unknown".to_string()),
            probability: raw.probability.unwrap_or(0.0),
        })
        .collect();

    Ok(Identification::ranked(suggestions))
}
