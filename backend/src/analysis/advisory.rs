//! Remediation advice from a text-generation model.
//!
//! The model is asked for a single JSON object holding localized report labels and the
//! analysis itself. Anything that does not parse into that shape is a dependency failure;
//! no defaulted advisory is substituted.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use shared::{Advisory, AdvisoryAnalysis, ReportLabels, Severity};

use super::DependencyError;

const SERVICE: &str = "Gemini";

/// Raw text generation. Implementations return the model's reply verbatim.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, DependencyError>;
}

/// What the advice is about.
#[derive(Debug, Clone, PartialEq)]
pub enum AdvisorySubject {
    /// A single plant with a top-ranked disease.
    Disease { name: String, severity: Severity },
    /// A consolidated survey, described by its frequency summary phrase.
    Survey { summary: String },
}

#[derive(Clone)]
pub struct AdvisoryGenerator {
    llm: Arc<dyn TextGenerator>,
}

impl AdvisoryGenerator {
    pub fn new(llm: Arc<dyn TextGenerator>) -> Self {
        Self { llm }
    }

    pub async fn advise(
        &self,
        subject: &AdvisorySubject,
        language: &str,
    ) -> Result<Advisory, DependencyError> {
        let prompt = build_prompt(subject, language);
        log::info!("Requesting advisory in {}", language);
        let reply = self.llm.generate(&prompt).await?;
        parse_advisory(&reply)
    }
}

pub fn build_prompt(subject: &AdvisorySubject, language: &str) -> String {
    let context = match subject {
        AdvisorySubject::Disease { name, severity } => format!(
            "Analyze the following plant disease. Disease: '{name}'. Severity: '{severity}'. \
             Provide a report in {language}. "
        ),
        AdvisorySubject::Survey { summary } => format!(
            "A farm survey has found plants with the following diseases: {summary}. \
             Provide a consolidated report in {language}. "
        ),
    };

    format!(
        "You are an agricultural expert for India. {context}\
         Your entire output must be a single, valid JSON object. \
         Do not include any text before or after the JSON. \
         The JSON object must have two main keys: 'labels' and 'analysis'. \
         - The 'labels' key must contain a JSON object with translated titles for: \
         'report_title', 'disease_predicted', 'confidence', 'severity', 'root_cause', \
         'pesticides', 'precautions'. \
         - The 'analysis' key must contain a JSON object with the analysis data for: \
         'root_cause' (a summary of common causes), 'pesticides' (a list of 2-3 general-purpose \
         pesticides for these issues), and 'precautions' (a summary of preventative measures)."
    )
}

#[derive(Deserialize)]
struct AdvisoryPayload {
    labels: ReportLabels,
    analysis: AdvisoryAnalysis,
}

/// Parses the model reply, tolerating a surrounding Markdown code fence.
pub fn parse_advisory(reply: &str) -> Result<Advisory, DependencyError> {
    let cleaned = strip_code_fence(reply);
    let payload: AdvisoryPayload =
        serde_json::from_str(cleaned).map_err(|e| DependencyError::MalformedPayload {
            service: SERVICE,
            message: e.to_string(),
        })?;
    Ok(Advisory {
        labels: payload.labels,
        analysis: payload.analysis,
    })
}

fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open
        .strip_suffix("```")
        .unwrap_or(without_open)
        .trim()
}
