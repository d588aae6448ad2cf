use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// One ranked candidate returned by the crop-disease identification service.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Suggestion {
    pub name: String,
    pub probability: f32,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Display, EnumString, AsRefStr)]
pub enum Severity {
    High,
    Medium,
    Low,
}

/// Localized titles used when laying out a report.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ReportLabels {
    pub report_title: String,
    pub disease_predicted: String,
    pub confidence: String,
    pub severity: String,
    pub root_cause: String,
    pub pesticides: String,
    pub precautions: String,
}

impl Default for ReportLabels {
    fn default() -> Self {
        Self {
            report_title: "AgriSense Plant Health Report".into(),
            disease_predicted: "Disease Predicted".into(),
            confidence: "Confidence".into(),
            severity: "Severity".into(),
            root_cause: "Root Cause".into(),
            pesticides: "Recommended Pesticides".into(),
            precautions: "Precautions".into(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AdvisoryAnalysis {
    pub root_cause: String,
    pub pesticides: Vec<String>,
    pub precautions: String,
}

impl AdvisoryAnalysis {
    /// Static advice used when a single image yields no disease suggestions.
    pub fn healthy() -> Self {
        Self {
            root_cause: "N/A".into(),
            pesticides: Vec::new(),
            precautions: "The plant appears healthy.".into(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Advisory {
    pub labels: ReportLabels,
    pub analysis: AdvisoryAnalysis,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Coordinates {
    pub row: i64,
    pub col: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DiagnosisSummary {
    pub name: String,
    pub confidence: f32,
    pub severity: Severity,
}

/// Payload returned to the live map for one analyzed plant.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AnalysisResponse {
    /// Ranked classifier suggestions, most probable first.
    pub classification: Vec<Suggestion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnosis: Option<DiagnosisSummary>,
    pub advisory: Advisory,
    pub coordinates: Coordinates,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct OpenSurveyRequest {
    pub survey_id: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct SurveyCompleteRequest {
    pub survey_id: Option<String>,
    pub language_code: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SurveyAck {
    pub status: String,
    pub message: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct UploadAck {
    pub status: String,
    pub filename: String,
    pub survey_id: String,
}
