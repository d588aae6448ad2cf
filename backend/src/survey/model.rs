use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum SurveyStatus {
    #[serde(rename = "ACCUMULATING")]
    Accumulating,
    #[serde(rename = "QUEUED")]
    Queued,
    #[serde(rename = "RUNNING")]
    Running,
    #[serde(rename = "DONE")]
    Done,
    #[serde(rename = "FAILED")]
    Failed,
}

impl SurveyStatus {
    /// Queued and running jobs hold the survey's admission slot.
    pub fn is_in_flight(self) -> bool {
        matches!(self, SurveyStatus::Queued | SurveyStatus::Running)
    }
}

impl Default for SurveyStatus {
    fn default() -> Self {
        SurveyStatus::Accumulating
    }
}

/// Lifecycle record for one completion trigger.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SurveyJob {
    pub id: String,
    pub survey_id: String,
    pub language_code: Option<String>,
    pub status: SurveyStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SurveyJob {
    pub fn queued(survey_id: &str, language_code: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            survey_id: survey_id.to_string(),
            language_code,
            status: SurveyStatus::Queued,
            created_at: now,
            updated_at: now,
            summary: None,
            error: None,
        }
    }

    pub fn set_status(&mut self, status: SurveyStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    pub fn set_done(&mut self, summary: String) {
        self.summary = Some(summary);
        self.set_status(SurveyStatus::Done);
    }

    pub fn set_error(&mut self, error: String) {
        self.error = Some(error);
        self.set_status(SurveyStatus::Failed);
    }

    /// True for DONE/FAILED records last touched at least `retention` ago.
    pub fn finished_before(&self, retention: Duration) -> bool {
        if self.status.is_in_flight() {
            return false;
        }
        Utc::now()
            .signed_duration_since(self.updated_at)
            .to_std()
            .is_ok_and(|elapsed| elapsed >= retention)
    }
}

/// What the status endpoint reports for a survey key.
#[derive(Debug, Serialize, Clone)]
pub struct SurveyState {
    pub survey_id: String,
    pub status: SurveyStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job: Option<SurveyJob>,
}
