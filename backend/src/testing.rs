//! Test doubles for the external collaborators.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use shared::Suggestion;
use tempfile::TempDir;

use crate::analysis::DependencyError;
use crate::analysis::advisory::{AdvisoryGenerator, TextGenerator};
use crate::analysis::kindwise::ClassificationClient;
use crate::analysis::model::Identification;
use crate::locale::LocaleTable;
use crate::notify::{NotifyError, Notifier};
use crate::storage::StorageError;
use crate::storage::accumulation::{AccumulationStore, LocalAccumulationStore};
use crate::storage::artifact::LocalArtifactStore;
use crate::survey::aggregator::{SurveyAggregator, SurveyCollaborators};

/// Smallest byte sequence that sniffs as a PNG.
pub const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

pub const TOPIC: &str = "agrisense/test/report_ready";

pub const ADVISORY_JSON: &str = r#"```json
{
    "labels": {
        "report_title": "AgriSense Survey Report",
        "disease_predicted": "Findings",
        "confidence": "Confidence",
        "severity": "Severity",
        "root_cause": "Root Cause",
        "pesticides": "Pesticides",
        "precautions": "Precautions"
    },
    "analysis": {
        "root_cause": "Warm, humid conditions favour fungal growth.",
        "pesticides": ["Mancozeb", "Propiconazole"],
        "precautions": "Improve drainage and remove debris."
    }
}
```"#;

/// A PNG whose trailing bytes tell [`ScriptedClassifier`] what to answer: a disease
/// name, `FAIL` for an upstream error, or nothing for a healthy plant.
pub fn leaf_image(tag: &str) -> Vec<u8> {
    [PNG_BYTES, tag.as_bytes()].concat()
}

pub struct ScriptedClassifier {
    pub calls: Mutex<usize>,
}

#[async_trait]
impl ClassificationClient for ScriptedClassifier {
    async fn identify(&self, image: &[u8]) -> Result<Identification, DependencyError> {
        *self.calls.lock().unwrap() += 1;
        let tag = String::from_utf8_lossy(&image[PNG_BYTES.len()..]).to_string();
        match tag.as_str() {
            "" => Ok(Identification::default()),
            "FAIL" => Err(DependencyError::Upstream {
                service: "Kindwise",
                status: 500,
                body: "internal error".into(),
            }),
            name => Ok(Identification::ranked(vec![
                Suggestion {
                    name: name.to_string(),
                    probability: 0.82,
                },
                Suggestion {
                    name: "Other".into(),
                    probability: 0.1,
                },
            ])),
        }
    }
}

/// Records prompts and answers with a fixed reply, or a transport error when `reply` is `None`.
pub struct CountingLlm {
    pub reply: Option<String>,
    pub prompts: Mutex<Vec<String>>,
}

impl CountingLlm {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn unreachable() -> Self {
        Self {
            reply: None,
            prompts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl TextGenerator for CountingLlm {
    async fn generate(&self, prompt: &str) -> Result<String, DependencyError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.reply.clone().ok_or_else(|| DependencyError::Transport {
            service: "Gemini",
            message: "connection refused".into(),
        })
    }
}

pub struct RecordingNotifier {
    pub fail: bool,
    pub published: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn publish(&self, topic: &str, message: &str) -> Result<(), NotifyError> {
        if self.fail {
            return Err(NotifyError::Connection("broker unreachable".into()));
        }
        self.published
            .lock()
            .unwrap()
            .push((topic.to_string(), message.to_string()));
        Ok(())
    }
}

/// Local store whose writes and deletes take `delay` to complete.
pub struct SlowAccumulationStore {
    pub inner: Arc<LocalAccumulationStore>,
    pub delay: Duration,
}

#[async_trait]
impl AccumulationStore for SlowAccumulationStore {
    async fn open(&self, survey_id: &str) -> Result<(), StorageError> {
        self.inner.open(survey_id).await
    }

    async fn append(
        &self,
        survey_id: &str,
        filename: &str,
        bytes: &[u8],
    ) -> Result<(), StorageError> {
        actix_web::rt::time::sleep(self.delay).await;
        self.inner.append(survey_id, filename, bytes).await
    }

    async fn exists(&self, survey_id: &str) -> Result<bool, StorageError> {
        self.inner.exists(survey_id).await
    }

    async fn list(&self, survey_id: &str) -> Result<Vec<String>, StorageError> {
        self.inner.list(survey_id).await
    }

    async fn read(&self, survey_id: &str, filename: &str) -> Result<Vec<u8>, StorageError> {
        self.inner.read(survey_id, filename).await
    }

    async fn delete(&self, survey_id: &str) -> Result<(), StorageError> {
        actix_web::rt::time::sleep(self.delay).await;
        self.inner.delete(survey_id).await
    }

    async fn stale_surveys(&self, max_age: Duration) -> Result<Vec<String>, StorageError> {
        self.inner.stale_surveys(max_age).await
    }
}

/// Knobs for [`Harness::build`].
pub struct HarnessOptions {
    pub notifier_fails: bool,
    pub llm: CountingLlm,
    pub store_delay: Option<Duration>,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            notifier_fails: false,
            llm: CountingLlm::replying(ADVISORY_JSON),
            store_delay: None,
        }
    }
}

/// Aggregator wired to temp-dir stores and scripted services.
pub struct Harness {
    pub dir: TempDir,
    pub aggregator: SurveyAggregator,
    pub classifier: Arc<ScriptedClassifier>,
    pub llm: Arc<CountingLlm>,
    pub notifier: Arc<RecordingNotifier>,
    pub accumulation: Arc<LocalAccumulationStore>,
    pub artifacts: Arc<LocalArtifactStore>,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(HarnessOptions::default())
    }

    pub fn with_notifier_failing(fail: bool) -> Self {
        Self::build(HarnessOptions {
            notifier_fails: fail,
            ..HarnessOptions::default()
        })
    }

    pub fn build(options: HarnessOptions) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let classifier = Arc::new(ScriptedClassifier {
            calls: Mutex::new(0),
        });
        let llm = Arc::new(options.llm);
        let notifier = Arc::new(RecordingNotifier {
            fail: options.notifier_fails,
            published: Mutex::new(Vec::new()),
        });
        let accumulation = Arc::new(LocalAccumulationStore::new(dir.path().join("temp_uploads")));
        let artifacts = Arc::new(LocalArtifactStore::new(dir.path().join("reports")));

        let store: Arc<dyn AccumulationStore> = match options.store_delay {
            Some(delay) => Arc::new(SlowAccumulationStore {
                inner: accumulation.clone(),
                delay,
            }),
            None => accumulation.clone(),
        };

        let aggregator = SurveyAggregator::new(
            SurveyCollaborators {
                accumulation: store,
                artifacts: artifacts.clone(),
                classifier: classifier.clone(),
                advisor: AdvisoryGenerator::new(llm.clone()),
                notifier: notifier.clone(),
            },
            Arc::new(LocaleTable::builtin()),
            TOPIC.to_string(),
        );

        Self {
            dir,
            aggregator,
            classifier,
            llm,
            notifier,
            accumulation,
            artifacts,
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.llm.prompts.lock().unwrap().clone()
    }

    pub fn published(&self) -> Vec<(String, String)> {
        self.notifier.published.lock().unwrap().clone()
    }
}
