//! Survey aggregation: accumulate images under a survey key, then on completion run one
//! background job that classifies every image, merges the diagnoses, asks for a single
//! consolidated advisory, renders and stores the report, notifies, and cleans up.
//!
//! Every change to a survey's accumulation state goes through the registry lock first:
//! an upload, a completion job and a sweep never overlap on the same survey key. A failed
//! job leaves the accumulated images in place, so the survey can be triggered again.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use shared::{OpenSurveyRequest, SurveyCompleteRequest, UploadAck};

use super::model::{SurveyJob, SurveyState, SurveyStatus};
use super::summary::DiseaseSummary;
use crate::analysis::advisory::{AdvisoryGenerator, AdvisorySubject};
use crate::analysis::kindwise::ClassificationClient;
use crate::error::ApiError;
use crate::locale::LocaleTable;
use crate::notify::Notifier;
use crate::report::render_report;
use crate::storage::accumulation::{AccumulationStore, generated_filename, validate_image};
use crate::storage::artifact::ArtifactStore;
use crate::storage::{StorageError, validate_key};

/// Upper bound on retained job records. Oldest finished records are evicted first.
const DEFAULT_RECORD_LIMIT: usize = 10_000;

pub struct SurveyCollaborators {
    pub accumulation: Arc<dyn AccumulationStore>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub classifier: Arc<dyn ClassificationClient>,
    pub advisor: AdvisoryGenerator,
    pub notifier: Arc<dyn Notifier>,
}

/// Who currently holds each survey key.
#[derive(Default)]
struct Registry {
    jobs: HashMap<String, SurveyJob>,
    /// Uploads (or opens) that passed admission and have not finished writing yet.
    writers: HashMap<String, usize>,
    sweeping: HashSet<String>,
}

impl Registry {
    fn job_in_flight(&self, survey_id: &str) -> bool {
        self.jobs
            .get(survey_id)
            .is_some_and(|job| job.status.is_in_flight())
    }

    fn has_writers(&self, survey_id: &str) -> bool {
        self.writers.get(survey_id).is_some_and(|n| *n > 0)
    }

    fn evict_finished(&mut self, limit: usize) {
        if self.jobs.len() <= limit {
            return;
        }
        let mut finished: Vec<(String, chrono::DateTime<chrono::Utc>)> = self
            .jobs
            .iter()
            .filter(|(_, job)| !job.status.is_in_flight())
            .map(|(id, job)| (id.clone(), job.updated_at))
            .collect();
        finished.sort_by_key(|(_, updated_at)| *updated_at);
        let excess = self.jobs.len() - limit;
        for (survey_id, _) in finished.into_iter().take(excess) {
            self.jobs.remove(&survey_id);
        }
    }
}

/// Keeps a survey closed to completion and sweeping while an upload is being written.
struct WriterPermit {
    registry: Arc<Mutex<Registry>>,
    survey_id: String,
}

impl Drop for WriterPermit {
    fn drop(&mut self) {
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(count) = registry.writers.get_mut(&self.survey_id) {
            *count -= 1;
            if *count == 0 {
                registry.writers.remove(&self.survey_id);
            }
        }
    }
}

/// Marks a survey as being swept until dropped.
struct SweepPermit {
    registry: Arc<Mutex<Registry>>,
    survey_id: String,
}

impl Drop for SweepPermit {
    fn drop(&mut self) {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .sweeping
            .remove(&self.survey_id);
    }
}

/// A queued job plus the record it replaced, restored if the trigger is withdrawn.
#[derive(Debug)]
pub(crate) struct Admission {
    pub job: SurveyJob,
    previous: Option<SurveyJob>,
}

#[derive(Clone)]
pub struct SurveyAggregator {
    collaborators: Arc<SurveyCollaborators>,
    locales: Arc<LocaleTable>,
    notify_topic: Arc<str>,
    registry: Arc<Mutex<Registry>>,
    record_limit: usize,
}

fn required_survey_id(survey_id: Option<&str>) -> Result<&str, ApiError> {
    let survey_id = survey_id
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::InvalidRequest("Survey ID is required.".into()))?;
    Ok(validate_key("survey id", survey_id)?)
}

impl SurveyAggregator {
    pub fn new(
        collaborators: SurveyCollaborators,
        locales: Arc<LocaleTable>,
        notify_topic: String,
    ) -> Self {
        Self {
            collaborators: Arc::new(collaborators),
            locales,
            notify_topic: notify_topic.into(),
            registry: Arc::new(Mutex::new(Registry::default())),
            record_limit: DEFAULT_RECORD_LIMIT,
        }
    }

    pub fn with_record_limit(mut self, limit: usize) -> Self {
        self.record_limit = limit;
        self
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admits a writer unless a job or a sweep holds the survey.
    fn begin_write(&self, survey_id: &str) -> Result<WriterPermit, ApiError> {
        let mut registry = self.registry();
        if registry.job_in_flight(survey_id) || registry.sweeping.contains(survey_id) {
            return Err(ApiError::SurveyBusy(survey_id.to_string()));
        }
        *registry.writers.entry(survey_id.to_string()).or_insert(0) += 1;
        Ok(WriterPermit {
            registry: self.registry.clone(),
            survey_id: survey_id.to_string(),
        })
    }

    /// Creates an empty accumulation state so that a survey can complete with no images.
    pub async fn open_survey(&self, request: OpenSurveyRequest) -> Result<String, ApiError> {
        let survey_id = required_survey_id(request.survey_id.as_deref())?;
        let _permit = self.begin_write(survey_id)?;
        self.collaborators.accumulation.open(survey_id).await?;
        log::info!("Opened survey {}", survey_id);
        Ok(survey_id.to_string())
    }

    /// Appends one image to the survey, creating its accumulation state on first use.
    pub async fn upload_image(
        &self,
        survey_id: Option<&str>,
        filename: Option<&str>,
        image: &[u8],
    ) -> Result<UploadAck, ApiError> {
        let survey_id = required_survey_id(survey_id)?;
        let filename = match filename.map(str::trim).filter(|f| !f.is_empty()) {
            Some(name) => name.to_string(),
            None => generated_filename(image, validate_image(image)?),
        };

        let _permit = self.begin_write(survey_id)?;
        self.collaborators
            .accumulation
            .append(survey_id, &filename, image)
            .await?;
        log::info!("Accepted image {} for survey {}", filename, survey_id);

        Ok(UploadAck {
            status: "success".into(),
            filename,
            survey_id: survey_id.to_string(),
        })
    }

    /// Completion trigger. Admits the survey and dispatches its job without waiting for it.
    pub async fn complete_survey(
        &self,
        request: SurveyCompleteRequest,
    ) -> Result<SurveyJob, ApiError> {
        let survey_id = required_survey_id(request.survey_id.as_deref())?;
        let admission = self.admit(survey_id, request.language_code)?;

        // The survey is held from here on, so the answer cannot change under the job.
        let exists = match self.collaborators.accumulation.exists(survey_id).await {
            Ok(exists) => exists,
            Err(e) => {
                self.withdraw(admission);
                return Err(e.into());
            }
        };
        if !exists {
            self.withdraw(admission);
            return Err(ApiError::NotFound(format!(
                "No accumulated images for survey {survey_id}"
            )));
        }

        let job = admission.job;
        let aggregator = self.clone();
        let queued = job.clone();
        actix_web::rt::spawn(async move {
            aggregator.run_job(queued).await;
        });
        Ok(job)
    }

    /// Atomically claims the survey's admission slot and records a queued job.
    pub(crate) fn admit(
        &self,
        survey_id: &str,
        language_code: Option<String>,
    ) -> Result<Admission, ApiError> {
        let mut registry = self.registry();
        if registry.job_in_flight(survey_id)
            || registry.has_writers(survey_id)
            || registry.sweeping.contains(survey_id)
        {
            log::warn!("Rejected completion trigger for busy survey {}", survey_id);
            return Err(ApiError::SurveyBusy(survey_id.to_string()));
        }
        let job = SurveyJob::queued(survey_id, language_code);
        let previous = registry.jobs.insert(survey_id.to_string(), job.clone());
        registry.evict_finished(self.record_limit);
        log::info!("Queued job {} for survey {}", job.id, survey_id);
        Ok(Admission { job, previous })
    }

    /// Releases a queued job that was never dispatched.
    fn withdraw(&self, admission: Admission) {
        let mut registry = self.registry();
        let survey_id = &admission.job.survey_id;
        if registry
            .jobs
            .get(survey_id)
            .is_some_and(|job| job.id == admission.job.id)
        {
            match admission.previous {
                Some(previous) => registry.jobs.insert(survey_id.clone(), previous),
                None => registry.jobs.remove(survey_id),
            };
        }
    }

    fn update_job(&self, job_id: &str, survey_id: &str, update: impl FnOnce(&mut SurveyJob)) {
        if let Some(job) = self.registry().jobs.get_mut(survey_id) {
            if job.id == job_id {
                update(job);
            }
        }
    }

    /// Runs an admitted job to DONE or FAILED. Errors never escape the job.
    pub(crate) async fn run_job(&self, job: SurveyJob) -> SurveyStatus {
        log::info!("Starting background processing for survey: {}", job.survey_id);
        self.update_job(&job.id, &job.survey_id, |j| j.set_status(SurveyStatus::Running));

        match self
            .process(&job.survey_id, job.language_code.as_deref())
            .await
        {
            Ok(summary) => {
                log::info!("Survey {} completed: {}", job.survey_id, summary);
                self.update_job(&job.id, &job.survey_id, |j| j.set_done(summary));
                SurveyStatus::Done
            }
            Err(e) => {
                log::error!("Survey {} failed: {}", job.survey_id, e);
                self.update_job(&job.id, &job.survey_id, |j| j.set_error(e.to_string()));
                SurveyStatus::Failed
            }
        }
    }

    async fn process(
        &self,
        survey_id: &str,
        language_code: Option<&str>,
    ) -> Result<String, ApiError> {
        let c = &self.collaborators;

        let images = c.accumulation.list(survey_id).await?;
        log::info!("Survey {}: classifying {} image(s)", survey_id, images.len());

        let mut summary = DiseaseSummary::new();
        for filename in &images {
            let bytes = c.accumulation.read(survey_id, filename).await?;
            let identification = c.classifier.identify(&bytes).await?;
            summary.record(identification.top_diagnosis().as_ref());
        }

        let phrase = summary.phrase();
        log::info!(
            "Survey {} summary: {} ({} of {} image(s) diseased)",
            survey_id,
            phrase,
            summary.total(),
            images.len()
        );

        let locale = self.locales.resolve(language_code);
        let advisory = c
            .advisor
            .advise(
                &AdvisorySubject::Survey {
                    summary: phrase.clone(),
                },
                &locale.name,
            )
            .await?;

        let consolidated = summary.synthetic_diagnosis();
        let pdf = render_report(Some(&consolidated), &advisory, locale)?;
        c.artifacts.put(survey_id, pdf).await?;

        if let Err(e) = c.notifier.publish(&self.notify_topic, survey_id).await {
            log::warn!("Failed to publish MQTT message for survey {}: {}", survey_id, e);
        }

        if let Err(e) = c.accumulation.delete(survey_id).await {
            log::error!("Failed to clean up images for survey {}: {}", survey_id, e);
        }

        Ok(phrase)
    }

    pub async fn survey_state(&self, survey_id: &str) -> Result<SurveyState, ApiError> {
        let survey_id = validate_key("survey id", survey_id)?;
        let job = self.registry().jobs.get(survey_id).cloned();
        let accumulating = self.collaborators.accumulation.exists(survey_id).await?;

        let status = match &job {
            Some(job) if job.status.is_in_flight() => job.status,
            // Uploads after a finished job start a fresh accumulation.
            Some(job) if job.status == SurveyStatus::Done && accumulating => {
                SurveyStatus::Accumulating
            }
            Some(job) => job.status,
            None if accumulating => SurveyStatus::Accumulating,
            None => return Err(ApiError::NotFound(format!("Unknown survey {survey_id}"))),
        };

        Ok(SurveyState {
            survey_id: survey_id.to_string(),
            status,
            job,
        })
    }

    /// Report retrieval. Absent reports are `NotFound` until the job finishes.
    pub async fn report(&self, survey_id: &str) -> Result<Vec<u8>, ApiError> {
        let survey_id = validate_key("survey id", survey_id)?;
        match self.collaborators.artifacts.get(survey_id).await {
            Ok(bytes) => Ok(bytes),
            Err(StorageError::NotFound(_)) => Err(ApiError::NotFound(
                "Report not found or not yet ready.".into(),
            )),
            Err(e) => Err(e.into()),
        }
    }

    /// Deletes accumulation states untouched for `max_age` that no job or upload holds.
    pub async fn sweep_abandoned(&self, max_age: Duration) -> Result<usize, StorageError> {
        let stale = self.collaborators.accumulation.stale_surveys(max_age).await?;
        let mut removed = 0;
        for survey_id in stale {
            let Some(_permit) = self.begin_sweep(&survey_id) else {
                continue;
            };
            match self.collaborators.accumulation.delete(&survey_id).await {
                Ok(()) => {
                    log::info!("Swept abandoned survey {}", survey_id);
                    removed += 1;
                }
                Err(e) => log::warn!("Failed to sweep survey {}: {}", survey_id, e),
            }
        }
        Ok(removed)
    }

    fn begin_sweep(&self, survey_id: &str) -> Option<SweepPermit> {
        let mut registry = self.registry();
        if registry.job_in_flight(survey_id) || registry.has_writers(survey_id) {
            return None;
        }
        registry.sweeping.insert(survey_id.to_string());
        Some(SweepPermit {
            registry: self.registry.clone(),
            survey_id: survey_id.to_string(),
        })
    }

    /// Forgets DONE/FAILED job records older than `retention`. In-flight records stay.
    pub fn prune_finished_jobs(&self, retention: Duration) -> usize {
        let mut registry = self.registry();
        let before = registry.jobs.len();
        registry.jobs.retain(|_, job| !job.finished_before(retention));
        before - registry.jobs.len()
    }

    #[cfg(test)]
    fn job_records(&self) -> usize {
        self.registry().jobs.len()
    }
}
