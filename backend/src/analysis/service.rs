//! Single-image analysis used by the live map and the one-off report download.

use std::sync::Arc;

use shared::{Advisory, AdvisoryAnalysis, AnalysisResponse, Coordinates, ReportLabels};

use super::DependencyError;
use super::advisory::{AdvisoryGenerator, AdvisorySubject};
use super::kindwise::ClassificationClient;
use super::model::{Diagnosis, Identification};
use crate::locale::LocaleTable;
use crate::report::{RenderError, render_report};

#[derive(Debug, Clone)]
pub struct PlantAnalysis {
    pub identification: Identification,
    pub diagnosis: Option<Diagnosis>,
    pub advisory: Advisory,
}

impl PlantAnalysis {
    pub fn into_response(self, coordinates: Coordinates) -> AnalysisResponse {
        AnalysisResponse {
            classification: self.identification.suggestions,
            diagnosis: self.diagnosis.as_ref().map(Diagnosis::summary),
            advisory: self.advisory,
            coordinates,
        }
    }
}

#[derive(Clone)]
pub struct PlantAnalyzer {
    classifier: Arc<dyn ClassificationClient>,
    advisor: AdvisoryGenerator,
    locales: Arc<LocaleTable>,
}

impl PlantAnalyzer {
    pub fn new(
        classifier: Arc<dyn ClassificationClient>,
        advisor: AdvisoryGenerator,
        locales: Arc<LocaleTable>,
    ) -> Self {
        Self {
            classifier,
            advisor,
            locales,
        }
    }

    /// Classifies one image and, when a disease was found, asks for advice on it.
    /// A plant with no suggestions gets the static healthy advisory without a model call.
    pub async fn analyze(
        &self,
        image: &[u8],
        language_code: Option<&str>,
    ) -> Result<PlantAnalysis, DependencyError> {
        let identification = self.classifier.identify(image).await?;
        let diagnosis = identification.top_diagnosis();

        let advisory = match &diagnosis {
            Some(diagnosis) => {
                log::info!(
                    "Identified {} ({:.2}), severity {}",
                    diagnosis.name,
                    diagnosis.confidence,
                    diagnosis.severity()
                );
                let locale = self.locales.resolve(language_code);
                self.advisor
                    .advise(
                        &AdvisorySubject::Disease {
                            name: diagnosis.name.clone(),
                            severity: diagnosis.severity(),
                        },
                        &locale.name,
                    )
                    .await?
            }
            None => {
                log::info!("No disease suggestions; reporting a healthy plant");
                Advisory {
                    labels: ReportLabels::default(),
                    analysis: AdvisoryAnalysis::healthy(),
                }
            }
        };

        Ok(PlantAnalysis {
            identification,
            diagnosis,
            advisory,
        })
    }

    pub fn render(
        &self,
        analysis: &PlantAnalysis,
        language_code: Option<&str>,
    ) -> Result<Vec<u8>, RenderError> {
        render_report(
            analysis.diagnosis.as_ref(),
            &analysis.advisory,
            self.locales.resolve(language_code),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ADVISORY_JSON, CountingLlm, ScriptedClassifier, leaf_image};
    use shared::Severity;
    use std::sync::Mutex;

    fn analyzer() -> (PlantAnalyzer, Arc<CountingLlm>) {
        let llm = Arc::new(CountingLlm::replying(ADVISORY_JSON));
        let analyzer = PlantAnalyzer::new(
            Arc::new(ScriptedClassifier {
                calls: Mutex::new(0),
            }),
            AdvisoryGenerator::new(llm.clone()),
            Arc::new(LocaleTable::builtin()),
        );
        (analyzer, llm)
    }

    #[actix_web::test]
    async fn diseased_plant_gets_generated_advice() {
        let (analyzer, llm) = analyzer();
        let analysis = analyzer.analyze(&leaf_image("Rust"), Some("hi")).await.unwrap();

        let diagnosis = analysis.diagnosis.clone().unwrap();
        assert_eq!(diagnosis.name, "Rust");
        assert_eq!(diagnosis.severity(), Severity::High);
        assert_eq!(analysis.advisory.analysis.pesticides.len(), 2);

        let prompts = llm.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("'Rust'"));
        assert!(prompts[0].contains("Hindi"));
    }

    #[actix_web::test]
    async fn healthy_plant_skips_the_model() {
        let (analyzer, llm) = analyzer();
        let analysis = analyzer.analyze(&leaf_image(""), None).await.unwrap();

        assert!(analysis.diagnosis.is_none());
        assert_eq!(analysis.advisory.analysis, AdvisoryAnalysis::healthy());
        assert!(llm.prompts.lock().unwrap().is_empty());

        let response = analysis.into_response(Coordinates { row: 2, col: 5 });
        assert!(response.classification.is_empty());
        assert_eq!(response.coordinates, Coordinates { row: 2, col: 5 });
    }

    #[actix_web::test]
    async fn classifier_failure_propagates() {
        let (analyzer, _) = analyzer();
        let err = analyzer.analyze(&leaf_image("FAIL"), None).await.unwrap_err();
        assert!(matches!(err, DependencyError::Upstream { status: 500, .. }));
    }

    #[actix_web::test]
    async fn renders_single_plant_report() {
        let (analyzer, _) = analyzer();
        let analysis = analyzer.analyze(&leaf_image("Rust"), None).await.unwrap();
        let pdf = analyzer.render(&analysis, None).unwrap();
        assert!(pdf.starts_with(b"%PDF"));
    }
}
