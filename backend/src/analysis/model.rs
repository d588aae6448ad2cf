use shared::{DiagnosisSummary, Severity, Suggestion};

const HIGH_SEVERITY_THRESHOLD: f32 = 0.75;
const MEDIUM_SEVERITY_THRESHOLD: f32 = 0.40;

/// Ranked identification result for a single image. Index 0 is the most likely condition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Identification {
    pub suggestions: Vec<Suggestion>,
}

impl Identification {
    /// Builds a ranked result, clamping probabilities into [0, 1] and ordering by
    /// descending confidence. Ties keep the upstream order.
    pub fn ranked(mut suggestions: Vec<Suggestion>) -> Self {
        for suggestion in &mut suggestions {
            suggestion.probability = if suggestion.probability.is_nan() {
                0.0
            } else {
                suggestion.probability.clamp(0.0, 1.0)
            };
        }
        suggestions.sort_by(|a, b| b.probability.total_cmp(&a.probability));
        Self { suggestions }
    }

    /// The image's diagnosis record: only the top-ranked candidate counts.
    /// `None` means the service found nothing, which is treated as healthy.
    pub fn top_diagnosis(&self) -> Option<Diagnosis> {
        self.suggestions.first().map(|s| Diagnosis {
            name: s.name.clone(),
            confidence: s.probability,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnosis {
    pub name: String,
    pub confidence: f32,
}

impl Diagnosis {
    pub fn severity(&self) -> Severity {
        severity_for(self.confidence)
    }

    pub fn summary(&self) -> DiagnosisSummary {
        DiagnosisSummary {
            name: self.name.clone(),
            confidence: self.confidence,
            severity: self.severity(),
        }
    }
}

/// Boundary values fall into the lower bucket.
pub fn severity_for(confidence: f32) -> Severity {
    if confidence > HIGH_SEVERITY_THRESHOLD {
        Severity::High
    } else if confidence > MEDIUM_SEVERITY_THRESHOLD {
        Severity::Medium
    } else {
        Severity::Low
    }
}
