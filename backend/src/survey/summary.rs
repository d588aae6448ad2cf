use std::collections::HashMap;

use crate::analysis::model::Diagnosis;

pub const ALL_HEALTHY: &str = "All plants appear healthy.";

/// Occurrence count per exact disease name across a survey.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DiseaseSummary {
    counts: HashMap<String, usize>,
}

impl DiseaseSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one image's diagnosis record. `None` (no suggestions) contributes nothing.
    pub fn record(&mut self, diagnosis: Option<&Diagnosis>) {
        if let Some(diagnosis) = diagnosis {
            *self.counts.entry(diagnosis.name.clone()).or_insert(0) += 1;
        }
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    /// "2 plant(s) with Leaf Blight, 1 plant(s) with Rust", most frequent first, ties by
    /// name. Collapses to the all-healthy phrase when nothing was found.
    pub fn phrase(&self) -> String {
        if self.counts.is_empty() {
            return ALL_HEALTHY.to_string();
        }
        let mut entries: Vec<(&String, &usize)> = self.counts.iter().collect();
        entries.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        entries
            .into_iter()
            .map(|(name, count)| format!("{count} plant(s) with {name}"))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Single-entry stand-in so the per-image report layout can render the survey.
    pub fn synthetic_diagnosis(&self) -> Diagnosis {
        Diagnosis {
            name: self.phrase(),
            confidence: 1.0,
        }
    }
}

impl<'a> FromIterator<Option<&'a Diagnosis>> for DiseaseSummary {
    fn from_iter<I: IntoIterator<Item = Option<&'a Diagnosis>>>(iter: I) -> Self {
        let mut summary = DiseaseSummary::new();
        for diagnosis in iter {
            summary.record(diagnosis);
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diagnosis(name: &str) -> Diagnosis {
        Diagnosis {
            name: name.into(),
            confidence: 0.9,
        }
    }

    #[test]
    fn empty_survey_is_all_healthy() {
        let summary = DiseaseSummary::new();
        assert_eq!(summary.phrase(), ALL_HEALTHY);
        let synthetic = summary.synthetic_diagnosis();
        assert_eq!(synthetic.name, ALL_HEALTHY);
        assert_eq!(synthetic.confidence, 1.0);
    }

    #[test]
    fn healthy_images_do_not_count() {
        let summary: DiseaseSummary = [None::<&Diagnosis>, None].into_iter().collect();
        assert_eq!(summary.total(), 0);
        assert_eq!(summary.phrase(), ALL_HEALTHY);
    }

    #[test]
    fn counts_by_exact_name() {
        let records = [
            Some(diagnosis("Leaf Blight")),
            Some(diagnosis("Leaf Blight")),
            Some(diagnosis("Rust")),
            Some(diagnosis("rust")),
            None,
        ];
        let summary: DiseaseSummary = records.iter().map(Option::as_ref).collect();
        assert_eq!(summary.counts["Leaf Blight"], 2);
        assert_eq!(summary.counts["Rust"], 1);
        assert_eq!(summary.counts["rust"], 1);
        assert_eq!(summary.total(), 4);
    }

    #[test]
    fn phrase_orders_by_frequency_then_name() {
        let records = [
            Some(diagnosis("Rust")),
            Some(diagnosis("Leaf Blight")),
            Some(diagnosis("Leaf Blight")),
        ];
        let summary: DiseaseSummary = records.iter().map(Option::as_ref).collect();
        assert_eq!(summary.phrase(), "2 plant(s) with Leaf Blight, 1 plant(s) with Rust");
    }

    #[test]
    fn phrase_is_independent_of_input_order() {
        let summarize = |names: Vec<&str>| {
            let records: Vec<Diagnosis> = names.into_iter().map(diagnosis).collect();
            records.iter().map(Some).collect::<DiseaseSummary>()
        };
        let names = vec!["Mildew", "Rust", "Mildew", "Blight", "Rust"];
        let forward = summarize(names.clone());
        let backward = summarize(names.into_iter().rev().collect());
        assert_eq!(forward.phrase(), backward.phrase());
        assert_eq!(
            forward.phrase(),
            "2 plant(s) with Mildew, 2 plant(s) with Rust, 1 plant(s) with Blight"
        );
    }
}
