//! Fixed report structure, independent of the PDF backend.

use shared::Advisory;

use crate::analysis::model::Diagnosis;

/// Body text is wrapped to this many characters per line.
pub const WRAP_COLUMNS: usize = 85;

#[derive(Debug, Clone, PartialEq)]
pub enum ReportLine {
    Title(String),
    Heading(String),
    Body(String),
    Bullet(String),
    Spacer,
}

/// Header, three-line diagnosis block, then root cause / remedies / precautions.
/// `None` renders the healthy placeholder used when an image yields no suggestions.
pub fn layout_report(diagnosis: Option<&Diagnosis>, advisory: &Advisory) -> Vec<ReportLine> {
    let labels = &advisory.labels;
    let analysis = &advisory.analysis;
    let mut lines = vec![ReportLine::Title(labels.report_title.clone()), ReportLine::Spacer];

    let (name, confidence, severity) = match diagnosis {
        Some(d) => (
            d.name.clone(),
            format!("{:.1}%", d.confidence * 100.0),
            d.severity().to_string(),
        ),
        None => ("Healthy".to_string(), "N/A".to_string(), "N/A".to_string()),
    };
    push_wrapped(&mut lines, &format!("{}: {}", labels.disease_predicted, name), ReportLine::Body);
    lines.push(ReportLine::Body(format!("{}: {}", labels.confidence, confidence)));
    lines.push(ReportLine::Body(format!("{}: {}", labels.severity, severity)));
    lines.push(ReportLine::Spacer);

    lines.push(ReportLine::Heading(labels.root_cause.clone()));
    push_wrapped(&mut lines, &analysis.root_cause, ReportLine::Body);
    lines.push(ReportLine::Spacer);

    lines.push(ReportLine::Heading(labels.pesticides.clone()));
    if analysis.pesticides.is_empty() {
        lines.push(ReportLine::Body("N/A".to_string()));
    }
    for pesticide in &analysis.pesticides {
        let mut wrapped = wrap_text(pesticide, WRAP_COLUMNS - 4).into_iter();
        if let Some(first) = wrapped.next() {
            lines.push(ReportLine::Bullet(first));
        }
        lines.extend(wrapped.map(|l| ReportLine::Body(format!("    {l}"))));
    }
    lines.push(ReportLine::Spacer);

    lines.push(ReportLine::Heading(labels.precautions.clone()));
    push_wrapped(&mut lines, &analysis.precautions, ReportLine::Body);

    lines
}

fn push_wrapped(lines: &mut Vec<ReportLine>, text: &str, make: fn(String) -> ReportLine) {
    lines.extend(wrap_text(text, WRAP_COLUMNS).into_iter().map(make));
}

/// Greedy word wrap by character count. Words longer than a line are split.
pub fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > max_chars {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let rest = word.split_off(max_chars);
            lines.push(word.into_iter().collect());
            word = rest;
        }

        if current_len + word.len() + 1 > max_chars && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if !current.is_empty() {
            current.push(' ');
            current_len += 1;
        }
        current_len += word.len();
        current.extend(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{AdvisoryAnalysis, ReportLabels};

    fn advisory(pesticides: Vec<&str>) -> Advisory {
        Advisory {
            labels: ReportLabels::default(),
            analysis: AdvisoryAnalysis {
                root_cause: "Fungal spores spread by rain splash.".into(),
                pesticides: pesticides.into_iter().map(String::from).collect(),
                precautions: "Remove infected leaves.".into(),
            },
        }
    }

    #[test]
    fn diagnosis_block_shows_percentage_and_severity() {
        let diagnosis = Diagnosis {
            name: "Leaf Blight".into(),
            confidence: 0.875,
        };
        let lines = layout_report(Some(&diagnosis), &advisory(vec!["Mancozeb"]));
        assert_eq!(lines[0], ReportLine::Title("AgriSense Plant Health Report".into()));
        assert!(lines.contains(&ReportLine::Body("Disease Predicted: Leaf Blight".into())));
        assert!(lines.contains(&ReportLine::Body("Confidence: 87.5%".into())));
        assert!(lines.contains(&ReportLine::Body("Severity: High".into())));
        assert!(lines.contains(&ReportLine::Bullet("Mancozeb".into())));
    }

    #[test]
    fn sections_follow_fixed_order() {
        let lines = layout_report(None, &advisory(vec![]));
        let headings: Vec<_> = lines
            .iter()
            .filter_map(|l| match l {
                ReportLine::Heading(h) => Some(h.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(headings, vec!["Root Cause", "Recommended Pesticides", "Precautions"]);
        assert!(lines.contains(&ReportLine::Body("Disease Predicted: Healthy".into())));
    }

    #[test]
    fn body_lines_respect_wrap_width() {
        let mut long = advisory(vec![]);
        long.analysis.precautions = "water early in the morning ".repeat(20);
        for line in layout_report(None, &long) {
            if let ReportLine::Body(text) = line {
                assert!(text.chars().count() <= WRAP_COLUMNS, "line too long: {text}");
            }
        }
    }

    #[test]
    fn wrap_splits_on_words() {
        assert_eq!(
            wrap_text("one two three four", 9),
            vec!["one two", "three", "four"]
        );
    }

    #[test]
    fn wrap_splits_overlong_words() {
        assert_eq!(wrap_text("abcdefghij", 4), vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn wrap_counts_characters_not_bytes() {
        let text = "पत्ती झुलसा रोग";
        assert_eq!(wrap_text(text, 40), vec![text.to_string()]);
    }

    #[test]
    fn wrap_empty_yields_one_blank_line() {
        assert_eq!(wrap_text("   ", 10), vec![String::new()]);
    }
}
