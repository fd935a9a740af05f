//! Quality gate evaluation for summary-extraction runs.
//!
//! Pure functions over extracted field values and the template thresholds;
//! no I/O and no state. The orchestrator calls [`evaluate`] once, after all
//! fields have resolved.

use std::sync::OnceLock;

use regex::Regex;

use dealroom_core::{FieldType, FieldValue, IssueSeverity, QualityIssue, SummaryTemplate};

/// Result of one quality-gate evaluation.
#[derive(Debug, Clone)]
pub struct QualityReport {
    /// required fields with a non-null value / required fields.
    pub coverage: f64,
    /// Mean confidence over fields with a non-null value.
    pub avg_confidence: f64,
    /// `coverage >= required_coverage && avg_confidence >= min_confidence`.
    pub quality_pass: bool,
    pub issues: Vec<QualityIssue>,
}

fn digit_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d").expect("static regex"))
}

fn boolean_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^\s*(true|false|yes|no|y|n)\s*$").expect("static regex"))
}

/// Raw text longer than this is suspicious for a single extracted field.
const RAW_ANOMALY_MAX_CHARS: usize = 500;

/// Evaluate extracted fields against a template's quality thresholds.
///
/// Coverage counts only required fields. The confidence average excludes
/// null fields rather than counting them as zero, so a missing field is
/// not penalized twice. Issue severities are independent: one field can
/// produce a high and a low issue at once.
pub fn evaluate(fields: &[FieldValue], template: &SummaryTemplate) -> QualityReport {
    let mut issues = Vec::new();

    // Coverage over required fields; a field absent from `fields` counts
    // the same as one extracted with a null value.
    let required: Vec<&str> = template
        .required_fields()
        .map(|f| f.key.as_str())
        .collect();
    let required_non_null = required
        .iter()
        .filter(|key| {
            fields
                .iter()
                .any(|f| f.key == **key && !f.is_null())
        })
        .count();
    let coverage = if required.is_empty() {
        1.0
    } else {
        required_non_null as f64 / required.len() as f64
    };

    for key in &required {
        let missing = !fields.iter().any(|f| f.key == *key && !f.is_null());
        if missing {
            issues.push(QualityIssue {
                severity: IssueSeverity::High,
                field_key: Some(key.to_string()),
                message: format!("required field \"{}\" has no value", key),
                remediation: Some("re-run extraction or fill the field manually".to_string()),
            });
        }
    }

    // Confidence over extracted (non-null) fields only
    let extracted: Vec<&FieldValue> = fields.iter().filter(|f| !f.is_null()).collect();
    let avg_confidence = if extracted.is_empty() {
        0.0
    } else {
        extracted.iter().map(|f| f.confidence).sum::<f64>() / extracted.len() as f64
    };

    for field in &extracted {
        if field.confidence < template.min_confidence {
            issues.push(QualityIssue {
                severity: IssueSeverity::Medium,
                field_key: Some(field.key.clone()),
                message: format!(
                    "confidence {:.2} below template minimum {:.2}",
                    field.confidence, template.min_confidence
                ),
                remediation: Some("verify the extracted value against the source".to_string()),
            });
        }
    }

    for field in fields {
        if let Some(anomaly) = raw_anomaly(field) {
            issues.push(QualityIssue {
                severity: IssueSeverity::Low,
                field_key: Some(field.key.clone()),
                message: anomaly,
                remediation: None,
            });
        }
    }

    let quality_pass =
        coverage >= template.required_coverage && avg_confidence >= template.min_confidence;

    QualityReport {
        coverage,
        avg_confidence,
        quality_pass,
        issues,
    }
}

/// Detect raw text that does not look like its declared field type.
fn raw_anomaly(field: &FieldValue) -> Option<String> {
    let raw = field.raw.as_deref()?;

    if raw.chars().count() > RAW_ANOMALY_MAX_CHARS {
        return Some(format!(
            "raw text for \"{}\" is unusually long ({} chars)",
            field.key,
            raw.chars().count()
        ));
    }

    match field.field_type {
        FieldType::Currency | FieldType::Number | FieldType::Duration => {
            if !digit_re().is_match(raw) {
                return Some(format!(
                    "{:?} field \"{}\" has non-numeric raw text",
                    field.field_type, field.key
                ));
            }
        }
        FieldType::Boolean => {
            if !boolean_re().is_match(raw) {
                return Some(format!(
                    "boolean field \"{}\" has ambiguous raw text",
                    field.key
                ));
            }
        }
        FieldType::Date => {
            if field.is_null() {
                return Some(format!(
                    "date field \"{}\" could not be parsed from raw text",
                    field.key
                ));
            }
        }
        FieldType::Text => {}
    }
    None
}
