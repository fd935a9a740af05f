//! Export serializers for query history and summary jobs.
//!
//! Pure serialization of the data model: JSON and CSV-equivalent artifacts
//! with configurable inclusion of confidence scores, evidence, and quality
//! issues. No new semantics live here.

use serde_json::{json, Value as JsonValue};

use dealroom_core::{ExportOptions, Query, Result, SummaryJob, TypedValue};

/// Render a typed value for flat (CSV) output.
fn typed_value_display(value: &TypedValue) -> String {
    match value {
        TypedValue::Text(s) => s.clone(),
        TypedValue::Date(d) => d.to_string(),
        TypedValue::Currency { amount, currency } => format!("{} {}", amount, currency),
        TypedValue::Boolean(b) => b.to_string(),
        TypedValue::DurationDays(d) => format!("{} days", d),
        TypedValue::Number(n) => n.to_string(),
        TypedValue::Null => String::new(),
    }
}

/// Quote a CSV cell, escaping embedded quotes.
fn csv_escape(cell: &str) -> String {
    if cell.contains(',') || cell.contains('"') || cell.contains('\n') {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}

fn citation_json(query: &Query, opts: &ExportOptions) -> Vec<JsonValue> {
    query
        .citations
        .iter()
        .map(|c| {
            let mut obj = json!({
                "document_id": c.document_id,
                "document_title": c.document_title,
                "page": c.page,
                "rank": c.rank,
            });
            if opts.include_confidence {
                obj["relevance"] = json!(c.relevance);
            }
            if opts.include_evidence {
                obj["preview"] = json!(c.preview);
            }
            obj
        })
        .collect()
}

/// Export query history as a JSON document.
pub fn export_history_json(queries: &[Query], opts: &ExportOptions) -> Result<String> {
    let entries: Vec<JsonValue> = queries
        .iter()
        .map(|q| {
            json!({
                "id": q.id,
                "room_id": q.room_id,
                "created_at": q.created_at,
                "question": q.question,
                "answer": q.answer,
                "answer_type": q.answer_type,
                "citations": citation_json(q, opts),
                "feedback": q.feedback,
            })
        })
        .collect();

    Ok(serde_json::to_string_pretty(&json!({ "queries": entries }))?)
}

/// Export query history as CSV, one row per exchange.
pub fn export_history_csv(queries: &[Query]) -> String {
    let mut out = String::from("id,created_at,question,answer_type,answer,citations,rating\n");
    for q in queries {
        let answer_type = q
            .answer_type
            .map(|t| {
                serde_json::to_value(t)
                    .ok()
                    .and_then(|v| v.as_str().map(String::from))
                    .unwrap_or_default()
            })
            .unwrap_or_default();
        let rating = q
            .feedback
            .as_ref()
            .map(|f| {
                serde_json::to_value(f.rating)
                    .ok()
                    .and_then(|v| v.as_str().map(String::from))
                    .unwrap_or_default()
            })
            .unwrap_or_default();

        out.push_str(&format!(
            "{},{},{},{},{},{},{}\n",
            q.id,
            q.created_at.to_rfc3339(),
            csv_escape(&q.question),
            answer_type,
            csv_escape(q.answer.as_deref().unwrap_or("")),
            q.citations.len(),
            rating,
        ));
    }
    out
}

/// Export a single summary job as a JSON document.
pub fn export_summary_json(job: &SummaryJob, opts: &ExportOptions) -> Result<String> {
    let fields: Vec<JsonValue> = job
        .fields
        .iter()
        .map(|f| {
            let mut obj = json!({
                "key": f.key,
                "field_type": f.field_type,
                "raw": f.raw,
                "value": f.value,
                "method": f.method,
                "source_page": f.source_page,
            });
            if opts.include_confidence {
                obj["confidence"] = json!(f.confidence);
            }
            if opts.include_evidence {
                obj["evidence"] = json!(f.evidence);
            }
            obj
        })
        .collect();

    let mut doc = json!({
        "job_id": job.id,
        "document_id": job.document_id,
        "template_key": job.template_key,
        "status": job.status,
        "quality_pass": job.quality_pass,
        "fields": fields,
        "created_at": job.created_at,
        "updated_at": job.updated_at,
    });
    if opts.include_confidence {
        doc["coverage"] = json!(job.coverage);
        doc["avg_confidence"] = json!(job.avg_confidence);
    }
    if opts.include_issues {
        doc["issues"] = serde_json::to_value(&job.issues)?;
    }

    Ok(serde_json::to_string_pretty(&doc)?)
}

/// Export a single summary job as CSV, one row per field.
pub fn export_summary_csv(job: &SummaryJob, opts: &ExportOptions) -> String {
    let mut header = String::from("key,field_type,raw,value");
    if opts.include_confidence {
        header.push_str(",confidence");
    }
    header.push_str(",source_page");
    if opts.include_evidence {
        header.push_str(",evidence");
    }
    header.push('\n');

    let mut out = header;
    for f in &job.fields {
        let field_type = serde_json::to_value(f.field_type)
            .ok()
            .and_then(|v| v.as_str().map(String::from))
            .unwrap_or_default();

        out.push_str(&format!(
            "{},{},{},{}",
            csv_escape(&f.key),
            field_type,
            csv_escape(f.raw.as_deref().unwrap_or("")),
            csv_escape(&typed_value_display(&f.value)),
        ));
        if opts.include_confidence {
            out.push_str(&format!(",{}", f.confidence));
        }
        out.push_str(&format!(
            ",{}",
            f.source_page.map(|p| p.to_string()).unwrap_or_default()
        ));
        if opts.include_evidence {
            out.push_str(&format!(
                ",{}",
                csv_escape(f.evidence.as_deref().unwrap_or(""))
            ));
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use dealroom_core::{
        AnswerType, FieldType, FieldValue, IssueSeverity, JobStatus, QualityIssue, QueryMetrics,
    };
    use uuid::Uuid;

    fn sample_query() -> Query {
        Query {
            id: Uuid::new_v4(),
            room_id: Uuid::new_v4(),
            question: "What is the ARR, exactly?".to_string(),
            answer: Some("ARR grew 45% YoY".to_string()),
            answer_type: Some(AnswerType::Grounded),
            citations: Vec::new(),
            metrics: Some(QueryMetrics::default()),
            feedback: None,
            created_at: Utc::now(),
        }
    }

    fn sample_job() -> SummaryJob {
        SummaryJob {
            id: Uuid::new_v4(),
            document_id: Uuid::new_v4(),
            template_key: "financial_v1".to_string(),
            status: JobStatus::Partial,
            coverage: 0.75,
            avg_confidence: 0.88,
            quality_pass: false,
            fields: vec![
                FieldValue::extracted(
                    "arr",
                    FieldType::Currency,
                    "$4.2M",
                    0.92,
                    Some(12),
                    Some("ARR of $4.2M".to_string()),
                ),
                FieldValue::missing("ebitda_margin", FieldType::Number),
            ],
            issues: vec![QualityIssue {
                severity: IssueSeverity::High,
                field_key: Some("ebitda_margin".to_string()),
                message: "required field missing".to_string(),
                remediation: None,
            }],
            error_message: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_history_json_includes_answer() {
        let queries = vec![sample_query()];
        let json = export_history_json(&queries, &ExportOptions::default()).unwrap();
        assert!(json.contains("ARR grew 45% YoY"));
        assert!(json.contains(r#""answer_type": "grounded""#));
    }

    #[test]
    fn test_history_csv_escapes_commas() {
        let csv = export_history_csv(&[sample_query()]);
        assert!(csv.starts_with("id,created_at,question"));
        assert!(csv.contains("\"What is the ARR, exactly?\""));
    }

    #[test]
    fn test_summary_json_honors_options() {
        let job = sample_job();

        let full = export_summary_json(&job, &ExportOptions::default()).unwrap();
        assert!(full.contains("avg_confidence"));
        assert!(full.contains("required field missing"));
        assert!(full.contains("ARR of $4.2M"));

        let bare = export_summary_json(
            &job,
            &ExportOptions {
                include_confidence: false,
                include_evidence: false,
                include_issues: false,
            },
        )
        .unwrap();
        assert!(!bare.contains("avg_confidence"));
        assert!(!bare.contains("required field missing"));
        assert!(!bare.contains("ARR of $4.2M"));
    }

    #[test]
    fn test_summary_csv_row_per_field() {
        let job = sample_job();
        let csv = export_summary_csv(&job, &ExportOptions::default());
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3); // header + 2 fields
        assert!(lines[1].starts_with("arr,currency,"));
        assert!(lines[2].starts_with("ebitda_margin,number,"));
    }

    #[test]
    fn test_summary_csv_without_confidence_column() {
        let job = sample_job();
        let csv = export_summary_csv(
            &job,
            &ExportOptions {
                include_confidence: false,
                include_evidence: true,
                include_issues: true,
            },
        );
        assert!(!csv.lines().next().unwrap().contains("confidence"));
    }

    #[test]
    fn test_csv_escape() {
        assert_eq!(csv_escape("plain"), "plain");
        assert_eq!(csv_escape("a,b"), "\"a,b\"");
        assert_eq!(csv_escape("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_typed_value_display() {
        assert_eq!(
            typed_value_display(&TypedValue::Currency {
                amount: 4200000.0,
                currency: "USD".to_string()
            }),
            "4200000 USD"
        );
        assert_eq!(typed_value_display(&TypedValue::Null), "");
        assert_eq!(typed_value_display(&TypedValue::DurationDays(30)), "30 days");
    }
}
