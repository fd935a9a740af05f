//! Summary template registry.
//!
//! Templates define which fields an extraction job looks for and the
//! quality thresholds a run must clear. The registry ships the built-in
//! templates and accepts custom registrations; there is no hardcoded
//! global threshold.

use std::collections::HashMap;

use dealroom_core::{FieldSpec, FieldType, SummaryTemplate};

/// Registry mapping template keys to their definitions.
pub struct TemplateRegistry {
    templates: HashMap<String, SummaryTemplate>,
}

impl TemplateRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            templates: HashMap::new(),
        }
    }

    /// Create a registry with the built-in templates registered.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(financial_v1());
        registry.register(legal_v1());
        registry
    }

    /// Register a template. Replaces any existing template with the same key.
    pub fn register(&mut self, template: SummaryTemplate) {
        self.templates.insert(template.key.clone(), template);
    }

    pub fn get(&self, key: &str) -> Option<&SummaryTemplate> {
        self.templates.get(key)
    }

    pub fn has_template(&self, key: &str) -> bool {
        self.templates.contains_key(key)
    }

    /// List all registered template keys.
    pub fn available_keys(&self) -> Vec<String> {
        self.templates.keys().cloned().collect()
    }
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

fn field(key: &str, label: &str, field_type: FieldType, required: bool) -> FieldSpec {
    FieldSpec {
        key: key.to_string(),
        label: label.to_string(),
        field_type,
        required,
        hint: None,
    }
}

/// Financial summary template for diligence documents.
pub fn financial_v1() -> SummaryTemplate {
    SummaryTemplate {
        key: "financial_v1".to_string(),
        name: "Financial Summary".to_string(),
        fields: vec![
            field(
                "annual_recurring_revenue",
                "Annual Recurring Revenue",
                FieldType::Currency,
                true,
            ),
            field(
                "yoy_growth_rate",
                "Year-over-Year Growth Rate",
                FieldType::Number,
                true,
            ),
            field("gross_margin", "Gross Margin", FieldType::Number, true),
            field("customer_count", "Customer Count", FieldType::Number, true),
            field(
                "fiscal_year_end",
                "Fiscal Year End",
                FieldType::Date,
                true,
            ),
            field("burn_rate", "Monthly Burn Rate", FieldType::Currency, false),
            field("audited", "Financials Audited", FieldType::Boolean, false),
        ],
        required_coverage: 0.8,
        min_confidence: 0.6,
    }
}

/// Legal summary template for contract documents.
pub fn legal_v1() -> SummaryTemplate {
    SummaryTemplate {
        key: "legal_v1".to_string(),
        name: "Legal Summary".to_string(),
        fields: vec![
            field("governing_law", "Governing Law", FieldType::Text, true),
            field("effective_date", "Effective Date", FieldType::Date, true),
            field(
                "termination_notice",
                "Termination Notice Period",
                FieldType::Duration,
                true,
            ),
            field("auto_renewal", "Auto-Renewal", FieldType::Boolean, false),
            field("liability_cap", "Liability Cap", FieldType::Currency, false),
        ],
        required_coverage: 0.75,
        min_confidence: 0.5,
    }
}
