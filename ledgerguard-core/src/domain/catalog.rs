//! Field and operator catalogs
//!
//! Catalogs describe which fields a condition may target and which
//! comparison operators are legal for each value type. They are plain data
//! passed explicitly to the builder, formatter and validator so callers can
//! swap in their own (tests use small synthetic catalogs).

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::result::{Error, Result};

/// Value type of a catalog field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Number,
    Text,
    Date,
    Enum,
}

impl ValueType {
    pub const ALL: [ValueType; 4] = [
        ValueType::Number,
        ValueType::Text,
        ValueType::Date,
        ValueType::Enum,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::Number => "number",
            ValueType::Text => "text",
            ValueType::Date => "date",
            ValueType::Enum => "enum",
        }
    }
}

/// A field a condition can compare against
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDescriptor {
    pub id: String,
    pub label: String,
    pub value_type: ValueType,
    /// Allowed values, only for `ValueType::Enum`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
}

impl FieldDescriptor {
    pub fn new(id: impl Into<String>, label: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            value_type,
            enum_values: None,
        }
    }

    pub fn enumeration(
        id: impl Into<String>,
        label: impl Into<String>,
        values: &[&str],
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            value_type: ValueType::Enum,
            enum_values: Some(values.iter().map(|v| v.to_string()).collect()),
        }
    }

    /// Check the enum-values invariant for this descriptor
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("field id cannot be empty".to_string());
        }
        match (self.value_type, &self.enum_values) {
            (ValueType::Enum, Some(values)) if !values.is_empty() => Ok(()),
            (ValueType::Enum, _) => Err(format!(
                "field '{}' is an enum but has no enumValues",
                self.id
            )),
            (_, Some(_)) => Err(format!(
                "field '{}' is not an enum but declares enumValues",
                self.id
            )),
            (_, None) => Ok(()),
        }
    }
}

/// A comparison operator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorDescriptor {
    pub id: String,
    pub label: String,
}

impl OperatorDescriptor {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

/// Field catalog plus operator catalog
#[derive(Debug, Clone)]
pub struct Catalogs {
    fields: Vec<FieldDescriptor>,
    operators: HashMap<ValueType, Vec<OperatorDescriptor>>,
}

/// On-disk catalog format
#[derive(Debug, Deserialize)]
struct CatalogFile {
    fields: Vec<FieldDescriptor>,
    #[serde(default)]
    operators: Option<HashMap<ValueType, Vec<OperatorDescriptor>>>,
}

impl Catalogs {
    /// Build catalogs, enforcing unique field ids and the enum-values rule
    pub fn new(
        fields: Vec<FieldDescriptor>,
        operators: HashMap<ValueType, Vec<OperatorDescriptor>>,
    ) -> Result<Self> {
        let mut seen = HashSet::new();
        for field in &fields {
            field.validate().map_err(Error::validation)?;
            if !seen.insert(field.id.as_str()) {
                return Err(Error::validation(format!(
                    "duplicate field id '{}' in catalog",
                    field.id
                )));
            }
        }
        for (value_type, ops) in &operators {
            let mut seen_ops = HashSet::new();
            for op in ops {
                if !seen_ops.insert(op.id.as_str()) {
                    return Err(Error::validation(format!(
                        "duplicate operator '{}' for {} fields",
                        op.id,
                        value_type.as_str()
                    )));
                }
            }
        }
        Ok(Self { fields, operators })
    }

    /// Parse a catalog document
    ///
    /// `operators` may be omitted, in which case the built-in operator
    /// catalog is used.
    pub fn from_json(content: &str) -> Result<Self> {
        let file: CatalogFile = serde_json::from_str(content)?;
        let operators = file.operators.unwrap_or_else(default_operators);
        Self::new(file.fields, operators)
    }

    /// Load a catalog document from disk
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field(&self, id: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.id == id)
    }

    /// Legal operators for a value type, in display order
    pub fn operators_for(&self, value_type: ValueType) -> &[OperatorDescriptor] {
        self.operators
            .get(&value_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Legal operators for a field id; empty when the field is unknown
    pub fn operators_for_field(&self, field_id: &str) -> &[OperatorDescriptor] {
        match self.field(field_id) {
            Some(field) => self.operators_for(field.value_type),
            None => &[],
        }
    }

    /// Resolve an operator label in the context of a field
    ///
    /// Falls back to any value type that knows the operator when the field
    /// is unknown, so labels survive catalog changes.
    pub fn operator_label(&self, field_id: &str, operator_id: &str) -> Option<&str> {
        if let Some(field) = self.field(field_id) {
            if let Some(op) = self
                .operators_for(field.value_type)
                .iter()
                .find(|op| op.id == operator_id)
            {
                return Some(op.label.as_str());
            }
        }
        ValueType::ALL
            .iter()
            .flat_map(|vt| self.operators_for(*vt))
            .find(|op| op.id == operator_id)
            .map(|op| op.label.as_str())
    }
}

impl Default for Catalogs {
    fn default() -> Self {
        Self {
            fields: default_fields(),
            operators: default_operators(),
        }
    }
}

fn default_fields() -> Vec<FieldDescriptor> {
    vec![
        FieldDescriptor::new("grand_total", "Grand Total", ValueType::Number),
        FieldDescriptor::new("vendor_name", "Vendor Name", ValueType::Text),
        FieldDescriptor::new("invoice_date", "Invoice Date", ValueType::Date),
        FieldDescriptor::new("due_date", "Due Date", ValueType::Date),
        FieldDescriptor::enumeration(
            "match_status",
            "Match Status",
            &["matched", "partially_matched", "unmatched"],
        ),
        FieldDescriptor::new("missed_emis", "Missed EMIs", ValueType::Number),
        FieldDescriptor::new("credit_score_drop", "Credit Score Drop", ValueType::Number),
        FieldDescriptor::new("days_past_due", "Days Past Due", ValueType::Number),
        FieldDescriptor::enumeration(
            "risk_level",
            "Risk Level",
            &["low", "medium", "high", "critical"],
        ),
        FieldDescriptor::enumeration(
            "customer_segment",
            "Customer Segment",
            &["retail", "sme", "corporate"],
        ),
    ]
}

fn default_operators() -> HashMap<ValueType, Vec<OperatorDescriptor>> {
    let mut operators = HashMap::new();
    operators.insert(
        ValueType::Number,
        vec![
            OperatorDescriptor::new(">", ">"),
            OperatorDescriptor::new("<", "<"),
            OperatorDescriptor::new(">=", ">="),
            OperatorDescriptor::new("<=", "<="),
            OperatorDescriptor::new("equals", "equals"),
            OperatorDescriptor::new("not_equals", "not equals"),
        ],
    );
    operators.insert(
        ValueType::Text,
        vec![
            OperatorDescriptor::new("equals", "equals"),
            OperatorDescriptor::new("contains", "contains"),
            OperatorDescriptor::new("not_equals", "not equals"),
        ],
    );
    operators.insert(
        ValueType::Date,
        vec![
            OperatorDescriptor::new("is_before", "is before"),
            OperatorDescriptor::new("is_after", "is after"),
            OperatorDescriptor::new("is_within_next_days", "is within next (days)"),
        ],
    );
    operators.insert(
        ValueType::Enum,
        vec![
            OperatorDescriptor::new("equals", "is"),
            OperatorDescriptor::new("not_equals", "is not"),
        ],
    );
    operators
}
