// src/domain.rs
//
// Search predicates ("domains") sent to the record store. A domain is a flat list of
// terms in prefix notation: `&` and `|` each combine the next two sub-expressions, and
// consecutive top-level conditions are implicitly AND-ed by the backend.

use serde::ser::{Serialize, SerializeSeq, Serializer};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ge,
    Lt,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ge => ">=",
            Operator::Lt => "<",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: String,
    pub op: Operator,
    pub value: Value,
}

impl Condition {
    pub fn new(field: &str, op: Operator, value: impl Into<Value>) -> Self {
        Self {
            field: field.to_string(),
            op,
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DomainTerm {
    And,
    Or,
    Leaf(Condition),
}

impl Serialize for DomainTerm {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            DomainTerm::And => serializer.serialize_str("&"),
            DomainTerm::Or => serializer.serialize_str("|"),
            DomainTerm::Leaf(cond) => {
                let mut seq = serializer.serialize_seq(Some(3))?;
                seq.serialize_element(&cond.field)?;
                seq.serialize_element(cond.op.as_str())?;
                seq.serialize_element(&cond.value)?;
                seq.end()
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Domain {
    terms: Vec<DomainTerm>,
}

impl Domain {
    /// The empty domain. Sent as-is it matches every record, so callers that treat it
    /// as "no strategy" must skip it explicitly.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_terms(terms: Vec<DomainTerm>) -> Self {
        Self { terms }
    }

    /// Conjunction of plain conditions, relying on the implicit top-level AND.
    pub fn all_of(conditions: impl IntoIterator<Item = Condition>) -> Self {
        Self {
            terms: conditions.into_iter().map(DomainTerm::Leaf).collect(),
        }
    }

    pub fn cond(field: &str, op: Operator, value: impl Into<Value>) -> DomainTerm {
        DomainTerm::Leaf(Condition::new(field, op, value))
    }

    /// Appends a condition that is AND-ed with the whole existing expression.
    pub fn and_also(mut self, condition: Condition) -> Self {
        self.terms.push(DomainTerm::Leaf(condition));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn terms(&self) -> &[DomainTerm] {
        &self.terms
    }

    pub fn to_json(&self) -> Value {
        // Serializing plain strings and JSON values cannot fail.
        serde_json::to_value(&self.terms).unwrap_or(Value::Array(Vec::new()))
    }

    /// Every leaf condition, in order. Used by tests and diagnostics.
    pub fn conditions(&self) -> impl Iterator<Item = &Condition> {
        self.terms.iter().filter_map(|t| match t {
            DomainTerm::Leaf(c) => Some(c),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_serializes_prefix_operators_and_triples() {
        let domain = Domain::from_terms(vec![
            DomainTerm::Or,
            Domain::cond("state", Operator::Eq, "draft"),
            Domain::cond("date", Operator::Ge, "2024-05-01"),
        ])
        .and_also(Condition::new("x_studio_shift_status", Operator::Eq, "Planned"));

        assert_eq!(
            domain.to_json(),
            json!([
                "|",
                ["state", "=", "draft"],
                ["date", ">=", "2024-05-01"],
                ["x_studio_shift_status", "=", "Planned"]
            ])
        );
    }

    #[test]
    fn test_empty_domain_serializes_to_empty_list() {
        assert!(Domain::empty().is_empty());
        assert_eq!(Domain::empty().to_json(), json!([]));
    }
}
