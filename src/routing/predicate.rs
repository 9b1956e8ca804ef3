//! Declarative routing rules as stored by the administrative surface.

use serde::{Deserialize, Serialize};

/// Which part of an outbound message a leaf predicate looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subject {
    Destination,
    Source,
    /// Matches if any of the request's tags satisfies the leaf
    Tag,
    Content,
}

/// A predicate tree node.
///
/// Leaves set `subject` plus any of the value constraints; logical nodes
/// set exactly one of `all_match` / `any_match` and nothing else. The
/// shape is checked when the predicate is compiled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Predicate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<Subject>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub equal_to: Option<String>,
    /// Regular expression, matched anywhere in the value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// Inclusive, in characters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    /// Inclusive, in characters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub all_match: Option<Vec<Predicate>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub any_match: Option<Vec<Predicate>>,
}

impl Predicate {
    /// Leaf over `subject` with no constraints yet
    pub fn leaf(subject: Subject) -> Self {
        Self {
            subject: Some(subject),
            ..Default::default()
        }
    }

    pub fn all(children: Vec<Predicate>) -> Self {
        Self {
            all_match: Some(children),
            ..Default::default()
        }
    }

    pub fn any(children: Vec<Predicate>) -> Self {
        Self {
            any_match: Some(children),
            ..Default::default()
        }
    }

    pub fn equal_to(mut self, value: impl Into<String>) -> Self {
        self.equal_to = Some(value.into());
        self
    }

    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn min_length(mut self, min: usize) -> Self {
        self.min_length = Some(min);
        self
    }

    pub fn max_length(mut self, max: usize) -> Self {
        self.max_length = Some(max);
        self
    }

    pub(crate) fn is_logical(&self) -> bool {
        self.all_match.is_some() || self.any_match.is_some()
    }

    pub(crate) fn has_value_constraints(&self) -> bool {
        self.subject.is_some()
            || self.equal_to.is_some()
            || self.pattern.is_some()
            || self.min_length.is_some()
            || self.max_length.is_some()
    }
}

/// A named routing rule granting one connector eligibility
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub name: String,
    pub connector_id: String,
    pub predicate: Predicate,
}

impl Condition {
    pub fn new(
        name: impl Into<String>,
        connector_id: impl Into<String>,
        predicate: Predicate,
    ) -> Self {
        Self {
            name: name.into(),
            connector_id: connector_id.into(),
            predicate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_condition() {
        let yaml = r#"
name: mozambique-mobile
connector_id: vodacom-1
predicate:
  any_match:
    - subject: destination
      pattern: "^\\+25884"
    - all_match:
        - subject: tag
          equal_to: transaction
        - subject: content
          max_length: 160
"#;
        let condition: Condition = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(condition.connector_id, "vodacom-1");

        let any = condition.predicate.any_match.as_ref().unwrap();
        assert_eq!(any.len(), 2);
        assert_eq!(any[0], Predicate::leaf(Subject::Destination).pattern("^\\+25884"));
        assert_eq!(
            any[1],
            Predicate::all(vec![
                Predicate::leaf(Subject::Tag).equal_to("transaction"),
                Predicate::leaf(Subject::Content).max_length(160),
            ])
        );
    }
}
