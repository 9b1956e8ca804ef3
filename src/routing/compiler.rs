//! Compiles predicate trees into evaluable matchers.

use crate::routing::predicate::{Condition, Predicate, Subject};
use regex::Regex;
use std::borrow::Cow;
use std::fmt;
use thiserror::Error;
use tracing::warn;

/// A malformed predicate tree. Raised at compile time only.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PredicateError {
    #[error("node declares both all_match and any_match")]
    BothCombinators,

    #[error("logical node also declares subject or value constraints")]
    MixedNode,

    #[error("leaf has no subject")]
    MissingSubject,

    #[error("min_length {min} exceeds max_length {max}")]
    InvalidLengthRange { min: usize, max: usize },
}

/// The fields of an outbound message a predicate can look at
#[derive(Debug, Clone, Default)]
pub struct MatchContext<'a> {
    pub destination: &'a str,
    pub source: &'a str,
    pub content: Cow<'a, str>,
    /// `None` and an empty slice both never match a tag leaf
    pub tags: Option<&'a [String]>,
}

impl<'a> MatchContext<'a> {
    pub fn new(destination: &'a str) -> Self {
        Self {
            destination,
            ..Default::default()
        }
    }

    pub fn with_source(mut self, source: &'a str) -> Self {
        self.source = source;
        self
    }

    pub fn with_content(mut self, content: impl Into<Cow<'a, str>>) -> Self {
        self.content = content.into();
        self
    }

    pub fn with_tags(mut self, tags: &'a [String]) -> Self {
        self.tags = Some(tags);
        self
    }
}

#[derive(Clone)]
enum Pattern {
    Valid(Regex),
    /// The expression did not compile; the leaf never matches
    Invalid,
}

/// A compiled leaf. All declared constraints must hold.
#[derive(Clone)]
pub struct LeafMatcher {
    subject: Subject,
    equal_to: Option<String>,
    pattern: Option<Pattern>,
    min_length: Option<usize>,
    max_length: Option<usize>,
}

impl LeafMatcher {
    fn matches_value(&self, value: &str) -> bool {
        if let Some(expected) = &self.equal_to {
            if value != expected {
                return false;
            }
        }

        match &self.pattern {
            Some(Pattern::Valid(regex)) if !regex.is_match(value) => return false,
            Some(Pattern::Invalid) => return false,
            _ => {}
        }

        if self.min_length.is_some() || self.max_length.is_some() {
            let length = value.chars().count();
            if self.min_length.is_some_and(|min| length < min) {
                return false;
            }
            if self.max_length.is_some_and(|max| length > max) {
                return false;
            }
        }
        true
    }

    fn matches(&self, context: &MatchContext<'_>) -> bool {
        match self.subject {
            Subject::Destination => self.matches_value(context.destination),
            Subject::Source => self.matches_value(context.source),
            Subject::Content => self.matches_value(&context.content),
            Subject::Tag => context
                .tags
                .is_some_and(|tags| tags.iter().any(|tag| self.matches_value(tag))),
        }
    }
}

impl fmt::Debug for LeafMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeafMatcher")
            .field("subject", &self.subject)
            .field("equal_to", &self.equal_to)
            .field(
                "pattern",
                &self.pattern.as_ref().map(|p| match p {
                    Pattern::Valid(regex) => regex.as_str(),
                    Pattern::Invalid => "<invalid>",
                }),
            )
            .field("min_length", &self.min_length)
            .field("max_length", &self.max_length)
            .finish()
    }
}

/// An evaluable predicate. Deterministic and free of side effects.
#[derive(Debug, Clone)]
pub enum CompiledPredicate {
    /// Connector without conditions
    Always,
    /// Connector whose conditions all failed to compile
    Never,
    Leaf(LeafMatcher),
    All(Vec<CompiledPredicate>),
    Any(Vec<CompiledPredicate>),
}

impl CompiledPredicate {
    pub fn matches(&self, context: &MatchContext<'_>) -> bool {
        match self {
            CompiledPredicate::Always => true,
            CompiledPredicate::Never => false,
            CompiledPredicate::Leaf(leaf) => leaf.matches(context),
            CompiledPredicate::All(children) => children.iter().all(|c| c.matches(context)),
            CompiledPredicate::Any(children) => children.iter().any(|c| c.matches(context)),
        }
    }
}

/// Compile one predicate tree
pub fn compile(predicate: &Predicate) -> Result<CompiledPredicate, PredicateError> {
    match (&predicate.all_match, &predicate.any_match) {
        (Some(_), Some(_)) => Err(PredicateError::BothCombinators),
        (Some(children), None) | (None, Some(children)) => {
            if predicate.has_value_constraints() {
                return Err(PredicateError::MixedNode);
            }
            let compiled = children
                .iter()
                .map(compile)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(if predicate.all_match.is_some() {
                CompiledPredicate::All(compiled)
            } else {
                CompiledPredicate::Any(compiled)
            })
        }
        (None, None) => compile_leaf(predicate).map(CompiledPredicate::Leaf),
    }
}

fn compile_leaf(predicate: &Predicate) -> Result<LeafMatcher, PredicateError> {
    let subject = predicate.subject.ok_or(PredicateError::MissingSubject)?;
    if let (Some(min), Some(max)) = (predicate.min_length, predicate.max_length) {
        if min > max {
            return Err(PredicateError::InvalidLengthRange { min, max });
        }
    }

    let pattern = predicate.pattern.as_deref().map(|source| match Regex::new(source) {
        Ok(regex) => Pattern::Valid(regex),
        Err(e) => {
            warn!("Pattern {:?} does not compile and will never match: {}", source, e);
            Pattern::Invalid
        }
    });

    Ok(LeafMatcher {
        subject,
        equal_to: predicate.equal_to.clone(),
        pattern,
        min_length: predicate.min_length,
        max_length: predicate.max_length,
    })
}

/// Combine a connector's conditions: no conditions means always eligible,
/// otherwise any condition that matches grants eligibility. Conditions that
/// fail to compile are logged and left out.
pub fn compile_conditions(connector_id: &str, conditions: &[Condition]) -> CompiledPredicate {
    if conditions.is_empty() {
        return CompiledPredicate::Always;
    }

    let mut compiled: Vec<CompiledPredicate> = conditions
        .iter()
        .filter_map(|condition| match compile(&condition.predicate) {
            Ok(predicate) => Some(predicate),
            Err(e) => {
                warn!(
                    connector = %connector_id,
                    condition = %condition.name,
                    "Skipping malformed condition: {}", e
                );
                None
            }
        })
        .collect();

    match compiled.len() {
        0 => CompiledPredicate::Never,
        1 => compiled.remove(0),
        _ => CompiledPredicate::Any(compiled),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(predicate: Predicate) -> CompiledPredicate {
        compile(&predicate).unwrap()
    }

    #[test]
    fn equality_and_pattern_are_conjunctive() {
        let predicate = leaf(Predicate::leaf(Subject::Destination).equal_to("X").pattern("^X"));
        assert!(predicate.matches(&MatchContext::new("X")));
        assert!(!predicate.matches(&MatchContext::new("Y")));
        // Matches the pattern alone
        assert!(!predicate.matches(&MatchContext::new("XY")));
    }

    #[test]
    fn pattern_matches_anywhere() {
        let predicate = leaf(Predicate::leaf(Subject::Destination).pattern("8499"));
        assert!(predicate.matches(&MatchContext::new("+25884990000")));
        assert!(!predicate.matches(&MatchContext::new("+25882000000")));
    }

    #[test]
    fn length_bounds_are_inclusive_and_count_chars() {
        let predicate = leaf(Predicate::leaf(Subject::Content).min_length(2).max_length(3));
        let check = |content: &str| predicate.matches(&MatchContext::new("").with_content(content));

        assert!(!check("a"));
        assert!(check("ab"));
        assert!(check("abc"));
        assert!(!check("abcd"));
        assert!(check("ção"));

        let unbounded_max = leaf(Predicate::leaf(Subject::Content).min_length(1));
        assert!(unbounded_max.matches(&MatchContext::new("").with_content("x".repeat(1000))));
    }

    #[test]
    fn invalid_pattern_never_matches() {
        let predicate = leaf(Predicate::leaf(Subject::Destination).pattern("(unclosed"));
        assert!(!predicate.matches(&MatchContext::new("(unclosed")));
    }

    #[test]
    fn tag_leaf_is_existential() {
        let predicate = leaf(Predicate::leaf(Subject::Tag).equal_to("transaction"));
        let both = vec!["banking".to_string(), "transaction".to_string()];
        let banking = vec!["banking".to_string()];
        let empty: Vec<String> = Vec::new();

        assert!(predicate.matches(&MatchContext::new("").with_tags(&both)));
        assert!(!predicate.matches(&MatchContext::new("").with_tags(&banking)));
        assert!(!predicate.matches(&MatchContext::new("").with_tags(&empty)));
        assert!(!predicate.matches(&MatchContext::new("")));

        // Even a constraint-free tag leaf needs at least one tag
        let any_tag = leaf(Predicate::leaf(Subject::Tag));
        assert!(!any_tag.matches(&MatchContext::new("").with_tags(&empty)));
        assert!(any_tag.matches(&MatchContext::new("").with_tags(&banking)));
    }

    #[test]
    fn logical_nodes_recurse() {
        let predicate = leaf(Predicate::any(vec![
            Predicate::leaf(Subject::Destination).pattern("^\\+258"),
            Predicate::all(vec![
                Predicate::leaf(Subject::Source).equal_to("BANK"),
                Predicate::leaf(Subject::Content).max_length(5),
            ]),
        ]));

        assert!(predicate.matches(&MatchContext::new("+258841")));
        assert!(predicate.matches(&MatchContext::new("+1").with_source("BANK").with_content("hi")));
        assert!(!predicate.matches(
            &MatchContext::new("+1").with_source("BANK").with_content("too long")
        ));

        assert!(leaf(Predicate::all(vec![])).matches(&MatchContext::new("")));
        assert!(!leaf(Predicate::any(vec![])).matches(&MatchContext::new("")));
    }

    #[test]
    fn definition_errors() {
        let both = Predicate {
            all_match: Some(vec![]),
            any_match: Some(vec![]),
            ..Default::default()
        };
        assert_eq!(compile(&both).unwrap_err(), PredicateError::BothCombinators);

        let mixed = Predicate::any(vec![]).pattern("x");
        assert_eq!(compile(&mixed).unwrap_err(), PredicateError::MixedNode);

        let mixed_subject = Predicate {
            subject: Some(Subject::Tag),
            all_match: Some(vec![]),
            ..Default::default()
        };
        assert_eq!(compile(&mixed_subject).unwrap_err(), PredicateError::MixedNode);

        assert_eq!(
            compile(&Predicate::default().equal_to("x")).unwrap_err(),
            PredicateError::MissingSubject
        );
        assert_eq!(
            compile(&Predicate::leaf(Subject::Content).min_length(5).max_length(1)).unwrap_err(),
            PredicateError::InvalidLengthRange { min: 5, max: 1 }
        );

        // A bad child poisons the whole tree
        let nested = Predicate::all(vec![Predicate::leaf(Subject::Source), mixed]);
        assert!(compile(&nested).is_err());
    }

    #[test]
    fn conditions_combine_with_or() {
        let conditions = vec![
            Condition::new("a", "c1", Predicate::leaf(Subject::Destination).equal_to("1")),
            Condition::new("b", "c1", Predicate::leaf(Subject::Destination).equal_to("2")),
        ];
        let predicate = compile_conditions("c1", &conditions);
        assert!(predicate.matches(&MatchContext::new("1")));
        assert!(predicate.matches(&MatchContext::new("2")));
        assert!(!predicate.matches(&MatchContext::new("3")));

        assert!(compile_conditions("c1", &[]).matches(&MatchContext::new("anything")));
    }

    #[test]
    fn malformed_condition_is_skipped() {
        let bad = Predicate::any(vec![]).equal_to("x");
        let conditions = vec![
            Condition::new("bad", "c1", bad.clone()),
            Condition::new("good", "c1", Predicate::leaf(Subject::Destination).equal_to("1")),
        ];
        let predicate = compile_conditions("c1", &conditions);
        assert!(predicate.matches(&MatchContext::new("1")));

        let only_bad = compile_conditions("c1", &[Condition::new("bad", "c1", bad)]);
        assert!(matches!(only_bad, CompiledPredicate::Never));
        assert!(!only_bad.matches(&MatchContext::new("1")));
    }
}
