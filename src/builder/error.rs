//! Build errors for state tree and transition builders.

use thiserror::Error;

/// Errors that can occur when building transitions and state trees.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BuildError {
    #[error("Transition source state not specified. Call .source(state)")]
    MissingSource,

    #[error("Transition target state not specified. Call .target(state)")]
    MissingTarget,

    #[error("Transition trigger not specified. Call .event(event)")]
    MissingEvent,

    #[error("Internal transitions cannot have a target state")]
    UnexpectedTarget,

    #[error("State tree is invalid ({} violation(s))", .0.len())]
    Invalid(Vec<TreeViolation>),
}

/// A single structural problem found while validating a state tree.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TreeViolation {
    #[error("No states declared")]
    EmptyTree,

    #[error("State '{state}' declared in more than one place")]
    DuplicateState { state: String },

    #[error("State '{state}' has unknown parent '{parent}'")]
    UnknownParent { state: String, parent: String },

    #[error("Region {region} of {} is declared but region {missing} is not", display_parent(.parent))]
    RegionGap {
        parent: Option<String>,
        region: usize,
        missing: usize,
    },

    #[error("Region {region} of {} has no initial state", display_parent(.parent))]
    MissingInitial { parent: Option<String>, region: usize },

    #[error("Region {region} of {} has several initial states: {states:?}", display_parent(.parent))]
    MultipleInitial {
        parent: Option<String>,
        region: usize,
        states: Vec<String>,
    },

    #[error("State '{state}' is its own ancestor")]
    Cycle { state: String },

    #[error("Unknown state '{state}' referenced by {referenced_by}")]
    UnknownState { state: String, referenced_by: String },

    #[error("Transition #{transition} is malformed: {reason}")]
    MalformedTransition { transition: usize, reason: String },

    #[error("Transition #{transition} crosses top-level regions ('{from}' -> '{to}')")]
    CrossRegionTransition {
        transition: usize,
        from: String,
        to: String,
    },
}

fn display_parent(parent: &Option<String>) -> String {
    match parent {
        Some(p) => format!("'{p}'"),
        None => "the top level".to_string(),
    }
}
