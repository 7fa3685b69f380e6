use indexmap::IndexMap;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::{Error, Result};

/// Sentinel for "any state declared on the machine" in an allowed-source set.
pub const ALL_STATES: &str = "*";

lazy_static! {
    static ref LABEL_RE: Regex = Regex::new(r"^[A-Z][A-Z0-9_]*$").expect("valid label regex");
}

/// Body executed when a transition fires. Its return value is reported in the [`StateChange`].
pub type TransitionFn<S> = Arc<dyn Fn(&S) -> Value + Send + Sync>;

/// Check a list of state labels: unique ignoring case, upper-case identifiers.
pub fn validate_labels<I, L>(labels: I) -> Result<Vec<String>>
where
    I: IntoIterator<Item = L>,
    L: Into<String>,
{
    let labels: Vec<String> = labels.into_iter().map(Into::into).collect();

    let mut seen: BTreeMap<String, Vec<&str>> = BTreeMap::new();
    for label in &labels {
        seen.entry(label.to_ascii_uppercase()).or_default().push(label.as_str());
    }
    let collisions: Vec<String> = seen
        .values()
        .filter(|group| group.len() > 1)
        .map(|group| group.join("/"))
        .collect();
    if !collisions.is_empty() {
        return Err(Error::Configuration(format!(
            "Duplicate state labels (case-insensitive): {}",
            collisions.join(", ")
        )));
    }

    if let Some(bad) = labels.iter().find(|l| !LABEL_RE.is_match(l)) {
        return Err(Error::Configuration(format!(
            "Invalid state label '{}': labels must be upper-case identifiers",
            bad
        )));
    }

    Ok(labels)
}

pub struct Transition<S> {
    name: String,
    target: String,
    allowed: Vec<String>,
    handler: Option<TransitionFn<S>>,
}

impl<S> Transition<S> {
    /// A transition allowed from every declared state until narrowed with [`Transition::from_states`].
    pub fn new(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            allowed: vec![ALL_STATES.to_string()],
            handler: None,
        }
    }

    pub fn from_states<I, L>(mut self, states: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<String>,
    {
        self.allowed = states.into_iter().map(Into::into).collect();
        self
    }

    pub fn from_any_state(mut self) -> Self {
        self.allowed = vec![ALL_STATES.to_string()];
        self
    }

    pub fn with_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&S) -> Value + Send + Sync + 'static,
    {
        self.handler = Some(Arc::new(handler));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn allowed_states(&self) -> &[String] {
        &self.allowed
    }

    pub fn is_wildcard(&self) -> bool {
        self.allowed.iter().any(|s| s == ALL_STATES)
    }

    fn allows(&self, label: &str) -> bool {
        self.is_wildcard() || self.allowed.iter().any(|s| s == label)
    }
}

impl<S> Clone for Transition<S> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            target: self.target.clone(),
            allowed: self.allowed.clone(),
            handler: self.handler.clone(),
        }
    }
}

impl<S> fmt::Debug for Transition<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("name", &self.name)
            .field("target", &self.target)
            .field("allowed", &self.allowed)
            .field("has_handler", &self.handler.is_some())
            .finish()
    }
}

/// Record of one executed transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChange {
    pub transition: String,
    pub source: String,
    pub target: String,
    pub result: Value,
}

pub struct StateMachine<S> {
    states: Vec<String>,
    start: String,
    transitions: IndexMap<String, Transition<S>>,
}

impl<S> StateMachine<S> {
    pub fn new(
        states: Vec<String>,
        start: Option<String>,
        transitions: impl IntoIterator<Item = Transition<S>>,
    ) -> Result<Self> {
        let states = validate_labels(states)?;
        if states.is_empty() {
            return Err(Error::Configuration("State machine declares no states".into()));
        }

        let start = start.unwrap_or_else(|| states[0].clone());
        if !states.contains(&start) {
            return Err(Error::Configuration(format!(
                "Start state '{}' is not a declared state",
                start
            )));
        }

        let mut table = IndexMap::new();
        for transition in transitions {
            if transition.name.trim().is_empty() {
                return Err(Error::Configuration("Transition name must not be empty".into()));
            }
            if !states.contains(&transition.target) {
                return Err(Error::Configuration(format!(
                    "Transition '{}' targets unknown state '{}'",
                    transition.name, transition.target
                )));
            }
            if !transition.is_wildcard() {
                if let Some(unknown) = transition.allowed.iter().find(|s| !states.contains(s)) {
                    return Err(Error::Configuration(format!(
                        "Transition '{}' is allowed from unknown state '{}'",
                        transition.name, unknown
                    )));
                }
            }
            table.insert(transition.name.clone(), transition);
        }

        Ok(Self {
            states,
            start,
            transitions: table,
        })
    }

    pub fn states(&self) -> &[String] {
        &self.states
    }

    pub fn start(&self) -> &str {
        &self.start
    }

    pub fn has_state(&self, label: &str) -> bool {
        self.states.iter().any(|s| s == label)
    }

    pub fn transition(&self, name: &str) -> Option<&Transition<S>> {
        self.transitions.get(name)
    }

    pub fn transitions(&self) -> impl Iterator<Item = &Transition<S>> {
        self.transitions.values()
    }

    pub fn transition_count(&self) -> usize {
        self.transitions.len()
    }

    /// Run transition `name` from `current`. Pure with respect to the subject:
    /// callers apply the returned change to a new snapshot.
    pub fn execute(&self, current: &str, name: &str, subject: &S) -> Result<StateChange> {
        let transition = self
            .transitions
            .get(name)
            .ok_or_else(|| Error::Execution(format!("Unknown transition '{}'", name)))?;

        if !transition.allows(current) || !self.has_state(current) {
            return Err(Error::Execution(format!(
                "Transition '{}' is not allowed from state '{}' (allowed: {})",
                name,
                current,
                transition.allowed.join(", ")
            )));
        }

        let result = transition
            .handler
            .as_ref()
            .map(|handler| handler(subject))
            .unwrap_or(Value::Null);

        Ok(StateChange {
            transition: transition.name.clone(),
            source: current.to_string(),
            target: transition.target.clone(),
            result,
        })
    }
}

impl<S> Clone for StateMachine<S> {
    fn clone(&self) -> Self {
        Self {
            states: self.states.clone(),
            start: self.start.clone(),
            transitions: self.transitions.clone(),
        }
    }
}

impl<S> fmt::Debug for StateMachine<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateMachine")
            .field("states", &self.states)
            .field("start", &self.start)
            .field("transitions", &self.transitions.values().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn labels(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn review_machine() -> StateMachine<()> {
        StateMachine::new(
            labels(&["CREATED", "PROCESSING", "REVIEW", "APPROVED", "REJECTED", "EMERGENCY"]),
            None,
            vec![
                Transition::new("start_processing", "PROCESSING")
                    .from_states(["CREATED", "REVIEW"])
                    .with_handler(|_: &()| json!({"action": "processing_started"})),
                Transition::new("submit", "REVIEW").from_states(["PROCESSING"]),
                Transition::new("approve", "APPROVED").from_states(["REVIEW"]),
                Transition::new("emergency_stop", "EMERGENCY").from_any_state(),
            ],
        )
        .unwrap()
    }

    #[test]
    fn validate_labels_accepts_identifiers() {
        let result = validate_labels(["CREATED", "PROCESSING", "COMPLETED"]).unwrap();
        assert_eq!(result, labels(&["CREATED", "PROCESSING", "COMPLETED"]));
        assert!(validate_labels(["invalid_label"]).unwrap_err().is_configuration());
    }

    #[test]
    fn validate_labels_reports_case_collisions() {
        let err = validate_labels(["CREATED", "created", "DONE"]).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("CREATED/created"));
    }

    #[test]
    fn start_defaults_to_first_state() {
        let machine = review_machine();
        assert_eq!(machine.start(), "CREATED");
        assert_eq!(machine.transition_count(), 4);
    }

    #[test]
    fn unknown_target_is_rejected() {
        let err = StateMachine::<()>::new(
            labels(&["CREATED", "PROCESSING"]),
            None,
            vec![Transition::new("jump", "NONEXISTENT")],
        )
        .unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("NONEXISTENT"));
    }

    #[test]
    fn unknown_start_is_rejected() {
        let err = StateMachine::<()>::new(labels(&["A", "B"]), Some("C".into()), Vec::new()).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn guarded_transition_reports_allowed_set() {
        let machine = review_machine();
        let err = machine.execute("APPROVED", "submit", &()).unwrap_err();
        assert!(err.is_execution());
        let message = err.to_string();
        assert!(message.contains("submit"));
        assert!(message.contains("APPROVED"));
        assert!(message.contains("PROCESSING"));
    }

    #[test]
    fn handler_result_is_surfaced() {
        let machine = review_machine();
        let change = machine.execute("CREATED", "start_processing", &()).unwrap();
        assert_eq!(change.source, "CREATED");
        assert_eq!(change.target, "PROCESSING");
        assert_eq!(change.result, json!({"action": "processing_started"}));

        let change = machine.execute("PROCESSING", "submit", &()).unwrap();
        assert_eq!(change.result, Value::Null);
    }

    #[test]
    fn wildcard_transition_runs_from_every_state() {
        let machine = review_machine();
        let transition = machine.transition("emergency_stop").unwrap();
        assert_eq!(transition.allowed_states(), &[ALL_STATES.to_string()]);
        for state in machine.states() {
            let change = machine.execute(state, "emergency_stop", &()).unwrap();
            assert_eq!(change.target, "EMERGENCY");
        }
    }

    #[test]
    fn wildcard_does_not_accept_undeclared_state() {
        let machine = review_machine();
        assert!(machine.execute("BOGUS", "emergency_stop", &()).is_err());
    }

    #[test]
    fn unknown_transition_is_execution_error() {
        let machine = review_machine();
        assert!(machine.execute("CREATED", "teleport", &()).unwrap_err().is_execution());
    }
}
