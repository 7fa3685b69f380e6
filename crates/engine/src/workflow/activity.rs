use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// An effect yielded by an event handler (or a start hook) and applied to the
/// workflow instance by the manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Activity {
    /// Spawn a new instance of a step definition.
    AddStep {
        step_key: String,
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        selector: Option<Uuid>,
        #[serde(default)]
        params: Value,
    },
    /// Run a step transition. Without `step_id` the step the handler was bound to is used.
    TransitionStep {
        #[serde(default)]
        step_id: Option<Uuid>,
        transition: String,
    },
    TransitionWorkflow {
        transition: String,
    },
    Memorize {
        key: String,
        value: Value,
    },
    /// Informational output; does not change the instance.
    Message {
        text: String,
    },
}

impl Activity {
    pub fn add_step(step_key: impl Into<String>) -> Self {
        Activity::AddStep {
            step_key: step_key.into(),
            title: None,
            selector: None,
            params: Value::Null,
        }
    }

    pub fn add_selected_step(step_key: impl Into<String>, selector: Option<Uuid>, params: Value) -> Self {
        Activity::AddStep {
            step_key: step_key.into(),
            title: None,
            selector,
            params,
        }
    }

    pub fn transition_step(transition: impl Into<String>) -> Self {
        Activity::TransitionStep {
            step_id: None,
            transition: transition.into(),
        }
    }

    pub fn transition_step_id(step_id: Uuid, transition: impl Into<String>) -> Self {
        Activity::TransitionStep {
            step_id: Some(step_id),
            transition: transition.into(),
        }
    }

    pub fn transition_workflow(transition: impl Into<String>) -> Self {
        Activity::TransitionWorkflow {
            transition: transition.into(),
        }
    }

    pub fn memorize(key: impl Into<String>, value: Value) -> Self {
        Activity::Memorize {
            key: key.into(),
            value,
        }
    }

    pub fn message(text: impl Into<String>) -> Self {
        Activity::Message { text: text.into() }
    }

    pub fn is_mutation(&self) -> bool {
        !matches!(self, Activity::Message { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn activities_use_kind_tag() {
        let value = serde_json::to_value(Activity::transition_workflow("complete")).unwrap();
        assert_eq!(value, json!({"kind": "transition_workflow", "transition": "complete"}));

        let parsed: Activity = serde_json::from_value(json!({"kind": "add_step", "step_key": "task"})).unwrap();
        assert_eq!(parsed, Activity::add_step("task"));
    }

    #[test]
    fn messages_do_not_mutate() {
        assert!(!Activity::message("hello").is_mutation());
        assert!(Activity::memorize("k", json!(1)).is_mutation());
    }
}
