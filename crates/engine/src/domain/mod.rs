//! Command and query boundary over the workflow manager.

pub mod command;
pub mod datadef;
pub mod query;

pub use command::{command_meta, CommandMeta, WorkflowCommand, WorkflowCommandHandler, COMMANDS};
pub use datadef::*;
pub use query::{StageView, WorkflowQueryManager, WorkflowScope, WorkflowView};

use serde::Serialize;

use crate::config::EngineConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DomainMeta {
    pub name: String,
    pub tags: Vec<String>,
    pub description: String,
}

/// Published identity of the workflow domain.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowDomain {
    namespace: String,
    meta: DomainMeta,
}

impl WorkflowDomain {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            namespace: config.domain_namespace.clone(),
            meta: DomainMeta {
                name: "Workflow Management".to_string(),
                tags: vec!["workflow".to_string()],
                description: "Declarative workflows with staged steps, roles and event-driven transitions"
                    .to_string(),
            },
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn meta(&self) -> &DomainMeta {
        &self.meta
    }

    pub fn commands(&self) -> &'static [CommandMeta] {
        &COMMANDS
    }
}

impl Default for WorkflowDomain {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_metadata() {
        let domain = WorkflowDomain::default();
        assert_eq!(domain.namespace(), "riparius-workflow");
        assert_eq!(domain.meta().name, "Workflow Management");
        assert!(domain.meta().tags.iter().any(|t| t == "workflow"));
        assert!(!domain.meta().description.is_empty());
        assert_eq!(domain.commands().len(), 14);
    }

    #[test]
    fn namespace_follows_config() {
        let config = EngineConfig {
            domain_namespace: "acme-workflow".into(),
            ..EngineConfig::default()
        };
        assert_eq!(WorkflowDomain::new(&config).namespace(), "acme-workflow");
    }
}
