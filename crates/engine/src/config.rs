use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::store::{DatabaseConfig, DatabaseType};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound on mutations buffered in one manager transaction.
    pub max_mutations: usize,
    /// Namespace the command/query domain is published under.
    pub domain_namespace: String,
    /// Resource schema name the workflow tables belong to.
    pub resource_schema: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_mutations: 1000,
            domain_namespace: "riparius-workflow".to_string(),
            resource_schema: "workflow".to_string(),
        }
    }
}

impl Config {
    pub fn load() -> crate::Result<Self> {
        // Load environment variables from .env file if it exists
        let _ = dotenvy::dotenv();

        let defaults = EngineConfig::default();
        let config = Config {
            database: DatabaseConfig {
                db_type: std::env::var("DATABASE_TYPE")
                    .unwrap_or_else(|_| "sqlite".to_string())
                    .parse()?,
                sqlite_path: std::env::var("SQLITE_PATH")
                    .map(PathBuf::from)
                    .ok()
                    .or_else(|| Some(PathBuf::from("data/stagehand.db"))),
                max_connections: std::env::var("DATABASE_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            },
            engine: EngineConfig {
                max_mutations: std::env::var("WORKFLOW_MAX_MUTATIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.max_mutations),
                domain_namespace: std::env::var("WORKFLOW_DOMAIN_NAMESPACE")
                    .unwrap_or(defaults.domain_namespace),
                resource_schema: std::env::var("WORKFLOW_RESOURCE_SCHEMA")
                    .unwrap_or(defaults.resource_schema),
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.database.db_type == DatabaseType::Sqlite && self.database.sqlite_path.is_none() {
            return Err(crate::Error::Configuration(
                "SQLITE_PATH must be set when using SQLite".to_string(),
            ));
        }
        self.database
            .validate()
            .map_err(crate::Error::Configuration)?;
        if self.engine.max_mutations == 0 {
            return Err(crate::Error::Configuration(
                "WORKFLOW_MAX_MUTATIONS must be at least 1".to_string(),
            ));
        }
        if self.engine.domain_namespace.trim().is_empty() {
            tracing::warn!("WORKFLOW_DOMAIN_NAMESPACE is empty; commands will be published without a namespace");
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            engine: EngineConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.engine.domain_namespace, "riparius-workflow");
        assert_eq!(config.engine.max_mutations, 1000);
    }

    #[test]
    fn zero_mutation_budget_is_rejected() {
        let mut config = Config::default();
        config.engine.max_mutations = 0;
        assert!(config.validate().unwrap_err().is_configuration());
    }
}
