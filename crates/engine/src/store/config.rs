use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(rename = "type")]
    pub db_type: DatabaseType,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sqlite_path: Option<PathBuf>,

    pub max_connections: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    Memory,
    Sqlite,
}

impl FromStr for DatabaseType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(DatabaseType::Memory),
            "sqlite" => Ok(DatabaseType::Sqlite),
            other => Err(crate::Error::Configuration(format!(
                "Unknown database type: {}",
                other
            ))),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            db_type: DatabaseType::Sqlite,
            sqlite_path: Some(PathBuf::from("data/stagehand.db")),
            max_connections: 5,
        }
    }
}

impl DatabaseConfig {
    pub fn memory() -> Self {
        Self {
            db_type: DatabaseType::Memory,
            sqlite_path: None,
            max_connections: 1,
        }
    }

    pub fn sqlite(path: impl Into<PathBuf>) -> Self {
        Self {
            db_type: DatabaseType::Sqlite,
            sqlite_path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_connections == 0 {
            return Err("max_connections must be at least 1".to_string());
        }
        match self.db_type {
            DatabaseType::Sqlite => {
                if self.sqlite_path.is_none() {
                    return Err("SQLite path is required for SQLite database type".to_string());
                }
            }
            DatabaseType::Memory => {}
        }
        Ok(())
    }
}
