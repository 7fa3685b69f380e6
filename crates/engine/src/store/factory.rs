use crate::store::{DatabaseConfig, DatabaseType, MemoryStore, SqliteStore, Store};
use std::sync::Arc;

pub async fn create_store(config: &DatabaseConfig) -> crate::Result<Arc<dyn Store>> {
    config.validate().map_err(crate::Error::Configuration)?;

    match config.db_type {
        DatabaseType::Memory => Ok(Arc::new(MemoryStore::new())),
        DatabaseType::Sqlite => {
            let path = config
                .sqlite_path
                .as_ref()
                .ok_or_else(|| crate::Error::Configuration("SQLite path not configured".into()))?
                .to_str()
                .unwrap_or("data/stagehand.db");
            Ok(Arc::new(
                SqliteStore::with_max_connections(path, config.max_connections).await?,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn builds_memory_store() {
        let store = create_store(&DatabaseConfig::memory()).await.unwrap();
        store.init().await.unwrap();
        assert!(store.list_workflows(10, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejects_invalid_config() {
        let config = DatabaseConfig {
            sqlite_path: None,
            ..DatabaseConfig::default()
        };
        let err = create_store(&config).await.err().unwrap();
        assert!(err.is_configuration());
    }
}
