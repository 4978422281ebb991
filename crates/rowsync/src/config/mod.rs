//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::Result;
use std::path::Path;

impl SyncConfig {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: SyncConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Whether the run renders a SQL script instead of executing statements.
    pub fn script_mode(&self) -> bool {
        self.sync.sql_output.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_yaml_minimal() {
        let yaml = r#"
source:
  host: db1.internal
  user: sync
  password: s3cr3t
dest:
  dialect: mysql
  host: db2.internal
  user: sync
tables:
  - schema: shop
    table: orders
  - schema: shop
    table: customers
    dest_schema: shop_mirror
"#;
        let config = SyncConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.tables.len(), 2);
        assert_eq!(config.tables[0].full_name(), "shop.orders");
        assert_eq!(config.tables[1].effective_dest_schema(), "shop_mirror");
        assert_eq!(config.sync.chunk_size, 10_000);
        assert!(!config.script_mode());
    }

    #[test]
    fn test_from_yaml_rejects_invalid() {
        let yaml = r#"
source:
  host: db1.internal
  user: sync
dest:
  dialect: mysql
  host: db2.internal
tables: []
"#;
        assert!(SyncConfig::from_yaml(yaml).is_err());
    }
}
