use serde::{Deserialize, Serialize};

/// Settings for translating queries into SQL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConverterConfig {
    /// Schema holding the queried tables
    pub schema: String,
    /// Prefix that turns a logical name into a collision-safe alias
    pub alias_prefix: String,
    /// Parse every generated statement before running it
    pub validate_sql: bool,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            schema: "PUBLIC".to_string(),
            alias_prefix: "__".to_string(),
            validate_sql: true,
        }
    }
}

impl ConverterConfig {
    /// Read configuration from environment variables, falling back to defaults
    /// QUARRY_SCHEMA=PUBLIC
    /// QUARRY_ALIAS_PREFIX=__
    /// QUARRY_VALIDATE_SQL=true
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let schema = std::env::var("QUARRY_SCHEMA").unwrap_or(defaults.schema);
        let alias_prefix = std::env::var("QUARRY_ALIAS_PREFIX")
            .ok()
            .filter(|prefix| !prefix.is_empty())
            .unwrap_or(defaults.alias_prefix);
        let validate_sql = std::env::var("QUARRY_VALIDATE_SQL")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(defaults.validate_sql);

        Self {
            schema,
            alias_prefix,
            validate_sql,
        }
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    pub fn with_alias_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.alias_prefix = prefix.into();
        self
    }

    pub fn with_validate_sql(mut self, validate: bool) -> Self {
        self.validate_sql = validate;
        self
    }
}
