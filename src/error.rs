//! Error types for schema construction, resolution and loading

use thiserror::Error;

/// Result type for schema operations
pub type Result<T> = std::result::Result<T, SchemaError>;

/// Schema topology errors
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Duplicate table name '{name}': alias one of the references")]
    DuplicateName { name: String },

    #[error("Ambiguous join between '{parent}' and '{child}': {candidates} foreign keys match, supply an explicit join")]
    AmbiguousJoin {
        parent: String,
        child: String,
        candidates: usize,
    },

    #[error("No relation between '{parent}' and '{child}': no foreign key and no explicit join")]
    MissingRelation { parent: String, child: String },

    #[error("Unknown table '{}'{}", .name, suggestion_suffix(.suggestion))]
    UnknownTable {
        name: String,
        suggestion: Option<String>,
    },

    #[error("Unknown column '{table}.{column}'")]
    UnknownColumn { table: String, column: String },

    #[error("Tables '{first}' and '{second}' belong to different roots ('{first_root}' and '{second_root}')")]
    DisconnectedSchema {
        first: String,
        first_root: String,
        second: String,
        second_root: String,
    },

    #[error("Invalid topology: {0}")]
    InvalidTopology(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config_crate::ConfigError),
}

fn suggestion_suffix(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(name) => format!(" (did you mean '{}'?)", name),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_table_message() {
        let plain = SchemaError::UnknownTable {
            name: "emploee".into(),
            suggestion: None,
        };
        assert_eq!(plain.to_string(), "Unknown table 'emploee'");

        let suggested = SchemaError::UnknownTable {
            name: "emploee".into(),
            suggestion: Some("employee".into()),
        };
        assert_eq!(
            suggested.to_string(),
            "Unknown table 'emploee' (did you mean 'employee'?)"
        );
    }

    #[test]
    fn test_ambiguous_join_message() {
        let err = SchemaError::AmbiguousJoin {
            parent: "flight".into(),
            child: "origin".into(),
            candidates: 2,
        };
        assert!(err.to_string().contains("2 foreign keys match"));
    }
}
