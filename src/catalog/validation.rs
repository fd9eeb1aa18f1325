//! Validation for catalog entries.
//!
//! Run on every entry before it is admitted into a snapshot.

use super::models::{CatalogEntry, TemplateEntry};
use std::fmt;

/// Why a single entry was rejected during a refresh.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    EmptyField {
        field: &'static str,
    },
    DuplicateKey {
        entity_type: &'static str,
        key: String,
    },
    Undecodable {
        message: String,
    },
    SelfReference {
        key: String,
    },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyField { field } => {
                write!(f, "Field '{}' is required but was empty", field)
            }
            ValidationError::DuplicateKey { entity_type, key } => {
                write!(f, "{} '{}' appears more than once in the batch", entity_type, key)
            }
            ValidationError::Undecodable { message } => {
                write!(f, "Entry could not be decoded: {}", message)
            }
            ValidationError::SelfReference { key } => {
                write!(f, "Template '{}' lists itself as a node type", key)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult<T> = Result<T, ValidationError>;

pub fn validate_entry(entry: &CatalogEntry) -> ValidationResult<()> {
    if entry.type_key.trim().is_empty() {
        return Err(ValidationError::EmptyField { field: "typeKey" });
    }
    if entry.display_name.trim().is_empty() {
        return Err(ValidationError::EmptyField {
            field: "displayName",
        });
    }
    for property in &entry.properties_schema {
        if property.name.trim().is_empty() {
            return Err(ValidationError::EmptyField {
                field: "propertiesSchema.name",
            });
        }
    }
    Ok(())
}

pub fn validate_template(template: &TemplateEntry) -> ValidationResult<()> {
    if template.id.trim().is_empty() {
        return Err(ValidationError::EmptyField { field: "id" });
    }
    if template.name.trim().is_empty() {
        return Err(ValidationError::EmptyField { field: "name" });
    }
    if template.node_types.iter().any(|t| t == &template.id) {
        return Err(ValidationError::SelfReference {
            key: template.id.clone(),
        });
    }
    Ok(())
}
