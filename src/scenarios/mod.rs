//! Journey scenario catalogue
//!
//! One [`ScenarioModule`] per journey. [`registry`] merges them; a
//! duplicate id anywhere in the catalogue fails the merge.
//!
//! Factories that act on a document read its number from the first
//! argument (`args=GBR-2022-CC-D1630FF88`) and fall back to a fixed draft
//! number when it is empty.

pub mod catch_certificate;
pub mod common;
pub mod processing_statement;
pub mod storage_document;

use serde_json::Value;

use crate::error::{RegistryError, ScenarioError};
use crate::registry::{Registry, ScenarioArgs, ScenarioModule};

/// Every journey module, in registration order.
#[must_use]
pub fn all_modules() -> Vec<ScenarioModule> {
    vec![
        common::module(),
        catch_certificate::module(),
        processing_statement::module(),
        storage_document::module(),
    ]
}

/// The complete scenario registry.
///
/// # Errors
///
/// Returns [`RegistryError::DuplicateScenario`] if two modules register the
/// same id.
pub fn registry() -> Result<Registry, RegistryError> {
    Registry::merge(all_modules())
}

/// Document number from the first argument, or `default` when empty.
///
/// The number ends up inside URL paths as one decoded segment. Browsers
/// treat `\\` as a separator and resolve `.` and `..`, so those are rejected
/// along with anything else that cannot survive as a single segment.
pub(crate) fn document_number(
    args: &ScenarioArgs,
    default: &str,
) -> Result<String, ScenarioError> {
    let doc = args.non_empty(0).unwrap_or(default);
    let splits = doc
        .chars()
        .any(|c| matches!(c, '/' | '\\' | '?' | '#') || c.is_control());
    if splits || doc == "." || doc == ".." {
        return Err(ScenarioError::InvalidArgument {
            value: doc.to_string(),
            reason: "a document number must be a single path segment".to_string(),
        });
    }
    Ok(doc.to_string())
}

/// Overwrites the top-level `documentNumber` of a JSON object payload.
pub(crate) fn with_document_number(mut value: Value, doc: &str) -> Value {
    if let Some(obj) = value.as_object_mut() {
        obj.insert("documentNumber".to_string(), Value::String(doc.to_string()));
    }
    value
}
