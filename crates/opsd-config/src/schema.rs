//! Thin wrapper around the `jsonschema` crate shared by the daemon config
//! and schedule-descriptor validators.

use serde_json::Value as JsonValue;

use crate::error::{Error, Result};

/// Validate `instance` against `schema`, collecting every violation rather
/// than stopping at the first (the original's `validation.validate_config`
/// reports every schema error at once, not just the first).
pub fn validate_against(schema: JsonValue, instance: &JsonValue) -> Result<()> {
    let validator = jsonschema::validator_for(&schema).map_err(|e| Error::validation(vec![e.to_string()]))?;

    let violations: Vec<String> = validator
        .iter_errors(instance)
        .map(|e| {
            let path = e.instance_path.to_string();
            if path.is_empty() {
                e.to_string()
            } else {
                format!("{path}: {e}")
            }
        })
        .collect();

    if violations.is_empty() {
        Ok(())
    } else {
        Err(Error::validation(violations))
    }
}
