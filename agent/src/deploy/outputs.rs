//! Output reconciliation
//!
//! ARM does not preserve the case of output keys, so raw outputs are matched
//! against the declared outputs by uppercased key.

use std::path::Path;

use crate::errors::{AgentError, ReconciliationGap};
use crate::filesys::file::File;
use crate::models::deployment::{OutputMapping, ValueMap};

pub const OUTPUT_FILE_NAME: &str = "output.json";

/// Map raw provisioning outputs to the declared destination names.
///
/// A single missing declared output fails the whole reconciliation.
pub fn reconcile(
    raw: &ValueMap,
    declared: &[OutputMapping],
) -> Result<ValueMap, ReconciliationGap> {
    let uppercased: ValueMap = raw
        .iter()
        .map(|(key, value)| (key.to_uppercase(), value.clone()))
        .collect();

    let mut outputs = ValueMap::new();
    for output in declared {
        let value = uppercased
            .get(&output.key.to_uppercase())
            .ok_or_else(|| ReconciliationGap {
                key: output.key.clone(),
            })?;
        outputs.insert(output.name.clone(), value.clone());
    }
    Ok(outputs)
}

/// Write the reconciled outputs where the calling system picks them up
pub async fn write_output_file(outputs_dir: &Path, json: &str) -> Result<(), AgentError> {
    File::new(outputs_dir.join(OUTPUT_FILE_NAME))
        .write_bytes(json.as_bytes())
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mapping(key: &str, name: &str) -> OutputMapping {
        OutputMapping {
            key: key.to_string(),
            name: name.to_string(),
        }
    }

    fn raw(value: serde_json::Value) -> ValueMap {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_reconcile_ignores_key_case() {
        let outputs = reconcile(
            &raw(json!({"myHost": "10.0.0.1"})),
            &[mapping("MYHOST", "HOST")],
        )
        .unwrap();

        assert_eq!(serde_json::Value::Object(outputs), json!({"HOST": "10.0.0.1"}));
    }

    #[test]
    fn test_reconcile_keeps_only_declared_outputs() {
        let outputs = reconcile(
            &raw(json!({"MyOut": "v1", "other": 3, "port": 3306})),
            &[mapping("MyOut", "OUT"), mapping("PORT", "port")],
        )
        .unwrap();

        assert_eq!(
            serde_json::to_string(&outputs).unwrap(),
            r#"{"OUT":"v1","port":3306}"#
        );
    }

    #[test]
    fn test_reconcile_gap_discards_everything() {
        let result = reconcile(
            &raw(json!({"found": "yes"})),
            &[mapping("found", "FOUND"), mapping("missing", "MISSING")],
        );

        assert_eq!(
            result,
            Err(ReconciliationGap {
                key: "missing".to_string()
            })
        );
    }

    #[test]
    fn test_reconcile_without_declared_outputs() {
        let outputs = reconcile(&raw(json!({"a": 1})), &[]).unwrap();
        assert!(outputs.is_empty());
    }
}
